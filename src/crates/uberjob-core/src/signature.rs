//! Structural call signatures with eager argument binding
//!
//! Rust has no runtime signature introspection, so every callable registered with
//! a plan carries a structural description of the arguments it accepts. Binding is
//! validated eagerly when the call node is *created*: a plan that builds without
//! error will never fail at run time because of argument shape.
//!
//! A signature lists named parameters in order, each optionally defaulted, plus
//! two overflow switches mirroring variadic positional and variadic keyword
//! acceptance. Binding follows the usual rules: positional arguments fill
//! parameters left to right, keywords fill by name, a parameter may not be filled
//! twice, and every defaultless parameter must be filled.

use std::collections::HashSet;

#[derive(Debug, Clone)]
struct Param {
    name: String,
    has_default: bool,
}

/// The argument shape a callable accepts.
#[derive(Debug, Clone, Default)]
pub struct Signature {
    params: Vec<Param>,
    variadic: bool,
    variadic_keywords: bool,
}

impl Signature {
    /// A signature with no parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// A signature of required positional-or-keyword parameters.
    pub fn positional<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut signature = Self::new();
        for name in names {
            signature = signature.with_param(name);
        }
        signature
    }

    /// Append a required parameter.
    pub fn with_param(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            has_default: false,
        });
        self
    }

    /// Append a parameter with a default, so it may be left unbound.
    pub fn with_default(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            has_default: true,
        });
        self
    }

    /// Accept any number of extra positional arguments.
    pub fn with_variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    /// Accept unknown keyword arguments.
    pub fn with_variadic_keywords(mut self) -> Self {
        self.variadic_keywords = true;
        self
    }

    /// Parameter names in declaration order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.name.as_str())
    }

    /// Validate that `positional` arguments and the given keyword names bind.
    ///
    /// Returns a human-readable reason on mismatch; the caller wraps it into a
    /// signature-mismatch error naming the callable.
    pub(crate) fn bind(&self, positional: usize, keywords: &[&str]) -> Result<(), String> {
        let mut bound = vec![false; self.params.len()];

        if positional > self.params.len() && !self.variadic {
            return Err(format!(
                "takes {} positional argument(s) but {} were given",
                self.params.len(),
                positional
            ));
        }
        for slot in bound.iter_mut().take(positional) {
            *slot = true;
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for &name in keywords {
            if !seen.insert(name) {
                return Err(format!("got duplicate keyword argument '{name}'"));
            }
            match self.params.iter().position(|p| p.name == name) {
                Some(i) if bound[i] => {
                    return Err(format!("got multiple values for argument '{name}'"));
                }
                Some(i) => bound[i] = true,
                None if self.variadic_keywords => {}
                None => {
                    return Err(format!("got an unexpected keyword argument '{name}'"));
                }
            }
        }

        for (i, param) in self.params.iter().enumerate() {
            if !bound[i] && !param.has_default {
                return Err(format!("missing required argument '{}'", param.name));
            }
        }
        Ok(())
    }
}
