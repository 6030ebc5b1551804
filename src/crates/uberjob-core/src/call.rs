//! Callables attached to plan nodes
//!
//! A [`CallFn`] bundles a fully-qualified name, a structural [`Signature`], and an
//! async function body. The name feeds scope grouping and diagnostics; the
//! signature feeds eager argument binding at plan-construction time; the body runs
//! on a worker when the scheduler reaches the node.
//!
//! # Examples
//!
//! ```rust,ignore
//! use serde_json::{json, Value};
//! use uberjob_core::{CallFn, Signature, UberjobError};
//!
//! let add = CallFn::from_sync("demo::add", Signature::positional(["x", "y"]), |inv| {
//!     let x = inv.param(0, "x")?.as_i64().unwrap_or_default();
//!     let y = inv.param(1, "y")?.as_i64().unwrap_or_default();
//!     Ok(json!(x + y))
//! });
//!
//! let fetch = CallFn::new("demo::fetch", Signature::positional(["url"]), |inv| async move {
//!     let url = inv.param(0, "url")?.clone();
//!     Ok(Value::String(format!("fetched {url}")))
//! });
//! ```

use crate::error::{Result, UberjobError};
use crate::signature::Signature;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// The argument values delivered to a call body.
///
/// Positional arguments arrive in index order; keyword arguments by name.
/// Dependency edges contribute nothing here.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub args: Vec<Value>,
    pub kwargs: HashMap<String, Value>,
}

impl Invocation {
    /// The positional argument at `index`, if supplied.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// The keyword argument `name`, if supplied.
    pub fn kwarg(&self, name: &str) -> Option<&Value> {
        self.kwargs.get(name)
    }

    /// A parameter that may have been bound positionally or by keyword.
    ///
    /// Fails when neither binding supplied it, which for defaultless parameters
    /// cannot happen on invocations built by the scheduler.
    pub fn param(&self, index: usize, name: &str) -> Result<&Value> {
        self.arg(index)
            .or_else(|| self.kwarg(name))
            .ok_or_else(|| UberjobError::execution(format!("argument '{name}' was not supplied")))
    }
}

type CallFuture = BoxFuture<'static, Result<Value>>;
type CallBody = dyn Fn(Invocation) -> CallFuture + Send + Sync;

/// A named async callable with a structural signature.
///
/// Cloning is cheap; all fields are shared.
#[derive(Clone)]
pub struct CallFn {
    name: Arc<str>,
    signature: Arc<Signature>,
    body: Arc<CallBody>,
}

impl CallFn {
    /// Build from an async closure.
    pub fn new<F, Fut>(name: impl Into<String>, signature: Signature, body: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into().into(),
            signature: Arc::new(signature),
            body: Arc::new(move |invocation| Box::pin(body(invocation))),
        }
    }

    /// Build from a synchronous closure.
    ///
    /// The closure runs on a worker at invocation time, so it should not block
    /// for long; wrap genuinely blocking work in its own async body instead.
    pub fn from_sync<F>(name: impl Into<String>, signature: Signature, body: F) -> Self
    where
        F: Fn(Invocation) -> Result<Value> + Send + Sync + 'static,
    {
        Self::new(name, signature, move |invocation| {
            let result = body(invocation);
            async move { result }
        })
    }

    /// The fully-qualified name, as appended to node scopes.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub(crate) fn invoke(&self, invocation: Invocation) -> CallFuture {
        (self.body)(invocation)
    }
}

impl fmt::Debug for CallFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallFn")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish()
    }
}
