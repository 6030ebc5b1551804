//! Structured symbolic values and their runtime reconstructors
//!
//! [`Symbolic`] is the argument shape accepted everywhere a plan takes a value:
//! a node handle, a plain value, or one of four container shapes (sequence,
//! tuple, set, mapping) whose children are themselves symbolic. Gathering such a
//! structure replaces it with a single node: container shapes holding at least
//! one node become calls to a pure *reconstructor* that rebuilds the container
//! from its children at run time, and node-free structures collapse eagerly to a
//! literal.
//!
//! Runtime container identity maps onto the JSON value model: mappings become
//! objects (keys must resolve to strings), sequences and tuples become arrays,
//! and sets become arrays deduplicated and sorted by canonical encoding.

use crate::call::{CallFn, Invocation};
use crate::error::{Result, UberjobError};
use crate::graph::NodeRef;
use crate::signature::Signature;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// A value that may contain symbolic nodes.
#[derive(Debug, Clone)]
pub enum Symbolic {
    /// An existing plan node.
    Node(NodeRef),
    /// A plain value with no symbolic content.
    Value(Value),
    /// An ordered sequence.
    Seq(Vec<Symbolic>),
    /// A fixed-arity tuple.
    Tuple(Vec<Symbolic>),
    /// An unordered collection of unique values.
    Set(Vec<Symbolic>),
    /// A mapping with unique keys; keys are gathered like any other child.
    Map(Vec<(Symbolic, Symbolic)>),
}

impl Symbolic {
    /// Whether any node handle occurs anywhere in the structure.
    pub(crate) fn contains_node(&self) -> bool {
        match self {
            Symbolic::Node(_) => true,
            Symbolic::Value(_) => false,
            Symbolic::Seq(children) | Symbolic::Tuple(children) | Symbolic::Set(children) => {
                children.iter().any(Symbolic::contains_node)
            }
            Symbolic::Map(pairs) => pairs
                .iter()
                .any(|(k, v)| k.contains_node() || v.contains_node()),
        }
    }

    /// Collapse a node-free structure into a plain value.
    pub(crate) fn into_value(self) -> Result<Value> {
        match self {
            Symbolic::Node(_) => Err(UberjobError::execution(
                "symbolic node in a literal-only context",
            )),
            Symbolic::Value(value) => Ok(value),
            Symbolic::Seq(children) | Symbolic::Tuple(children) => Ok(Value::Array(
                children
                    .into_iter()
                    .map(Symbolic::into_value)
                    .collect::<Result<_>>()?,
            )),
            Symbolic::Set(children) => {
                let values = children
                    .into_iter()
                    .map(Symbolic::into_value)
                    .collect::<Result<Vec<_>>>()?;
                Ok(canonical_set(values))
            }
            Symbolic::Map(pairs) => {
                let mut object = Map::new();
                for (key, value) in pairs {
                    object.insert(string_key(key.into_value()?)?, value.into_value()?);
                }
                Ok(Value::Object(object))
            }
        }
    }
}

impl From<NodeRef> for Symbolic {
    fn from(node: NodeRef) -> Self {
        Symbolic::Node(node)
    }
}

impl From<Value> for Symbolic {
    fn from(value: Value) -> Self {
        Symbolic::Value(value)
    }
}

impl From<Vec<Symbolic>> for Symbolic {
    fn from(children: Vec<Symbolic>) -> Self {
        Symbolic::Seq(children)
    }
}

macro_rules! symbolic_from_value {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Symbolic {
            fn from(value: $ty) -> Self {
                Symbolic::Value(Value::from(value))
            }
        })*
    };
}

symbolic_from_value!(&str, String, bool, i32, i64, u32, u64, f64);

fn string_key(key: Value) -> Result<String> {
    match key {
        Value::String(key) => Ok(key),
        other => Err(UberjobError::MapKey {
            found: other.to_string(),
        }),
    }
}

fn canonical_set(values: Vec<Value>) -> Value {
    let mut keyed: Vec<(String, Value)> = values
        .into_iter()
        .map(|value| (value.to_string(), value))
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.dedup_by(|a, b| a.0 == b.0);
    Value::Array(keyed.into_iter().map(|(_, value)| value).collect())
}

fn reconstructor(cell: &OnceLock<CallFn>, name: &str, build: fn(Invocation) -> Result<Value>) -> CallFn {
    cell.get_or_init(|| {
        CallFn::from_sync(
            format!("{}::{name}", module_path!()),
            Signature::new().with_variadic(),
            build,
        )
    })
    .clone()
}

pub(crate) fn seq_fn() -> CallFn {
    static CELL: OnceLock<CallFn> = OnceLock::new();
    reconstructor(&CELL, "seq", |inv| Ok(Value::Array(inv.args)))
}

pub(crate) fn tuple_fn() -> CallFn {
    static CELL: OnceLock<CallFn> = OnceLock::new();
    reconstructor(&CELL, "tuple", |inv| Ok(Value::Array(inv.args)))
}

pub(crate) fn set_fn() -> CallFn {
    static CELL: OnceLock<CallFn> = OnceLock::new();
    reconstructor(&CELL, "set", |inv| Ok(canonical_set(inv.args)))
}

pub(crate) fn map_fn() -> CallFn {
    static CELL: OnceLock<CallFn> = OnceLock::new();
    reconstructor(&CELL, "map", |inv| {
        if inv.args.len() % 2 != 0 {
            return Err(UberjobError::execution(
                "mapping reconstructor requires key/value pairs",
            ));
        }
        let mut object = Map::new();
        let mut values = inv.args.into_iter();
        while let (Some(key), Some(value)) = (values.next(), values.next()) {
            object.insert(string_key(key)?, value);
        }
        Ok(Value::Object(object))
    })
}
