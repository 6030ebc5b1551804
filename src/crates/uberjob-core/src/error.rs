//! Error types and error handling for plan operations
//!
//! All errors implement `std::error::Error` via the `thiserror` crate.
//!
//! # Error Hierarchy
//!
//! ```text
//! UberjobError
//! ├── SignatureMismatch   - Construction: arguments do not bind to the callable
//! ├── ForeignNode         - Construction: node belongs to a different plan
//! ├── AlreadyRegistered   - Construction: node has a registry entry already
//! ├── MapKey              - Construction/execution: non-string mapping key
//! ├── CycleDetected       - Transform: directed cycle in the physical plan
//! ├── UnknownOutput       - Transform: requested output is not a plan node
//! ├── Call                - Execution: a node failed; carries the symbolic traceback
//! ├── NotTransformed      - Execution: a source placeholder was invoked directly
//! ├── Execution           - Execution: failure inside a user callable
//! └── Store               - Execution: a value store operation failed
//! ```
//!
//! # Propagation
//!
//! Construction and transform errors surface synchronously from the builder and
//! the run entry points. Execution errors are aggregated by the scheduler: the
//! caller receives exactly the *first* recorded error, wrapped in a [`CallError`]
//! identifying the failing node; every error is also delivered to the progress
//! observers.
//!
//! # Matching Specific Errors
//!
//! ```rust,ignore
//! use uberjob_core::UberjobError;
//!
//! match run(&mut plan, Some(&registry), Some(output.into()), options).await {
//!     Ok(value) => println!("done: {value:?}"),
//!     Err(UberjobError::Call(call)) => {
//!         eprintln!("node '{}' failed: {}", call.node, call.source);
//!         eprintln!("built at:\n{}", call.trace);
//!     }
//!     Err(UberjobError::CycleDetected { node }) => {
//!         eprintln!("dependency cycle through '{node}'");
//!     }
//!     Err(other) => eprintln!("{other}"),
//! }
//! ```

use crate::graph::Scope;
use crate::trace::SymbolicTrace;
use thiserror::Error;
use uberjob_stores::StoreError;

/// Convenience result type using [`UberjobError`]
pub type Result<T> = std::result::Result<T, UberjobError>;

/// All errors produced while building, transforming, or running a plan.
#[derive(Error, Debug)]
pub enum UberjobError {
    /// The arguments of a `call` do not bind to the callable's signature.
    #[error("signature mismatch calling '{name}': {reason}")]
    SignatureMismatch { name: String, reason: String },

    /// A node handle from a different plan was used.
    #[error("node does not belong to this plan")]
    ForeignNode,

    /// The node already has a stored or sourced registry entry.
    #[error("node is already {relation} in this registry")]
    AlreadyRegistered { relation: &'static str },

    /// A mapping key did not resolve to a string.
    #[error("mapping key must be a string, got {found}")]
    MapKey { found: String },

    /// The physical plan contains a directed cycle.
    #[error("cycle detected in the physical plan through '{node}'")]
    CycleDetected { node: String },

    /// The requested output is not a node of the plan being run.
    #[error("requested output is not a node of this plan")]
    UnknownOutput,

    /// A node failed during execution.
    ///
    /// Carries the failing node's identity and symbolic traceback; the original
    /// failure is preserved as the source.
    #[error(transparent)]
    Call(#[from] Box<CallError>),

    /// A source placeholder was invoked without the registry transform.
    #[error("source placeholder for {store} was invoked directly; run the plan against its registry")]
    NotTransformed { store: String },

    /// A failure raised inside a user callable.
    #[error("{0}")]
    Execution(String),

    /// A value store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl UberjobError {
    /// Create an [`UberjobError::Execution`] from any message.
    pub fn execution(message: impl Into<String>) -> Self {
        UberjobError::Execution(message.into())
    }

    pub(crate) fn signature_mismatch(name: &str, reason: String) -> Self {
        UberjobError::SignatureMismatch {
            name: name.to_string(),
            reason,
        }
    }
}

/// Execution failure at a specific node.
///
/// The symbolic traceback points at the plan-construction site of the failing
/// node; the `source` chain is the runtime failure itself.
#[derive(Error, Debug)]
#[error("call to '{node}' (scope {scope}) failed: {source}\nsymbolic traceback:\n{trace}")]
pub struct CallError {
    /// Display name of the failing node.
    pub node: String,
    /// Scope of the failing node.
    pub scope: Scope,
    /// Construction-site stack of the failing node.
    pub trace: SymbolicTrace,
    /// The underlying failure.
    #[source]
    pub source: Box<UberjobError>,
}
