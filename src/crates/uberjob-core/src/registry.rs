//! Registry - binding plan nodes to value stores
//!
//! A [`Registry`] records two disjoint relationships over the nodes of a single
//! plan:
//!
//! - **stored** - the node is produced by user computation; at run time its
//!   value is written through the store and every consumer reads it back
//! - **sourced** - the node is a placeholder whose only way to produce a value
//!   is reading the store; [`source`](Registry::source) creates the placeholder
//!   and records the relationship in one step
//!
//! A node appears in at most one relationship. The registry itself never touches
//! a store; it only declares the bindings the physical-plan transformer rewrites
//! into write/read calls.

use crate::call::CallFn;
use crate::error::{Result, UberjobError};
use crate::graph::NodeRef;
use crate::plan::Plan;
use crate::signature::Signature;
use std::collections::HashMap;
use std::sync::Arc;
use uberjob_stores::ValueStore;

/// How a node is bound to its store.
#[derive(Clone)]
pub(crate) enum Binding {
    Stored(Arc<dyn ValueStore>),
    Sourced(Arc<dyn ValueStore>),
}

impl Binding {
    pub(crate) fn store(&self) -> &Arc<dyn ValueStore> {
        match self {
            Binding::Stored(store) | Binding::Sourced(store) => store,
        }
    }

    fn relation(&self) -> &'static str {
        match self {
            Binding::Stored(_) => "stored",
            Binding::Sourced(_) => "sourced",
        }
    }
}

/// Store bindings for the nodes of one plan.
#[derive(Default)]
pub struct Registry {
    entries: HashMap<NodeRef, Binding>,
    order: Vec<NodeRef>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a stored relationship for an existing node.
    ///
    /// Fails when the node already has an entry or belongs to a different plan
    /// than earlier entries.
    pub fn add(&mut self, node: NodeRef, store: Arc<dyn ValueStore>) -> Result<()> {
        self.check_plan(node)?;
        if let Some(existing) = self.entries.get(&node) {
            return Err(UberjobError::AlreadyRegistered {
                relation: existing.relation(),
            });
        }
        self.entries.insert(node, Binding::Stored(store));
        self.order.push(node);
        Ok(())
    }

    /// Add a sourced placeholder to `plan` and bind it to `store`.
    ///
    /// The placeholder's callable fails if it is ever invoked directly; running
    /// the plan against this registry replaces it with a store read. Dependency
    /// edges may be attached to the returned node to order preparatory work
    /// before the read.
    pub fn source(&mut self, plan: &mut Plan, store: Arc<dyn ValueStore>) -> Result<NodeRef> {
        if let Some(first) = self.order.first() {
            if first.plan != plan.id {
                return Err(UberjobError::ForeignNode);
            }
        }
        let described = format!("{store:?}");
        let placeholder = CallFn::new(
            format!("{}::source", module_path!()),
            Signature::new().with_variadic().with_variadic_keywords(),
            move |_invocation| {
                let described = described.clone();
                async move {
                    Err::<serde_json::Value, _>(UberjobError::NotTransformed { store: described })
                }
            },
        );
        let node = plan.add_call_node(placeholder, Vec::new(), Vec::new());
        self.entries.insert(node, Binding::Sourced(store));
        self.order.push(node);
        Ok(node)
    }

    /// The store bound to a node, regardless of relationship.
    pub fn store_for(&self, node: NodeRef) -> Option<&Arc<dyn ValueStore>> {
        self.entries.get(&node).map(Binding::store)
    }

    /// Whether the node is a sourced placeholder.
    pub fn is_sourced(&self, node: NodeRef) -> bool {
        matches!(self.entries.get(&node), Some(Binding::Sourced(_)))
    }

    /// All bound nodes with their stores, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeRef, &Arc<dyn ValueStore>)> {
        self.order
            .iter()
            .filter_map(|node| self.entries.get(node).map(|binding| (*node, binding.store())))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub(crate) fn bindings(&self) -> impl Iterator<Item = (NodeRef, &Binding)> {
        self.order
            .iter()
            .filter_map(|node| self.entries.get(node).map(|binding| (*node, binding)))
    }

    fn check_plan(&self, node: NodeRef) -> Result<()> {
        if let Some(first) = self.order.first() {
            if first.plan != node.plan {
                return Err(UberjobError::ForeignNode);
            }
        }
        Ok(())
    }
}
