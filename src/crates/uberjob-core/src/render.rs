//! Plan rendering - multi-format graph visualization
//!
//! Renders logical and physical plans in three formats:
//! - **DOT/Graphviz** - professional diagrams (`dot -Tpng plan.dot -o plan.png`)
//! - **Mermaid** - diagrams for markdown and web documentation
//! - **ASCII** - quick console output for debugging
//!
//! Passing a registry to [`render_plan`] applies the physical-plan transformer
//! first, so the picture shows the write/read pairs a run would execute. The
//! `level` option truncates the visible scope depth, collapsing deeply nested
//! grouping tags into their prefixes.

use crate::error::Result;
use crate::graph::EdgeKind;
use crate::physical::{build_physical, PhysicalPlan};
use crate::plan::Plan;
use crate::registry::Registry;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};

/// Render output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderFormat {
    /// DOT format for Graphviz
    Dot,
    /// Mermaid diagram format
    Mermaid,
    /// Simple ASCII art
    Ascii,
}

/// Rendering options
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Output format
    pub format: RenderFormat,
    /// Show node scopes in labels
    pub include_details: bool,
    /// Truncate visible scope depth
    pub level: Option<usize>,
    /// Graph title/label
    pub title: Option<String>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            format: RenderFormat::Dot,
            include_details: false,
            level: None,
            title: None,
        }
    }
}

impl RenderOptions {
    /// Create with DOT format
    pub fn dot() -> Self {
        Self::default()
    }

    /// Create with Mermaid format
    pub fn mermaid() -> Self {
        Self {
            format: RenderFormat::Mermaid,
            ..Default::default()
        }
    }

    /// Create with ASCII format
    pub fn ascii() -> Self {
        Self {
            format: RenderFormat::Ascii,
            ..Default::default()
        }
    }

    /// Show node scopes in labels
    pub fn with_details(mut self) -> Self {
        self.include_details = true;
        self
    }

    /// Truncate visible scope depth
    pub fn with_level(mut self, level: usize) -> Self {
        self.level = Some(level);
        self
    }

    /// Set title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

struct RenderNode {
    id: usize,
    label: String,
}

struct RenderEdge {
    from: usize,
    to: usize,
    label: String,
}

/// Render a logical plan; a registry applies the transformer first.
pub fn render_plan(
    plan: &Plan,
    registry: Option<&Registry>,
    options: &RenderOptions,
) -> Result<String> {
    if registry.is_some() {
        let physical = build_physical(plan, registry, None)?;
        return Ok(render_physical(&physical, options));
    }

    let nodes = plan
        .nodes()
        .map(|node| RenderNode {
            id: node.id(),
            label: label_for(
                &plan.graph[node.index].display_name(),
                &plan.graph[node.index].scope,
                options,
            ),
        })
        .collect();
    let edges = plan
        .graph
        .edge_references()
        .map(|edge| RenderEdge {
            from: edge.source().index(),
            to: edge.target().index(),
            label: edge_label(edge.weight()),
        })
        .collect();
    Ok(emit(nodes, edges, options))
}

/// Render a physical plan, typically obtained from a dry run.
pub fn render_physical(plan: &PhysicalPlan, options: &RenderOptions) -> String {
    let nodes = plan
        .graph
        .node_indices()
        .map(|index| RenderNode {
            id: index.index(),
            label: label_for(&plan.graph[index].name, &plan.graph[index].scope, options),
        })
        .collect();
    let edges = plan
        .graph
        .edge_references()
        .map(|edge| RenderEdge {
            from: edge.source().index(),
            to: edge.target().index(),
            label: edge_label(edge.weight()),
        })
        .collect();
    emit(nodes, edges, options)
}

fn label_for(name: &str, scope: &crate::graph::Scope, options: &RenderOptions) -> String {
    if !options.include_details {
        return name.to_string();
    }
    let scope = match options.level {
        Some(level) => scope.truncated(level),
        None => scope.clone(),
    };
    format!("{name}\n{scope}")
}

fn edge_label(kind: &EdgeKind) -> String {
    kind.to_string()
}

fn emit(nodes: Vec<RenderNode>, edges: Vec<RenderEdge>, options: &RenderOptions) -> String {
    match options.format {
        RenderFormat::Dot => emit_dot(nodes, edges, options),
        RenderFormat::Mermaid => emit_mermaid(nodes, edges, options),
        RenderFormat::Ascii => emit_ascii(nodes, edges),
    }
}

fn emit_dot(nodes: Vec<RenderNode>, edges: Vec<RenderEdge>, options: &RenderOptions) -> String {
    let mut output = String::new();
    output.push_str("digraph plan {\n");
    output.push_str("    rankdir=TB;\n");
    output.push_str("    node [shape=box, style=rounded];\n");

    if let Some(title) = &options.title {
        output.push_str("    labelloc=\"t\";\n");
        output.push_str(&format!("    label=\"{}\";\n", escape_dot(title)));
    }

    for node in &nodes {
        output.push_str(&format!(
            "    n{} [label=\"{}\"];\n",
            node.id,
            escape_dot(&node.label)
        ));
    }
    for edge in &edges {
        output.push_str(&format!(
            "    n{} -> n{} [label=\"{}\"];\n",
            edge.from,
            edge.to,
            escape_dot(&edge.label)
        ));
    }

    output.push_str("}\n");
    output
}

fn emit_mermaid(nodes: Vec<RenderNode>, edges: Vec<RenderEdge>, options: &RenderOptions) -> String {
    let mut output = String::new();
    if let Some(title) = &options.title {
        output.push_str(&format!("---\ntitle: {title}\n---\n"));
    }
    output.push_str("graph TD\n");

    for node in &nodes {
        output.push_str(&format!(
            "    n{}[\"{}\"]\n",
            node.id,
            escape_mermaid(&node.label)
        ));
    }
    for edge in &edges {
        output.push_str(&format!(
            "    n{} -->|{}| n{}\n",
            edge.from,
            escape_mermaid(&edge.label),
            edge.to
        ));
    }
    output
}

fn emit_ascii(nodes: Vec<RenderNode>, edges: Vec<RenderEdge>) -> String {
    let mut output = String::new();
    for node in &nodes {
        let outgoing: Vec<String> = edges
            .iter()
            .filter(|edge| edge.from == node.id)
            .map(|edge| format!("n{} ({})", edge.to, edge.label))
            .collect();
        if outgoing.is_empty() {
            output.push_str(&format!("n{} {}\n", node.id, node.label.replace('\n', " ")));
        } else {
            output.push_str(&format!(
                "n{} {} -> {}\n",
                node.id,
                node.label.replace('\n', " "),
                outgoing.join(", ")
            ));
        }
    }
    output
}

fn escape_dot(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn escape_mermaid(text: &str) -> String {
    text.replace('"', "#quot;").replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::CallFn;
    use crate::signature::Signature;
    use serde_json::json;
    use std::sync::Arc;
    use uberjob_stores::InMemoryStore;

    fn add_fn() -> CallFn {
        CallFn::from_sync("test::add", Signature::positional(["x", "y"]), |inv| {
            let x = inv.param(0, "x")?.as_i64().unwrap_or_default();
            let y = inv.param(1, "y")?.as_i64().unwrap_or_default();
            Ok(json!(x + y))
        })
    }

    fn small_plan() -> Plan {
        let mut plan = Plan::new();
        let x = plan.lit(1);
        plan.scoped("stage", |plan| plan.call(&add_fn(), [x.into(), 2.into()]))
            .unwrap();
        plan
    }

    #[test]
    fn dot_output_contains_nodes_and_edges() {
        let plan = small_plan();
        let dot = render_plan(&plan, None, &RenderOptions::dot()).unwrap();
        assert!(dot.starts_with("digraph plan {"));
        assert!(dot.contains("test::add"));
        assert!(dot.contains("arg 0"));
        assert!(dot.ends_with("}\n"));
    }

    #[test]
    fn mermaid_output_uses_arrows() {
        let plan = small_plan();
        let mermaid = render_plan(&plan, None, &RenderOptions::mermaid()).unwrap();
        assert!(mermaid.starts_with("graph TD"));
        assert!(mermaid.contains("-->"));
    }

    #[test]
    fn ascii_output_lists_every_node() {
        let plan = small_plan();
        let ascii = render_plan(&plan, None, &RenderOptions::ascii()).unwrap();
        assert!(ascii.contains("literal"));
        assert!(ascii.contains("test::add"));
    }

    #[test]
    fn registry_rendering_shows_write_read_pairs() {
        let mut plan = Plan::new();
        let mut registry = Registry::new();
        let z = plan.call(&add_fn(), [1.into(), 2.into()]).unwrap();
        registry.add(z, Arc::new(InMemoryStore::new())).unwrap();

        let dot = render_plan(&plan, Some(&registry), &RenderOptions::dot()).unwrap();
        assert!(dot.contains("write"));
        assert!(dot.contains("read"));
    }

    #[test]
    fn details_include_truncated_scopes() {
        let mut plan = Plan::new();
        plan.scoped("outer", |plan| {
            plan.scoped("inner", |plan| plan.lit(1));
        });

        let options = RenderOptions::ascii().with_details().with_level(1);
        let ascii = render_plan(&plan, None, &options).unwrap();
        assert!(ascii.contains("outer"));
        assert!(!ascii.contains("inner"));
    }

    #[test]
    fn dot_labels_are_escaped() {
        let mut plan = Plan::new();
        let weird = CallFn::from_sync("test::\"quoted\"", Signature::new(), |_inv| Ok(json!(1)));
        plan.call(&weird, []).unwrap();

        let dot = render_plan(&plan, None, &RenderOptions::dot()).unwrap();
        assert!(dot.contains("\\\"quoted\\\""));
    }
}
