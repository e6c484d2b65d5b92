//! Lightweight syntax tree consumed by the analysis engine
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. The parent
//! link is an index rather than a pointer, so upward traversal is possible
//! without reference cycles. Line and column numbers are 1-based.

use std::collections::BTreeMap;

use id_arena::{Arena, Id};
use serde::Serialize;

pub type NodeId = Id<SyntaxNode>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LiteralValue {
    String(String),
    Number(f64),
    Bool(bool),
}

#[derive(Debug, Clone)]
pub struct SyntaxNode {
    pub id: NodeId,
    pub kind: String,
    pub name: Option<String>,
    pub line: usize,
    pub column: usize,
    pub end_line: Option<usize>,
    pub end_column: Option<usize>,
    pub text: String,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
    pub scope: Option<String>,
    pub value: Option<LiteralValue>,
    pub operator: Option<String>,
    pub arguments: Vec<NodeId>,
    pub properties: BTreeMap<String, NodeId>,
}

impl SyntaxNode {
    /// Position used to order nodes in the document.
    pub fn position(&self) -> (usize, usize) {
        (self.line, self.column)
    }

    /// Short description used in taint paths and diagnostics.
    pub fn describe(&self) -> String {
        let label = self.name.as_deref().unwrap_or_else(|| first_line(&self.text));
        format!("{} `{}` at {}:{}", self.kind, label, self.line, self.column)
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim()
}

/// Fields of a node before it is placed in the tree.
#[derive(Debug, Clone, Default)]
pub struct NodeSpec {
    pub kind: String,
    pub name: Option<String>,
    pub line: usize,
    pub column: usize,
    pub end_line: Option<usize>,
    pub end_column: Option<usize>,
    pub text: String,
    pub scope: Option<String>,
    pub value: Option<LiteralValue>,
    pub operator: Option<String>,
}

impl NodeSpec {
    pub fn new(kind: &str, line: usize, column: usize, text: &str) -> Self {
        Self {
            kind: kind.to_string(),
            line,
            column,
            text: text.to_string(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_end(mut self, end_line: usize, end_column: usize) -> Self {
        self.end_line = Some(end_line);
        self.end_column = Some(end_column);
        self
    }

    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = Some(scope.to_string());
        self
    }

    pub fn with_value(mut self, value: LiteralValue) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_operator(mut self, operator: &str) -> Self {
        self.operator = Some(operator.to_string());
        self
    }
}

/// Arena-backed syntax tree. Iteration order is insertion order, which
/// builders keep equal to document order.
#[derive(Debug, Default)]
pub struct SyntaxTree {
    arena: Arena<SyntaxNode>,
    roots: Vec<NodeId>,
}

impl SyntaxTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, spec: NodeSpec, parent: Option<NodeId>) -> NodeId {
        let id = self.arena.alloc_with_id(|id| SyntaxNode {
            id,
            kind: spec.kind,
            name: spec.name,
            line: spec.line,
            column: spec.column,
            end_line: spec.end_line,
            end_column: spec.end_column,
            text: spec.text,
            children: Vec::new(),
            parent,
            scope: spec.scope,
            value: spec.value,
            operator: spec.operator,
            arguments: Vec::new(),
            properties: BTreeMap::new(),
        });

        match parent {
            Some(parent_id) => self.arena[parent_id].children.push(id),
            None => self.roots.push(id),
        }

        id
    }

    pub fn add_argument(&mut self, call: NodeId, argument: NodeId) {
        self.arena[call].arguments.push(argument);
    }

    pub fn set_property(&mut self, node: NodeId, key: &str, value: NodeId) {
        self.arena[node].properties.insert(key.to_string(), value);
    }

    pub fn get(&self, id: NodeId) -> &SyntaxNode {
        &self.arena[id]
    }

    pub fn parent(&self, id: NodeId) -> Option<&SyntaxNode> {
        self.arena[id].parent.map(|p| &self.arena[p])
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &SyntaxNode> {
        self.arena[id].children.iter().map(|&c| &self.arena[c])
    }

    pub fn ancestors(&self, id: NodeId) -> AncestorIter<'_> {
        AncestorIter {
            tree: self,
            current: self.arena[id].parent,
        }
    }

    pub fn roots(&self) -> impl Iterator<Item = &SyntaxNode> {
        self.roots.iter().map(|&r| &self.arena[r])
    }

    /// Flat view over every node in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &SyntaxNode> {
        self.arena.iter().map(|(_, node)| node)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.len() == 0
    }
}

pub struct AncestorIter<'a> {
    tree: &'a SyntaxTree,
    current: Option<NodeId>,
}

impl<'a> Iterator for AncestorIter<'a> {
    type Item = &'a SyntaxNode;

    fn next(&mut self) -> Option<Self::Item> {
        let current_id = self.current?;
        let node = &self.tree.arena[current_id];
        self.current = node.parent;
        Some(node)
    }
}
