#![forbid(unsafe_code)]

//! NodeSet type for XML canonicalization and transforms.
//!
//! A `NodeSet` names the nodes of a parsed document that are visible to
//! canonicalization. Node ids are only meaningful for the text they were
//! computed from; re-parsing the same text yields the same ids.

use std::collections::HashSet;

use roxmltree::{Document, Node, NodeId};

/// A set of XML document nodes identified by `NodeId`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeSet {
    /// Every node of the document.
    All,
    /// Exactly the listed nodes.
    Nodes(HashSet<NodeId>),
}

impl NodeSet {
    /// Create a node set containing all nodes in the document.
    pub fn all() -> Self {
        NodeSet::All
    }

    /// All nodes except comments.
    pub fn all_without_comments(doc: &Document<'_>) -> Self {
        Self::tree_without_comments(doc.root())
    }

    /// A subtree rooted at `root`, without comment nodes.
    pub fn tree_without_comments(root: Node<'_, '_>) -> Self {
        NodeSet::Nodes(
            root.descendants()
                .filter(|n| !n.is_comment())
                .map(|n| n.id())
                .collect(),
        )
    }

    pub fn contains(&self, node: Node<'_, '_>) -> bool {
        self.contains_id(node.id())
    }

    pub fn contains_id(&self, id: NodeId) -> bool {
        match self {
            NodeSet::All => true,
            NodeSet::Nodes(ids) => ids.contains(&id),
        }
    }

    /// Remove the subtree rooted at `root`.
    pub fn remove_subtree(&mut self, doc: &Document<'_>, root: Node<'_, '_>) {
        if let NodeSet::All = self {
            *self = NodeSet::Nodes(doc.descendants().map(|n| n.id()).collect());
        }
        if let NodeSet::Nodes(ids) = self {
            for n in root.descendants() {
                ids.remove(&n.id());
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, NodeSet::Nodes(ids) if ids.is_empty())
    }
}
