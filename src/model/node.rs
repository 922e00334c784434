use std::fmt;

use crate::model::request::RequestState;
use crate::protocol::{HierarchyNode, ReplyNode};

/// Stable handle of a node in the model arena. Handles are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl NodeId {
    /// The synthetic holder at the top of every tree.
    pub const ROOT: NodeId = NodeId(0);
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Folder/file classification shown by the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Folder,
    File,
}

/// Extra attributes copied from the reply entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeAttrs {
    pub fsize: Option<u64>,
    pub ftype: Option<String>,
}

/// One entry of the remote hierarchy.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub expanded: bool,
    /// Total child count as last reported by the source.
    pub nchilds: usize,
    /// Materialized contiguous slice of children, starting at `first`.
    /// `None` means never requested or discarded on collapse.
    pub childs: Option<Vec<NodeId>>,
    pub first: usize,
    pub request: RequestState,
    /// Flat slots taken by the visible descendants (not the node itself).
    /// Only meaningful right after `scan_shifts`.
    pub shift: usize,
    pub parent: Option<NodeId>,
    pub attrs: NodeAttrs,
}

impl Node {
    pub fn new(name: impl Into<String>, parent: Option<NodeId>) -> Self {
        Self {
            name: name.into(),
            expanded: false,
            nchilds: 0,
            childs: None,
            first: 0,
            request: RequestState::Idle,
            shift: 0,
            parent,
            attrs: NodeAttrs::default(),
        }
    }

    pub fn from_reply(entry: &ReplyNode, parent: NodeId) -> Self {
        let mut node = Node::new(entry.name.clone(), Some(parent));
        node.nchilds = entry.nchilds.unwrap_or(0);
        node.attrs = NodeAttrs {
            fsize: entry.fsize,
            ftype: entry.ftype.clone(),
        };
        node
    }

    pub fn from_hierarchy(entry: &HierarchyNode, parent: NodeId) -> Self {
        let mut node = Node::new(entry.name.clone(), Some(parent));
        node.expanded = entry.expanded;
        node.nchilds = entry.childs.len();
        node.attrs = NodeAttrs {
            fsize: entry.fsize,
            ftype: entry.ftype.clone(),
        };
        node
    }

    pub fn is_pending(&self) -> bool {
        self.request.is_pending()
    }

    /// Index one past the last materialized child.
    pub fn loaded_end(&self) -> usize {
        self.first + self.childs.as_ref().map_or(0, Vec::len)
    }
}

/// Descriptor of one row in the flat window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatNode {
    pub index: usize,
    pub name: String,
    /// Nesting level, 0 for the top-level entries.
    pub level: usize,
    pub kind: NodeKind,
    pub is_leaf: bool,
    pub expanded: bool,
    pub node: NodeId,
}
