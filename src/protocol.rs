//! Request/reply schema exchanged with the remote browser source.
//!
//! Requests ask for a contiguous slice `[first, first + number)` of the
//! children of the node at `path`; replies carry the slice together with
//! the total child count. Replies are validated here so the model never has
//! to second-guess field shapes.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Server-side ordering of child entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    /// Source's natural order.
    #[default]
    #[serde(rename = "")]
    Default,
    #[serde(rename = "direct")]
    Direct,
    #[serde(rename = "reverse")]
    Reverse,
}

impl SortOrder {
    /// Parse the wire spelling. Anything outside the closed set is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "" => Some(SortOrder::Default),
            "direct" => Some(SortOrder::Direct),
            "reverse" => Some(SortOrder::Reverse),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Default => "",
            SortOrder::Direct => "direct",
            SortOrder::Reverse => "reverse",
        }
    }

    /// Display label for the status bar.
    pub fn label(&self) -> &'static str {
        match self {
            SortOrder::Default => "Default",
            SortOrder::Direct => "Direct",
            SortOrder::Reverse => "Reverse",
        }
    }

    /// Cycle to the next sort option.
    pub fn next(&self) -> Self {
        match self {
            SortOrder::Default => SortOrder::Direct,
            SortOrder::Direct => SortOrder::Reverse,
            SortOrder::Reverse => SortOrder::Default,
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Range-fetch request sent to the remote source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserRequest {
    pub path: String,
    pub first: usize,
    pub number: usize,
    pub sort: SortOrder,
}

/// One child entry inside a reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyNode {
    pub name: String,
    /// Number of children; absent for leaves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nchilds: Option<usize>,
    /// Size in bytes, when the source knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fsize: Option<u64>,
    /// Free-form type tag ("dir", "file", "link", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ftype: Option<String>,
}

impl ReplyNode {
    pub fn leaf(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn folder(name: impl Into<String>, nchilds: usize) -> Self {
        Self {
            name: name.into(),
            nchilds: Some(nchilds),
            ..Default::default()
        }
    }
}

/// Paginated reply for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserReply {
    pub path: String,
    pub nchilds: usize,
    #[serde(default)]
    pub first: usize,
    pub nodes: Vec<ReplyNode>,
}

impl BrowserReply {
    /// Decode and validate a JSON reply.
    pub fn from_json(text: &str) -> Result<Self> {
        let reply: BrowserReply = serde_json::from_str(text)?;
        reply.validate()?;
        Ok(reply)
    }

    /// Best-effort `path` of a reply that failed to decode or validate.
    pub fn path_of(text: &str) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(text).ok()?;
        value.get("path")?.as_str().map(str::to_string)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Check the structural constraints a well-formed reply must satisfy.
    pub fn validate(&self) -> Result<()> {
        if !self.path.starts_with('/') {
            return Err(AppError::MalformedReply(format!(
                "path '{}' is not absolute",
                self.path
            )));
        }
        if self.first + self.nodes.len() > self.nchilds {
            return Err(AppError::MalformedReply(format!(
                "slice [{}, {}) exceeds nchilds {} for '{}'",
                self.first,
                self.first + self.nodes.len(),
                self.nchilds,
                self.path
            )));
        }
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.name.is_empty() || node.name.contains('/') {
                return Err(AppError::MalformedReply(format!(
                    "invalid child name '{}' under '{}'",
                    node.name, self.path
                )));
            }
            if !seen.insert(node.name.as_str()) {
                return Err(AppError::MalformedReply(format!(
                    "duplicate child '{}' under '{}'",
                    node.name, self.path
                )));
            }
        }
        Ok(())
    }
}

/// Complete hierarchy handed over in full-model mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub name: String,
    #[serde(default)]
    pub expanded: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub childs: Vec<HierarchyNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fsize: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ftype: Option<String>,
}

impl HierarchyNode {
    pub fn new(name: impl Into<String>, childs: Vec<HierarchyNode>) -> Self {
        Self {
            name: name.into(),
            childs,
            ..Default::default()
        }
    }

    /// Number of nodes in this subtree, itself included.
    pub fn count(&self) -> usize {
        1 + self.childs.iter().map(HierarchyNode::count).sum::<usize>()
    }
}
