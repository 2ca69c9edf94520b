//! UI tree snapshot model and target matching.
//!
//! The host owns the tree. The matcher only reads the snapshot it is handed
//! for the current tick and never keeps nodes beyond it. Traversal is
//! depth-first, children in their given order, and returns the first node
//! that satisfies the [`MatchCriterion`].
//!
//! Even though host trees are documented as acyclic, traversal is bounded by
//! a depth cap, a node budget and (when nodes expose an identity) a visited
//! set, so a malformed snapshot cannot hang the scheduler.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

/// Default maximum depth the matcher descends to.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Default maximum number of nodes the matcher inspects per search.
pub const DEFAULT_MAX_NODES: usize = 10_000;

/// Read-only view of one node of the host's UI tree.
///
/// Implementations are cheap handles (the host's node reference, an `Arc`,
/// a borrowed reference). `children` may allocate fresh handles on each call.
pub trait UiNode {
    /// Visible text of the node.
    fn text_label(&self) -> Option<&str>;

    /// Accessibility (content) description of the node.
    fn accessibility_description(&self) -> Option<&str>;

    /// Whether the host accepts a synthetic click on this node.
    fn is_interactable(&self) -> bool;

    /// Ordered child handles.
    fn children(&self) -> Vec<Self>
    where
        Self: Sized;

    /// Stable identity of the node within one snapshot, if the host has one.
    ///
    /// When present, the matcher skips nodes it has already visited.
    fn identity(&self) -> Option<u64> {
        None
    }
}

/// Which node field a [`MatchCriterion`] compares against.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchField {
    /// The node's text label only.
    Label,
    /// The node's accessibility description only.
    Description,
    /// Either field.
    #[default]
    Either,
}

/// Exact, case-sensitive text predicate over a node's label/description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCriterion {
    /// Text the chosen field must equal.
    pub text: String,
    /// Field(s) compared against `text`.
    pub field: MatchField,
}

impl MatchCriterion {
    pub fn new(text: impl Into<String>, field: MatchField) -> Self {
        Self {
            text: text.into(),
            field,
        }
    }

    /// Returns `true` if the given fields satisfy this criterion.
    pub fn matches(&self, label: Option<&str>, description: Option<&str>) -> bool {
        let wanted = Some(self.text.as_str());
        match self.field {
            MatchField::Label => label == wanted,
            MatchField::Description => description == wanted,
            MatchField::Either => label == wanted || description == wanted,
        }
    }

    /// Returns `true` if `node` satisfies this criterion.
    pub fn matches_node<N: UiNode>(&self, node: &N) -> bool {
        self.matches(node.text_label(), node.accessibility_description())
    }
}

impl std::fmt::Display for MatchCriterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let field = match self.field {
            MatchField::Label => "label",
            MatchField::Description => "description",
            MatchField::Either => "label|description",
        };
        write!(f, "{field} == {:?}", self.text)
    }
}

/// A located node together with its position in the snapshot.
#[derive(Debug, Clone)]
pub struct NodeMatch<N> {
    /// The matched node handle. Valid for the current tick only.
    pub node: N,
    /// Depth below the root (root = 0).
    pub depth: usize,
    /// Child indices from the root down to the node.
    pub path: Vec<usize>,
}

/// Detached summary of a matched node, safe to keep after the tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedNode {
    /// Text label at match time.
    pub label: Option<String>,
    /// Accessibility description at match time.
    pub description: Option<String>,
    /// Depth below the root (root = 0).
    pub depth: usize,
    /// Child indices from the root down to the node.
    pub path: Vec<usize>,
}

impl<N: UiNode> From<&NodeMatch<N>> for MatchedNode {
    fn from(found: &NodeMatch<N>) -> Self {
        Self {
            label: found.node.text_label().map(str::to_owned),
            description: found.node.accessibility_description().map(str::to_owned),
            depth: found.depth,
            path: found.path.clone(),
        }
    }
}

/// Bounded depth-first searcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeMatcher {
    max_depth: usize,
    max_nodes: usize,
}

impl Default for TreeMatcher {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_nodes: DEFAULT_MAX_NODES,
        }
    }
}

impl TreeMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the depth cap. Nodes deeper than `max_depth` are not visited.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Override the node budget (minimum 1).
    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes.max(1);
        self
    }

    /// Returns the first node in depth-first order satisfying `criterion`.
    ///
    /// An absent root is "no match", not an error.
    pub fn find<N: UiNode>(&self, root: Option<N>, criterion: &MatchCriterion) -> Option<N> {
        self.locate(root, criterion).map(|found| found.node)
    }

    /// Like [`find`](Self::find) but also reports where the node sits.
    pub fn locate<N: UiNode>(
        &self,
        root: Option<N>,
        criterion: &MatchCriterion,
    ) -> Option<NodeMatch<N>> {
        let root = root?;
        let mut seen: HashSet<u64> = HashSet::new();
        let mut stack = vec![(root, 0_usize, Vec::new())];
        let mut visited = 0_usize;

        while let Some((node, depth, path)) = stack.pop() {
            if let Some(id) = node.identity()
                && !seen.insert(id)
            {
                continue;
            }

            visited += 1;
            if visited > self.max_nodes {
                warn!(
                    max_nodes = self.max_nodes,
                    "tree search exceeded node budget, giving up"
                );
                return None;
            }

            if criterion.matches_node(&node) {
                return Some(NodeMatch { node, depth, path });
            }

            if depth >= self.max_depth {
                continue;
            }

            // Reverse push keeps the given child order on pop.
            let children = node.children();
            for (index, child) in children.into_iter().enumerate().rev() {
                let mut child_path = path.clone();
                child_path.push(index);
                stack.push((child, depth + 1, child_path));
            }
        }

        None
    }
}

/// Owned tree snapshot, as serialized by hosts that hand over the whole tree
/// at once (and by the JSON snapshot file provider).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotNode {
    pub label: Option<String>,
    pub description: Option<String>,
    /// Accepts synthetic clicks.
    pub interactable: bool,
    /// Children in on-screen order.
    pub children: Vec<Arc<SnapshotNode>>,
}

impl SnapshotNode {
    /// Node with a text label and nothing else.
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    /// Node with an accessibility description and nothing else.
    pub fn described(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Self::default()
        }
    }

    pub fn interactable(mut self, interactable: bool) -> Self {
        self.interactable = interactable;
        self
    }

    /// Append `child` after the existing children.
    pub fn with_child(mut self, child: SnapshotNode) -> Self {
        self.children.push(Arc::new(child));
        self
    }

    /// Wrap into the shared handle type used by providers.
    pub fn into_shared(self) -> Arc<SnapshotNode> {
        Arc::new(self)
    }
}

impl UiNode for Arc<SnapshotNode> {
    fn text_label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    fn accessibility_description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn is_interactable(&self) -> bool {
        self.interactable
    }

    fn children(&self) -> Vec<Self> {
        self.children.clone()
    }
}
