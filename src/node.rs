//! Node model: a closed tagged variant (`Dir` | `File`), dispatched by pattern
//! match rather than the source's inheritance-plus-downcast scheme (spec §9).

use std::fmt;

use crate::attr::AttrMap;
use crate::hash::FileId;
use crate::path::PathComponent;

/// A per-roster small integer identifying a node. Positive ids are
/// "permanent" (assigned when a revision is written to a database, stable
/// across reads); ids from a [`TempNodeIdSource`] are negative and only ever
/// live in in-memory scratch rosters (e.g. merge results before they're
/// written).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub i64);

pub const THE_NULL_NODE: NodeId = NodeId(0);

impl NodeId {
    pub fn is_null(self) -> bool {
        self == THE_NULL_NODE
    }

    pub fn is_temp(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Injected id allocator. Two implementations exist: [`TempNodeIdSource`]
/// (monotonic negative ids, for merge scratch space) and
/// [`PermanentNodeIdSource`] (monotonic positive ids, stable once assigned).
pub trait NodeIdSource {
    fn next(&mut self) -> NodeId;
}

#[derive(Debug, Default)]
pub struct TempNodeIdSource {
    curr: i64,
}

impl TempNodeIdSource {
    pub fn new() -> Self {
        Self { curr: 0 }
    }
}

impl NodeIdSource for TempNodeIdSource {
    fn next(&mut self) -> NodeId {
        self.curr -= 1;
        NodeId(self.curr)
    }
}

#[derive(Debug)]
pub struct PermanentNodeIdSource {
    curr: i64,
}

impl PermanentNodeIdSource {
    pub fn starting_at(first: i64) -> Self {
        assert!(first > 0, "permanent node ids must be positive");
        Self { curr: first - 1 }
    }
}

impl Default for PermanentNodeIdSource {
    /// Starts at 2: id 1 is reserved for the root node every [`Roster`]
    /// allocates up front (`crate::roster::Roster::empty`).
    fn default() -> Self {
        Self::starting_at(2)
    }
}

impl NodeIdSource for PermanentNodeIdSource {
    fn next(&mut self) -> NodeId {
        self.curr += 1;
        NodeId(self.curr)
    }
}

#[derive(Debug, Clone)]
pub struct DirNode {
    pub id: NodeId,
    pub parent: NodeId,
    pub name: Option<PathComponent>,
    pub attrs: AttrMap,
    pub children: std::collections::BTreeMap<PathComponent, NodeId>,
}

#[derive(Debug, Clone)]
pub struct FileNode {
    pub id: NodeId,
    pub parent: NodeId,
    pub name: Option<PathComponent>,
    pub attrs: AttrMap,
    pub content: FileId,
}

/// A roster node: either a directory or a file. The root node is always a
/// `Dir` with a null parent and no name.
#[derive(Debug, Clone)]
pub enum Node {
    Dir(DirNode),
    File(FileNode),
}

impl Node {
    pub fn id(&self) -> NodeId {
        match self {
            Node::Dir(d) => d.id,
            Node::File(f) => f.id,
        }
    }

    pub fn parent(&self) -> NodeId {
        match self {
            Node::Dir(d) => d.parent,
            Node::File(f) => f.parent,
        }
    }

    pub fn set_parent(&mut self, parent: NodeId) {
        match self {
            Node::Dir(d) => d.parent = parent,
            Node::File(f) => f.parent = parent,
        }
    }

    pub fn name(&self) -> Option<&PathComponent> {
        match self {
            Node::Dir(d) => d.name.as_ref(),
            Node::File(f) => f.name.as_ref(),
        }
    }

    pub fn set_name(&mut self, name: Option<PathComponent>) {
        match self {
            Node::Dir(d) => d.name = name,
            Node::File(f) => f.name = name,
        }
    }

    pub fn attrs(&self) -> &AttrMap {
        match self {
            Node::Dir(d) => &d.attrs,
            Node::File(f) => &f.attrs,
        }
    }

    pub fn attrs_mut(&mut self) -> &mut AttrMap {
        match self {
            Node::Dir(d) => &mut d.attrs,
            Node::File(f) => &mut f.attrs,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Dir(_))
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Node::File(_))
    }

    pub fn is_root(&self) -> bool {
        self.is_dir() && self.name().is_none() && self.parent().is_null()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Node::Dir(_) => "directory",
            Node::File(_) => "file",
        }
    }

    pub fn as_dir(&self) -> Option<&DirNode> {
        match self {
            Node::Dir(d) => Some(d),
            Node::File(_) => None,
        }
    }

    pub fn as_dir_mut(&mut self) -> Option<&mut DirNode> {
        match self {
            Node::Dir(d) => Some(d),
            Node::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileNode> {
        match self {
            Node::File(f) => Some(f),
            Node::Dir(_) => None,
        }
    }

    pub fn as_file_mut(&mut self) -> Option<&mut FileNode> {
        match self {
            Node::File(f) => Some(f),
            Node::Dir(_) => None,
        }
    }

}

/// Structural/content equality of two nodes, ignoring cow bookkeeping.
/// When `compare_children` is false, directory children maps are not compared
/// (used when comparing nodes whose subtrees are compared separately).
pub fn shallow_equal(a: &Node, b: &Node, compare_children: bool, compare_content: bool) -> bool {
    if a.id() != b.id() || a.parent() != b.parent() || a.name() != b.name() {
        return false;
    }
    if a.attrs() != b.attrs() {
        return false;
    }
    match (a, b) {
        (Node::Dir(da), Node::Dir(db)) => !compare_children || da.children == db.children,
        (Node::File(fa), Node::File(fb)) => !compare_content || fa.content == fb.content,
        _ => false,
    }
}
