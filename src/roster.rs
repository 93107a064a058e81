//! The in-memory tree model (spec §3 "Roster", §4.2 "Roster operations").
//!
//! A [`Roster`] is `{ root, nodes }` where `nodes` maps [`NodeId`] to node
//! content. Nodes are stored behind `Arc` so that cloning a roster only
//! clones the top-level id-to-node map (pointer copies, no node content is
//! touched) and mutation unshares exactly the touched node via
//! `Arc::make_mut`. This is the "explicit refcount + version compare" COW
//! technique spec §9 names as equivalent to a persistent-tree
//! implementation: the observable contract (a clone is a fully independent
//! logical copy) holds regardless of which technique backs it.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::attr::{AttrKey, AttrValue};
use crate::error::{Result, RosterError, VertreeError};
use crate::hash::FileId;
use crate::node::{DirNode, FileNode, Node, NodeId, NodeIdSource, THE_NULL_NODE};
use crate::path::{FilePath, PathComponent};

/// `NodeId -> (parent, name)` ledger of nodes that have just been detached
/// from that exact spot. Re-attaching at the recorded slot is rejected; this
/// is how a non-normalized cset like `rename a -> a` is caught (spec §3).
pub type OldLocations = std::collections::HashMap<NodeId, (NodeId, PathComponent)>;

#[derive(Debug, Clone)]
pub struct Roster {
    root: NodeId,
    nodes: FxHashMap<NodeId, Arc<Node>>,
    old_locations: OldLocations,
}

impl Default for Roster {
    fn default() -> Self {
        Self::empty()
    }
}

impl Roster {
    /// A roster containing only the root directory.
    pub fn empty() -> Roster {
        let root_id = NodeId(1);
        let mut nodes = FxHashMap::default();
        nodes.insert(
            root_id,
            Arc::new(Node::Dir(DirNode {
                id: root_id,
                parent: THE_NULL_NODE,
                name: None,
                attrs: Default::default(),
                children: Default::default(),
            })),
        );
        Roster {
            root: root_id,
            nodes,
            old_locations: OldLocations::new(),
        }
    }

    /// Assembles a roster directly from a prepared node map, bypassing the
    /// attach/detach API. Used by the merge engine, which has already
    /// checked the structural validity of the map itself (spec §4.6).
    pub(crate) fn from_parts(root: NodeId, nodes: FxHashMap<NodeId, Arc<Node>>) -> Roster {
        Roster {
            root,
            nodes,
            old_locations: OldLocations::new(),
        }
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn has_root(&self) -> bool {
        self.nodes.contains_key(&self.root)
    }

    pub fn has_node_id(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        match self.nodes.get(&id) {
            Some(n) if n.is_root() => true,
            Some(n) => !n.parent().is_null(),
            None => false,
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().map(|(id, n)| (*id, n.as_ref()))
    }

    fn resolve(&self, path: &FilePath) -> Option<NodeId> {
        let mut current = self.root;
        for component in path.components() {
            let node = self.nodes.get(&current)?;
            let dir = node.as_dir()?;
            current = *dir.children.get(component)?;
        }
        Some(current)
    }

    pub fn get_node(&self, path: &FilePath) -> Result<&Node> {
        let id = self
            .resolve(path)
            .ok_or_else(|| RosterError::NotFound(path.clone()))?;
        self.get_node_by_id(id)
    }

    pub fn get_node_by_id(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(&id)
            .map(Arc::as_ref)
            .ok_or(RosterError::NotFoundById(id))
            .map_err(VertreeError::from)
    }

    pub fn get_node_for_update(&mut self, id: NodeId) -> Result<&mut Node> {
        let arc = self
            .nodes
            .get_mut(&id)
            .ok_or(RosterError::NotFoundById(id))?;
        Ok(Arc::make_mut(arc))
    }

    pub fn get_node_for_update_by_path(&mut self, path: &FilePath) -> Result<&mut Node> {
        let id = self
            .resolve(path)
            .ok_or_else(|| RosterError::NotFound(path.clone()))?;
        self.get_node_for_update(id)
    }

    /// Returns the full path to `id` by walking parent links to the root.
    pub fn get_name(&self, id: NodeId) -> Result<FilePath> {
        let mut components = Vec::new();
        let mut current = id;
        loop {
            let node = self.get_node_by_id(current)?;
            if node.is_root() {
                break;
            }
            let name = node
                .name()
                .cloned()
                .ok_or(RosterError::NotFoundById(current))?;
            components.push(name);
            current = node.parent();
        }
        components.reverse();
        Ok(FilePath::from_components(components))
    }

    // ---- editable-tree operations (spec §4.2) ----

    /// Detaches the node at `src` from its parent, recording the slot in
    /// `old_locations`. Fails on the root or a missing path.
    pub fn detach_node(&mut self, src: &FilePath) -> Result<NodeId> {
        if src.is_root() {
            return Err(RosterError::CannotDetachRoot.into());
        }
        let id = self
            .resolve(src)
            .ok_or_else(|| RosterError::NotFound(src.clone()))?;
        self.detach_by_id(id)
    }

    fn detach_by_id(&mut self, id: NodeId) -> Result<NodeId> {
        let (parent_id, name) = {
            let node = self.get_node_by_id(id)?;
            let parent_id = node.parent();
            let name = node
                .name()
                .cloned()
                .ok_or(RosterError::CannotDetachRoot)?;
            (parent_id, name)
        };
        {
            let parent_path = self.get_name(parent_id).unwrap_or_default();
            let parent = self.get_node_for_update(parent_id)?;
            let dir = parent
                .as_dir_mut()
                .ok_or_else(|| RosterError::NotADirectory(parent_path))?;
            dir.children.remove(&name);
        }
        {
            let node = self.get_node_for_update(id)?;
            node.set_parent(THE_NULL_NODE);
            node.set_name(None);
        }
        self.old_locations.insert(id, (parent_id, name));
        Ok(id)
    }

    /// Erases `id` and, recursively, every node still reachable from it.
    /// Fails if `id` is still attached.
    pub fn drop_detached_node(&mut self, id: NodeId) -> Result<()> {
        if self.is_attached(id) {
            return Err(RosterError::StillAttached(id).into());
        }
        self.old_locations.remove(&id);
        self.drop_subtree(id)
    }

    fn drop_subtree(&mut self, id: NodeId) -> Result<()> {
        let children: Vec<NodeId> = match self.nodes.get(&id).map(Arc::as_ref) {
            Some(Node::Dir(d)) => d.children.values().copied().collect(),
            Some(Node::File(_)) => Vec::new(),
            None => return Err(RosterError::NotFoundById(id).into()),
        };
        for child in children {
            self.drop_subtree(child)?;
        }
        self.nodes.remove(&id);
        Ok(())
    }

    pub fn create_dir_node(&mut self, nis: &mut dyn NodeIdSource) -> NodeId {
        let id = nis.next();
        self.nodes.insert(
            id,
            Arc::new(Node::Dir(DirNode {
                id,
                parent: THE_NULL_NODE,
                name: None,
                attrs: Default::default(),
                children: Default::default(),
            })),
        );
        id
    }

    pub fn create_file_node(&mut self, content: FileId, nis: &mut dyn NodeIdSource) -> NodeId {
        let id = nis.next();
        self.nodes.insert(
            id,
            Arc::new(Node::File(FileNode {
                id,
                parent: THE_NULL_NODE,
                name: None,
                attrs: Default::default(),
                content,
            })),
        );
        id
    }

    /// Attaches a detached node under `parent_id` as `name`.
    ///
    /// Fails if `(parent_id, name)` is exactly where the node was just
    /// detached from, if a sibling already has that name, or if `parent_id`
    /// is not a directory.
    pub fn attach_node(&mut self, id: NodeId, parent_id: NodeId, name: PathComponent) -> Result<()> {
        if let Some((old_parent, old_name)) = self.old_locations.get(&id) {
            if *old_parent == parent_id && *old_name == name {
                return Err(RosterError::ReattachAtOldLocation(id).into());
            }
        }
        {
            let parent = self.get_node_by_id(parent_id)?;
            let dir = parent
                .as_dir()
                .ok_or_else(|| RosterError::NotADirectory(self.get_name(parent_id).unwrap_or_default()))?;
            if dir.children.contains_key(&name) {
                return Err(RosterError::NameCollision {
                    parent: self.get_name(parent_id).unwrap_or_default(),
                    name: name.as_str().to_string(),
                }
                .into());
            }
        }
        {
            let node = self.get_node_for_update(id)?;
            node.set_parent(parent_id);
            node.set_name(Some(name.clone()));
        }
        {
            let parent = self.get_node_for_update(parent_id)?;
            let dir = parent.as_dir_mut().expect("checked above");
            dir.children.insert(name, id);
        }
        self.old_locations.remove(&id);
        Ok(())
    }

    pub fn attach_node_at(&mut self, id: NodeId, dst: &FilePath) -> Result<()> {
        let parent_path = dst.parent().ok_or(RosterError::CannotDetachRoot)?;
        let name = dst
            .basename()
            .cloned()
            .ok_or(RosterError::CannotDetachRoot)?;
        let parent_id = self
            .resolve(&parent_path)
            .ok_or_else(|| RosterError::NotFound(parent_path))?;
        self.attach_node(id, parent_id, name)
    }

    pub fn apply_delta(&mut self, path: &FilePath, old_id: FileId, new_id: FileId) -> Result<()> {
        let id = self
            .resolve(path)
            .ok_or_else(|| RosterError::NotFound(path.clone()))?;
        let node = self.get_node_for_update(id)?;
        let file = node.as_file_mut().ok_or_else(|| RosterError::WrongKind {
            path: path.clone(),
            expected: "file",
            found: "directory",
        })?;
        if file.content != old_id {
            return Err(VertreeError::ContentMismatch {
                path: path.clone(),
                expected: old_id,
                actual: file.content,
            });
        }
        file.content = new_id;
        Ok(())
    }

    pub fn set_attr(&mut self, path: &FilePath, key: AttrKey, value: AttrValue) -> Result<()> {
        let node = self.get_node_for_update_by_path(path)?;
        node.attrs_mut().insert(key, (true, value));
        Ok(())
    }

    pub fn clear_attr(&mut self, path: &FilePath, key: &AttrKey) -> Result<()> {
        let node = self.get_node_for_update_by_path(path)?;
        let attrs = node.attrs_mut();
        match attrs.get_mut(key) {
            Some((live, _)) => *live = false,
            None => {
                attrs.insert(key.clone(), (false, AttrValue(String::new())));
            }
        }
        Ok(())
    }

    pub fn get_attr(&self, path: &FilePath, key: &AttrKey) -> Result<Option<&AttrValue>> {
        let node = self.get_node(path)?;
        Ok(node.attrs().get(key).filter(|(live, _)| *live).map(|(_, v)| v))
    }

    /// Maps every non-root node id reachable from the root to its path.
    pub fn collect_id_paths(&self) -> Result<std::collections::BTreeMap<NodeId, FilePath>> {
        let mut out = std::collections::BTreeMap::new();
        self.collect_id_paths_rec(self.root, FilePath::root(), &mut out)?;
        Ok(out)
    }

    fn collect_id_paths_rec(
        &self,
        id: NodeId,
        path: FilePath,
        out: &mut std::collections::BTreeMap<NodeId, FilePath>,
    ) -> Result<()> {
        if !path.is_root() {
            out.insert(id, path.clone());
        }
        if let Node::Dir(d) = self.get_node_by_id(id)? {
            for (name, child_id) in &d.children {
                self.collect_id_paths_rec(*child_id, path.child(name.clone()), out)?;
            }
        }
        Ok(())
    }

    /// Maps every non-root node's path to its id, in canonical path order
    /// (used by basic_io's DFS-by-path serialization, spec §4.7).
    pub fn collect_path_ids(&self) -> Result<std::collections::BTreeMap<FilePath, NodeId>> {
        Ok(self
            .collect_id_paths()?
            .into_iter()
            .map(|(id, path)| (path, id))
            .collect())
    }

    pub fn extract_path_set(&self) -> Result<std::collections::BTreeSet<FilePath>> {
        let mut out = std::collections::BTreeSet::new();
        self.collect_paths(self.root, FilePath::root(), &mut out)?;
        Ok(out)
    }

    fn collect_paths(
        &self,
        id: NodeId,
        path: FilePath,
        out: &mut std::collections::BTreeSet<FilePath>,
    ) -> Result<()> {
        out.insert(path.clone());
        if let Node::Dir(d) = self.get_node_by_id(id)? {
            for (name, child_id) in &d.children {
                self.collect_paths(*child_id, path.child(name.clone()), out)?;
            }
        }
        Ok(())
    }

    /// Invariant check: root present and a directory, every reachable node is
    /// present exactly once, every stored node is reachable, ids unique
    /// (guaranteed by the map itself). Returns an `IntegrityAssertion` on
    /// failure.
    pub fn check_sane(&self) -> Result<()> {
        let root = self.get_node_by_id(self.root)?;
        crate::error::invariant!(root.is_root(), "root node {} is not a root dir", self.root);
        let mut seen = std::collections::HashSet::new();
        self.check_reachable(self.root, &mut seen)?;
        crate::error::invariant!(
            seen.len() == self.nodes.len(),
            "roster has {} unreachable node(s)",
            self.nodes.len() - seen.len()
        );
        Ok(())
    }

    fn check_reachable(
        &self,
        id: NodeId,
        seen: &mut std::collections::HashSet<NodeId>,
    ) -> Result<()> {
        crate::error::invariant!(seen.insert(id), "node {id} reachable via two paths");
        if let Node::Dir(d) = self.get_node_by_id(id)? {
            for child_id in d.children.values() {
                let child = self.get_node_by_id(*child_id)?;
                crate::error::invariant!(
                    child.parent() == id,
                    "node {child_id} has inconsistent parent link"
                );
                self.check_reachable(*child_id, seen)?;
            }
        }
        Ok(())
    }
}

impl PartialEq for Roster {
    fn eq(&self, other: &Self) -> bool {
        equal_shapes_and_content(self, other)
    }
}
impl Eq for Roster {}

fn equal_shapes_and_content(a: &Roster, b: &Roster) -> bool {
    if a.root != b.root || a.nodes.len() != b.nodes.len() {
        return false;
    }
    a.nodes.iter().all(|(id, node)| match b.nodes.get(id) {
        Some(other) => crate::node::shallow_equal(node, other, true, true),
        None => false,
    })
}

/// Structural equality of two `(roster, markings)` pairs modulo a node-id
/// bijection: used to pin merge commutativity (spec §8 item 5), grounded on
/// `roster.hh`'s `equal_up_to_renumbering`.
pub fn equal_up_to_renumbering(
    a: &Roster,
    a_marks: &crate::marking::MarkingMap,
    b: &Roster,
    b_marks: &crate::marking::MarkingMap,
) -> bool {
    fn walk(
        a: &Roster,
        b: &Roster,
        a_id: NodeId,
        b_id: NodeId,
        mapping: &mut FxHashMap<NodeId, NodeId>,
    ) -> bool {
        if let Some(mapped) = mapping.get(&a_id) {
            return *mapped == b_id;
        }
        let Ok(na) = a.get_node_by_id(a_id) else {
            return false;
        };
        let Ok(nb) = b.get_node_by_id(b_id) else {
            return false;
        };
        if na.name() != nb.name() || na.attrs() != nb.attrs() {
            return false;
        }
        mapping.insert(a_id, b_id);
        match (na, nb) {
            (Node::File(fa), Node::File(fb)) => fa.content == fb.content,
            (Node::Dir(da), Node::Dir(db)) => {
                if da.children.len() != db.children.len() {
                    return false;
                }
                da.children.keys().eq(db.children.keys())
                    && da
                        .children
                        .iter()
                        .all(|(name, a_child)| {
                            db.children
                                .get(name)
                                .is_some_and(|b_child| walk(a, b, *a_child, *b_child, mapping))
                        })
            }
            _ => false,
        }
    }
    let mut mapping = FxHashMap::default();
    if !walk(a, b, a.root_id(), b.root_id(), &mut mapping) {
        return false;
    }
    if a_marks.len() != b_marks.len() {
        return false;
    }
    mapping.iter().all(|(a_id, b_id)| {
        match (a_marks.get(*a_id), b_marks.get(*b_id)) {
            (Some(ma), Some(mb)) => ma == mb,
            _ => false,
        }
    })
}
