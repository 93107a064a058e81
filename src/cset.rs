//! The change-set algebra: structural diff between two rosters, its
//! canonical form, and application back onto a roster (spec §3 "Change Set",
//! §4.3 "Cset application", §4.4 "Cset derivation").

use std::collections::{BTreeMap, BTreeSet};

use crate::attr::{AttrKey, AttrValue};
use crate::error::{Result, VertreeError};
use crate::hash::FileId;
use crate::node::{Node, NodeId, NodeIdSource};
use crate::path::FilePath;
use crate::roster::Roster;

/// A structured, sorted, normalized record of edits from one roster to
/// another. Each field is a `BTreeMap`/`BTreeSet`, so iteration order is
/// always the canonical path order the spec requires for serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub nodes_deleted: BTreeSet<FilePath>,
    pub nodes_renamed: BTreeMap<FilePath, FilePath>,
    pub dirs_added: BTreeSet<FilePath>,
    pub files_added: BTreeMap<FilePath, FileId>,
    pub deltas_applied: BTreeMap<FilePath, (FileId, FileId)>,
    pub attrs_cleared: BTreeSet<(FilePath, AttrKey)>,
    pub attrs_set: BTreeMap<(FilePath, AttrKey), AttrValue>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.nodes_deleted.is_empty()
            && self.nodes_renamed.is_empty()
            && self.dirs_added.is_empty()
            && self.files_added.is_empty()
            && self.deltas_applied.is_empty()
            && self.attrs_cleared.is_empty()
            && self.attrs_set.is_empty()
    }

    /// Checks the normalization rules from spec §3: no path in two sections
    /// contradictorily, no identity rename, no add immediately shadowed by a
    /// delete, no attr both cleared and set at once.
    pub fn validate(&self) -> Result<()> {
        for (src, dst) in &self.nodes_renamed {
            if src == dst {
                return Err(invalid(src, "rename is a no-op (identity rename)"));
            }
            if self.nodes_deleted.contains(src) {
                return Err(invalid(src, "path is both deleted and renamed"));
            }
        }

        let mut destinations: BTreeSet<&FilePath> = BTreeSet::new();
        for dst in self.nodes_renamed.values() {
            if !destinations.insert(dst) {
                return Err(invalid(dst, "two edits claim the same destination path"));
            }
        }
        for path in &self.dirs_added {
            if !destinations.insert(path) {
                return Err(invalid(path, "two edits claim the same destination path"));
            }
            if self.nodes_deleted.contains(path) {
                return Err(invalid(path, "path is both deleted and added"));
            }
        }
        for path in self.files_added.keys() {
            if !destinations.insert(path) {
                return Err(invalid(path, "two edits claim the same destination path"));
            }
            if self.nodes_deleted.contains(path) {
                return Err(invalid(path, "path is both deleted and added"));
            }
        }

        for (path, key) in &self.attrs_cleared {
            if self.attrs_set.contains_key(&(path.clone(), key.clone())) {
                return Err(invalid(path, format!("attr {key} is both cleared and set")));
            }
        }

        Ok(())
    }
}

fn invalid(path: &FilePath, reason: impl Into<String>) -> VertreeError {
    VertreeError::CsetInvalid {
        path: path.clone(),
        reason: reason.into(),
    }
}

/// Applies `cs` to `roster`, producing a new roster. Runs the seven sections
/// in the fixed order from spec §4.3 on a scratch clone, discarding it if any
/// step fails.
pub fn apply_cset(roster: &Roster, cs: &ChangeSet, nis: &mut dyn NodeIdSource) -> Result<Roster> {
    cs.validate()?;
    let mut r = roster.clone();

    // 1. Deletes. Processed deepest-path-first so that deleting a directory
    // only happens once every entry it contained has already been removed;
    // the canonical *serialized* order (spec §4.7) is still ascending path
    // order, this is purely an execution-order choice (see DESIGN.md).
    let mut deletes: Vec<&FilePath> = cs.nodes_deleted.iter().collect();
    deletes.sort_by(|a, b| b.depth().cmp(&a.depth()).then_with(|| a.cmp(b)));
    for path in deletes {
        let id = {
            let node = r.get_node(path).map_err(|_| invalid(path, "no such node"))?;
            if let Node::Dir(d) = node {
                if !d.children.is_empty() {
                    return Err(invalid(path, "cannot delete a non-empty directory"));
                }
            }
            node.id()
        };
        r.detach_node(path)?;
        r.drop_detached_node(id)?;
    }

    // 2. Renames. Every source is detached before any destination is
    // attached, so a rename chain or swap among the renamed set (a.txt ->
    // b.txt, b.txt -> c.txt) doesn't spuriously fail on an intermediate
    // path that's simultaneously a destination-not-yet-vacated and a
    // source-not-yet-detached.
    let mut detached: Vec<(&FilePath, NodeId)> = Vec::with_capacity(cs.nodes_renamed.len());
    for (src, dst) in &cs.nodes_renamed {
        let id = r.detach_node(src).map_err(|_| invalid(src, "no such node"))?;
        detached.push((dst, id));
    }
    for (dst, id) in detached {
        r.attach_node_at(id, dst)
            .map_err(|_| invalid(dst, "destination parent does not exist, or is occupied"))?;
    }

    // 3. Directory adds.
    for path in &cs.dirs_added {
        let id = r.create_dir_node(nis);
        r.attach_node_at(id, path).map_err(|e| {
            let _ = r.drop_detached_node(id);
            invalid(path, format!("cannot add directory: {e}"))
        })?;
    }

    // 4. File adds.
    for (path, fid) in &cs.files_added {
        let id = r.create_file_node(*fid, nis);
        r.attach_node_at(id, path).map_err(|e| {
            let _ = r.drop_detached_node(id);
            invalid(path, format!("cannot add file: {e}"))
        })?;
    }

    // 5. Content deltas.
    for (path, (old_fid, new_fid)) in &cs.deltas_applied {
        r.apply_delta(path, *old_fid, *new_fid)?;
    }

    // 6. Attr clears.
    for (path, key) in &cs.attrs_cleared {
        r.get_node(path).map_err(|_| invalid(path, "no such node"))?;
        r.clear_attr(path, key)?;
    }

    // 7. Attr sets.
    for ((path, key), value) in &cs.attrs_set {
        r.get_node(path).map_err(|_| invalid(path, "no such node"))?;
        r.set_attr(path, key.clone(), value.clone())?;
    }

    Ok(r)
}

/// Computes the minimal cset whose application to `a` yields `b`: renames
/// and content patches are preferred over delete+add whenever a node id is
/// preserved across the two rosters (spec §4.4).
pub fn diff_rosters(a: &Roster, b: &Roster) -> Result<ChangeSet> {
    let mut cs = ChangeSet::default();

    let ids_a = a.collect_id_paths()?;
    let ids_b = b.collect_id_paths()?;

    for (id, path_a) in &ids_a {
        let Some(path_b) = ids_b.get(id) else {
            cs.nodes_deleted.insert(path_a.clone());
            continue;
        };
        if path_a != path_b {
            cs.nodes_renamed.insert(path_a.clone(), path_b.clone());
        }

        let node_a = a.get_node_by_id(*id)?;
        let node_b = b.get_node_by_id(*id)?;

        if let (Node::File(fa), Node::File(fb)) = (node_a, node_b) {
            if fa.content != fb.content {
                cs.deltas_applied
                    .insert(path_b.clone(), (fa.content, fb.content));
            }
        }

        diff_attrs(node_a, node_b, path_b, &mut cs);
    }

    for (id, path_b) in &ids_b {
        if ids_a.contains_key(id) {
            continue;
        }
        let node_b = b.get_node_by_id(*id)?;
        match node_b {
            Node::Dir(_) => {
                cs.dirs_added.insert(path_b.clone());
            }
            Node::File(f) => {
                cs.files_added.insert(path_b.clone(), f.content);
            }
        }
        for (key, (live, val)) in node_b.attrs() {
            if *live {
                cs.attrs_set.insert((path_b.clone(), key.clone()), val.clone());
            } else {
                cs.attrs_cleared.insert((path_b.clone(), key.clone()));
            }
        }
    }

    Ok(cs)
}

fn diff_attrs(node_a: &Node, node_b: &Node, path_b: &FilePath, cs: &mut ChangeSet) {
    let mut keys: BTreeSet<&AttrKey> = node_a.attrs().keys().collect();
    keys.extend(node_b.attrs().keys());
    for key in keys {
        let av = node_a.attrs().get(key);
        let bv = node_b.attrs().get(key);
        if av == bv {
            continue;
        }
        match bv {
            Some((true, val)) => {
                cs.attrs_set.insert((path_b.clone(), key.clone()), val.clone());
            }
            Some((false, _)) => {
                cs.attrs_cleared.insert((path_b.clone(), key.clone()));
            }
            None => {
                // the node model never drops an attr key outright; a key
                // present only in `a` cannot occur for a preserved node id.
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::attr::{AttrKey, AttrValue};
    use crate::node::TempNodeIdSource;

    fn path(s: &str) -> FilePath {
        FilePath::split(s).unwrap()
    }

    #[test]
    fn diff_then_apply_round_trips_add() {
        let a = Roster::empty();
        let mut nis = TempNodeIdSource::new();
        let mut b = Roster::empty();
        let id = b.create_file_node(FileId::of(b"hello\n"), &mut nis);
        b.attach_node_at(id, &path("a.txt")).unwrap();

        let cs = diff_rosters(&a, &b).unwrap();
        assert_eq!(cs.files_added.get(&path("a.txt")), Some(&FileId::of(b"hello\n")));

        let mut nis2 = TempNodeIdSource::new();
        let applied = apply_cset(&a, &cs, &mut nis2).unwrap();
        assert_eq!(
            applied.get_node(&path("a.txt")).unwrap().as_file().unwrap().content,
            FileId::of(b"hello\n")
        );
    }

    #[test]
    fn diff_detects_rename() {
        let mut nis = TempNodeIdSource::new();
        let mut a = Roster::empty();
        let id = a.create_file_node(FileId::of(b"x"), &mut nis);
        a.attach_node_at(id, &path("a.txt")).unwrap();

        let mut b = a.clone();
        let moved = b.detach_node(&path("a.txt")).unwrap();
        b.attach_node_at(moved, &path("b.txt")).unwrap();

        let cs = diff_rosters(&a, &b).unwrap();
        assert_eq!(cs.nodes_renamed.get(&path("a.txt")), Some(&path("b.txt")));
        assert!(cs.nodes_deleted.is_empty());
        assert!(cs.files_added.is_empty());
    }

    #[test]
    fn diff_detects_patch_over_delete_add() {
        let mut nis = TempNodeIdSource::new();
        let mut a = Roster::empty();
        let id = a.create_file_node(FileId::of(b"x"), &mut nis);
        a.attach_node_at(id, &path("a.txt")).unwrap();

        let mut b = a.clone();
        b.apply_delta(&path("a.txt"), FileId::of(b"x"), FileId::of(b"y"))
            .unwrap();

        let cs = diff_rosters(&a, &b).unwrap();
        assert_eq!(
            cs.deltas_applied.get(&path("a.txt")),
            Some(&(FileId::of(b"x"), FileId::of(b"y")))
        );
        assert!(cs.nodes_renamed.is_empty());
    }

    #[test]
    fn diff_on_equal_rosters_is_empty() {
        let mut nis = TempNodeIdSource::new();
        let mut a = Roster::empty();
        let id = a.create_file_node(FileId::of(b"x"), &mut nis);
        a.attach_node_at(id, &path("a.txt")).unwrap();

        let cs = diff_rosters(&a, &a).unwrap();
        assert!(cs.is_empty());

        let mut nis2 = TempNodeIdSource::new();
        let applied = apply_cset(&a, &cs, &mut nis2).unwrap();
        assert_eq!(applied, a);
    }

    #[test]
    fn identity_rename_is_rejected() {
        let mut nis = TempNodeIdSource::new();
        let mut a = Roster::empty();
        let id = a.create_file_node(FileId::of(b"x"), &mut nis);
        a.attach_node_at(id, &path("a.txt")).unwrap();

        let mut cs = ChangeSet::default();
        cs.nodes_renamed
            .insert(path("a.txt"), path("a.txt"));

        let mut nis2 = TempNodeIdSource::new();
        assert!(apply_cset(&a, &cs, &mut nis2).is_err());
    }

    #[test]
    fn delete_non_empty_directory_is_rejected() {
        let mut nis = TempNodeIdSource::new();
        let mut a = Roster::empty();
        let dir_id = a.create_dir_node(&mut nis);
        a.attach_node_at(dir_id, &path("d")).unwrap();
        let file_id = a.create_file_node(FileId::of(b"x"), &mut nis);
        a.attach_node_at(file_id, &path("d/a.txt")).unwrap();

        let mut cs = ChangeSet::default();
        cs.nodes_deleted.insert(path("d"));

        let mut nis2 = TempNodeIdSource::new();
        assert!(apply_cset(&a, &cs, &mut nis2).is_err());
    }

    #[test]
    fn delete_whole_subtree_bottom_up() {
        let mut nis = TempNodeIdSource::new();
        let mut a = Roster::empty();
        let dir_id = a.create_dir_node(&mut nis);
        a.attach_node_at(dir_id, &path("d")).unwrap();
        let file_id = a.create_file_node(FileId::of(b"x"), &mut nis);
        a.attach_node_at(file_id, &path("d/a.txt")).unwrap();

        let b = Roster::empty();
        let cs = diff_rosters(&a, &b).unwrap();
        assert_eq!(cs.nodes_deleted.len(), 2);

        let mut nis2 = TempNodeIdSource::new();
        let applied = apply_cset(&a, &cs, &mut nis2).unwrap();
        assert_eq!(applied, b);
    }

    #[test]
    fn content_mismatch_on_delta_is_rejected() {
        let mut nis = TempNodeIdSource::new();
        let mut a = Roster::empty();
        let id = a.create_file_node(FileId::of(b"x"), &mut nis);
        a.attach_node_at(id, &path("a.txt")).unwrap();

        let mut cs = ChangeSet::default();
        cs.deltas_applied
            .insert(path("a.txt"), (FileId::of(b"not-x"), FileId::of(b"y")));

        let mut nis2 = TempNodeIdSource::new();
        let err = apply_cset(&a, &cs, &mut nis2).unwrap_err();
        assert!(matches!(err, VertreeError::ContentMismatch { .. }));
    }

    #[test]
    fn dormant_attr_clear_round_trips() {
        let mut nis = TempNodeIdSource::new();
        let mut a = Roster::empty();
        let id = a.create_file_node(FileId::of(b"x"), &mut nis);
        a.attach_node_at(id, &path("a.txt")).unwrap();
        a.set_attr(&path("a.txt"), AttrKey::from("executable"), AttrValue::from("true"))
            .unwrap();

        let mut b = a.clone();
        b.clear_attr(&path("a.txt"), &AttrKey::from("executable"))
            .unwrap();

        let cs = diff_rosters(&a, &b).unwrap();
        assert!(cs.attrs_cleared.contains(&(path("a.txt"), AttrKey::from("executable"))));

        let mut nis2 = TempNodeIdSource::new();
        let applied = apply_cset(&a, &cs, &mut nis2).unwrap();
        assert_eq!(applied, b);
 
    }
}
