//! Three-way merge of rosters and markings (spec §4.6).

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::attr::AttrKey;
use crate::database::{ConflictResolver, Resolution};
use crate::error::MergeConflictError;
use crate::hash::{FileId, RevisionId};
use crate::marking::{changed as aspect_changed, mark_merge_roster, MarkingMap};
use crate::node::{DirNode, FileNode, Node, NodeId};
use crate::observer::Observer;
use crate::path::PathComponent;
use crate::roster::Roster;

/// The taxonomy enumerated in spec §7. `InvalidName` is unreachable through
/// this crate's own API (every name is a validated [`PathComponent`] before
/// it can reach the merge engine) and is kept only so the enum matches the
/// taxonomy a collaborator's own validation layer may still raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    Content,
    DuplicateName,
    OrphanedNode,
    InvalidName,
    Attr,
    MissingRoot,
    MultipleNames,
    DirectoryLoop,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConflictKind::Content => "content conflict",
            ConflictKind::DuplicateName => "duplicate name conflict",
            ConflictKind::OrphanedNode => "orphaned node conflict",
            ConflictKind::InvalidName => "invalid name conflict",
            ConflictKind::Attr => "attribute conflict",
            ConflictKind::MissingRoot => "missing root conflict",
            ConflictKind::MultipleNames => "multiple names conflict",
            ConflictKind::DirectoryLoop => "directory loop conflict",
        })
    }
}

pub type Conflict = MergeConflictError;

/// One parent side of a merge: the roster at that side's tip, its marking
/// map, and the set of revisions on its side of history not shared with the
/// other parent (spec §4.5's "uncommon ancestors").
pub struct MergeSide {
    pub roster: Roster,
    pub markings: MarkingMap,
    pub uncommon: HashSet<RevisionId>,
}

/// Outcome of [`three_way_merge`]. `roster`/`markings` are `None` when any
/// conflict in `conflicts` was left unresolved: spec §4.6 requires *all*
/// conflicts to be reported in one pass rather than failing on the first.
pub struct MergeResult {
    pub roster: Option<Roster>,
    pub markings: Option<MarkingMap>,
    pub conflicts: Vec<Conflict>,
}

enum ResolvedKind {
    Dir,
    File(FileId),
}

struct ResolvedNode {
    parent: NodeId,
    name: Option<PathComponent>,
    kind: ResolvedKind,
    attrs: crate::attr::AttrMap,
}

/// Resolves one mark-bearing value: if only one side changed it, that side's
/// value wins; if both changed it to the same value, that value is the
/// result; if both changed it to different values, `None` signals a
/// conflict the caller must handle. Mirrors `marking::resolve_aspect`'s
/// branching but returns the winning *value* rather than the winning mark
/// set, since the merge engine needs both.
fn resolve_value<T: PartialEq + Clone>(
    left_val: &T,
    right_val: &T,
    left_marks: &BTreeSet<RevisionId>,
    right_marks: &BTreeSet<RevisionId>,
    left_uncommon: &HashSet<RevisionId>,
    right_uncommon: &HashSet<RevisionId>,
) -> Result<T, ()> {
    let left_changed = aspect_changed(left_marks, left_uncommon);
    let right_changed = aspect_changed(right_marks, right_uncommon);
    match (left_changed, right_changed) {
        (false, false) | (true, false) => Ok(left_val.clone()),
        (false, true) => Ok(right_val.clone()),
        (true, true) if left_val == right_val => Ok(left_val.clone()),
        (true, true) => Err(()),
    }
}

fn node_label(left: &Roster, right: &Roster, id: NodeId) -> String {
    left.get_name(id)
        .or_else(|_| right.get_name(id))
        .map(|p| p.to_string())
        .unwrap_or_else(|_| format!("node {id}"))
}

/// Merges `left` and `right`, both projected from `base`, into a single
/// roster plus markings, or a list of conflicts if any aspect could not be
/// resolved automatically (spec §4.6).
pub fn three_way_merge(
    base: &Roster,
    left: &MergeSide,
    right: &MergeSide,
    new_rid: RevisionId,
    resolver: &mut dyn ConflictResolver,
    observer: &mut dyn Observer,
) -> MergeResult {
    let mut conflicts = Vec::new();

    let mut all_ids: BTreeSet<NodeId> = BTreeSet::new();
    all_ids.extend(base.all_nodes().map(|(id, _)| id));
    all_ids.extend(left.roster.all_nodes().map(|(id, _)| id));
    all_ids.extend(right.roster.all_nodes().map(|(id, _)| id));

    let root_id = left.roster.root_id();

    let mut resolved: BTreeMap<NodeId, ResolvedNode> = BTreeMap::new();

    for id in all_ids {
        let in_base = base.has_node_id(id);
        let on_left = left.roster.get_node_by_id(id).ok();
        let on_right = right.roster.get_node_by_id(id).ok();

        // Presence: if neither side changed whether the node exists relative
        // to the base, it keeps the base's presence; if only one side
        // changed it, that side wins. A node absent from the base cannot be
        // independently "deleted" by either side, so this never produces a
        // genuine presence conflict (see DESIGN.md).
        let left_changed_presence = on_left.is_some() != in_base;
        let right_changed_presence = on_right.is_some() != in_base;
        let present = match (left_changed_presence, right_changed_presence) {
            (false, false) => in_base,
            (true, false) => on_left.is_some(),
            (false, true) => on_right.is_some(),
            (true, true) => on_left.is_some(),
        };
        if !present {
            continue;
        }

        if id == root_id {
            resolved.insert(
                id,
                ResolvedNode {
                    parent: crate::node::THE_NULL_NODE,
                    name: None,
                    kind: ResolvedKind::Dir,
                    attrs: resolve_attrs(on_left, on_right, left, right, &mut conflicts, id),
                },
            );
            continue;
        }

        let (parent, name) = match (on_left, on_right) {
            (Some(l), Some(r)) => {
                let lm = left
                    .markings
                    .get(id)
                    .expect("left marking present for left node");
                let rm = right
                    .markings
                    .get(id)
                    .expect("right marking present for right node");
                match resolve_value(
                    &(l.parent(), l.name().cloned()),
                    &(r.parent(), r.name().cloned()),
                    &lm.parent_name,
                    &rm.parent_name,
                    &left.uncommon,
                    &right.uncommon,
                ) {
                    Ok(v) => v,
                    Err(()) => {
                        conflicts.push(Conflict {
                            kind: ConflictKind::MultipleNames,
                            locations: vec![node_label(&left.roster, &right.roster, id)],
                        });
                        (l.parent(), l.name().cloned())
                    }
                }
            }
            (Some(l), None) => (l.parent(), l.name().cloned()),
            (None, Some(r)) => (r.parent(), r.name().cloned()),
            (None, None) => unreachable!("present implies at least one side has the node"),
        };

        let kind = match (on_left, on_right) {
            (Some(Node::File(lf)), Some(Node::File(rf))) => {
                let lm = left.markings.get(id).expect("left marking present");
                let rm = right.markings.get(id).expect("right marking present");
                match resolve_value(
                    &lf.content,
                    &rf.content,
                    &lm.file_content,
                    &rm.file_content,
                    &left.uncommon,
                    &right.uncommon,
                ) {
                    Ok(c) => ResolvedKind::File(c),
                    Err(()) => match resolver.resolve_content(lf.content, rf.content) {
                        Resolution::Use(fid) => ResolvedKind::File(fid),
                        Resolution::Defer => {
                            conflicts.push(Conflict {
                                kind: ConflictKind::Content,
                                locations: vec![node_label(&left.roster, &right.roster, id)],
                            });
                            ResolvedKind::File(lf.content)
                        }
                    },
                }
            }
            (Some(Node::File(lf)), _) => ResolvedKind::File(lf.content),
            (_, Some(Node::File(rf))) => ResolvedKind::File(rf.content),
            _ => ResolvedKind::Dir,
        };

        let attrs = resolve_attrs(on_left, on_right, left, right, &mut conflicts, id);

        resolved.insert(
            id,
            ResolvedNode {
                parent,
                name,
                kind,
                attrs,
            },
        );
    }

    if !resolved.contains_key(&root_id) {
        conflicts.push(Conflict {
            kind: ConflictKind::MissingRoot,
            locations: vec![format!("node {root_id}")],
        });
        observer.warn("merge aborted: root node did not survive on either side");
        return MergeResult {
            roster: None,
            markings: None,
            conflicts,
        };
    }

    // Duplicate / multiple name conflicts: distinct surviving ids claiming
    // the same (parent, name) slot.
    let mut by_slot: BTreeMap<(NodeId, PathComponent), Vec<NodeId>> = BTreeMap::new();
    for (&id, r) in &resolved {
        if id == root_id {
            continue;
        }
        let name = r.name.clone().expect("non-root present node has a name");
        by_slot.entry((r.parent, name)).or_default().push(id);
    }
    let mut taken_slots: BTreeSet<(NodeId, PathComponent)> = by_slot.keys().cloned().collect();
    for ((parent, name), ids) in &by_slot {
        if ids.len() <= 1 {
            continue;
        }
        match resolver.resolve_duplicate_name(*parent, name, ids) {
            Resolution::Use(winner) if ids.contains(&winner) => {
                for &loser in ids {
                    if loser == winner {
                        continue;
                    }
                    let mut disambiguated = PathComponent::new(format!("{name}~{loser}"))
                        .expect("name plus a numeric suffix stays a valid component");
                    while taken_slots.contains(&(*parent, disambiguated.clone())) {
                        disambiguated = PathComponent::new(format!("{disambiguated}~dup"))
                            .expect("name plus a numeric suffix stays a valid component");
                    }
                    taken_slots.insert((*parent, disambiguated.clone()));
                    resolved
                        .get_mut(&loser)
                        .expect("loser id came from resolved map")
                        .name = Some(disambiguated);
                }
            }
            _ => {
                let kind = if ids.len() == 2 {
                    ConflictKind::DuplicateName
                } else {
                    ConflictKind::MultipleNames
                };
                conflicts.push(Conflict {
                    kind,
                    locations: ids
                        .iter()
                        .map(|id| format!("node {id} -> {parent}/{name}"))
                        .collect(),
                });
            }
        }
    }

    // Orphaned nodes: surviving node whose resolved parent did not survive.
    for (&id, r) in &resolved {
        if id == root_id {
            continue;
        }
        if !resolved.contains_key(&r.parent) {
            conflicts.push(Conflict {
                kind: ConflictKind::OrphanedNode,
                locations: vec![node_label(&left.roster, &right.roster, id)],
            });
        }
    }

    // Directory-loop: every surviving node's parent chain must reach root
    // within |resolved| steps.
    for &id in resolved.keys() {
        let mut current = id;
        let mut steps = 0;
        loop {
            if current == root_id {
                break;
            }
            steps += 1;
            if steps > resolved.len() {
                conflicts.push(Conflict {
                    kind: ConflictKind::DirectoryLoop,
                    locations: vec![node_label(&left.roster, &right.roster, id)],
                });
                break;
            }
            let Some(r) = resolved.get(&current) else {
                break;
            };
            current = r.parent;
        }
    }

    if !conflicts.is_empty() {
        conflicts.sort_by(|a, b| {
            a.locations
                .first()
                .cmp(&b.locations.first())
                .then_with(|| format!("{:?}", a.kind).cmp(&format!("{:?}", b.kind)))
        });
        for c in &conflicts {
            observer.warn(&format!("{c}"));
        }
        return MergeResult {
            roster: None,
            markings: None,
            conflicts,
        };
    }

    let mut children_of: BTreeMap<NodeId, BTreeMap<PathComponent, NodeId>> = BTreeMap::new();
    for (&id, r) in &resolved {
        if id == root_id {
            continue;
        }
        let name = r.name.clone().expect("non-root present node has a name");
        children_of.entry(r.parent).or_default().insert(name, id);
    }

    let mut nodes: FxHashMap<NodeId, Arc<Node>> = FxHashMap::default();
    for (&id, r) in &resolved {
        let name = if id == root_id { None } else { r.name.clone() };
        let node = match &r.kind {
            ResolvedKind::Dir => Node::Dir(DirNode {
                id,
                parent: r.parent,
                name,
                attrs: r.attrs.clone(),
                children: children_of.remove(&id).unwrap_or_default(),
            }),
            ResolvedKind::File(content) => Node::File(FileNode {
                id,
                parent: r.parent,
                name,
                attrs: r.attrs.clone(),
                content: *content,
            }),
        };
        nodes.insert(id, Arc::new(node));
    }

    let merged = Roster::from_parts(root_id, nodes);
    let markings = mark_merge_roster(
        &left.roster,
        &left.markings,
        &left.uncommon,
        &right.roster,
        &right.markings,
        &right.uncommon,
        new_rid,
        &merged,
    );

    MergeResult {
        roster: Some(merged),
        markings: Some(markings),
        conflicts: Vec::new(),
    }
}

fn resolve_attrs(
    on_left: Option<&Node>,
    on_right: Option<&Node>,
    left: &MergeSide,
    right: &MergeSide,
    conflicts: &mut Vec<Conflict>,
    id: NodeId,
) -> crate::attr::AttrMap {
    let mut keys: BTreeSet<AttrKey> = BTreeSet::new();
    if let Some(l) = on_left {
        keys.extend(l.attrs().keys().cloned());
    }
    if let Some(r) = on_right {
        keys.extend(r.attrs().keys().cloned());
    }

    let mut out = crate::attr::AttrMap::new();
    let empty = BTreeSet::new();
    for key in keys {
        match (on_left, on_right) {
            (Some(l), Some(r)) => {
                let lm = left.markings.get(id).expect("left marking present");
                let rm = right.markings.get(id).expect("right marking present");
                let lv = l.attrs().get(&key);
                let rv = r.attrs().get(&key);
                let l_set = lm.attrs.get(&key).unwrap_or(&empty);
                let r_set = rm.attrs.get(&key).unwrap_or(&empty);
                match resolve_value(&lv, &rv, l_set, r_set, &left.uncommon, &right.uncommon) {
                    Ok(Some(v)) => {
                        out.insert(key, v.clone());
                    }
                    Ok(None) => {}
                    Err(()) => {
                        conflicts.push(Conflict {
                            kind: ConflictKind::Attr,
                            locations: vec![format!(
                                "{} attr {key}",
                                node_label(&left.roster, &right.roster, id)
                            )],
                        });
                        if let Some(v) = lv {
                            out.insert(key, v.clone());
                        }
                    }
                }
            }
            (Some(l), None) => {
                if let Some(v) = l.attrs().get(&key) {
                    out.insert(key, v.clone());
                }
            }
            (None, Some(r)) => {
                if let Some(v) = r.attrs().get(&key) {
                    out.insert(key, v.clone());
                }
            }
            (None, None) => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::cset::{apply_cset, diff_rosters, ChangeSet};
    use crate::database::AlwaysDefer;
    use crate::hash::FileId;
    use crate::marking::{mark_roster_with_no_parents, mark_roster_with_one_parent};
    use crate::node::TempNodeIdSource;
    use crate::observer::NullObserver;
    use crate::path::FilePath;

    fn rid(s: &str) -> RevisionId {
        RevisionId::of(s.as_bytes())
    }

    fn side(roster: Roster, markings: MarkingMap, uncommon: &[&str]) -> MergeSide {
        MergeSide {
            roster,
            markings,
            uncommon: uncommon.iter().map(|s| rid(s)).collect(),
        }
    }

    #[test]
    fn clean_merge_rename_and_delete() {
        let mut nis = TempNodeIdSource::new();
        let mut base = Roster::empty();
        let a = base.create_file_node(FileId::of(b"a"), &mut nis);
        base.attach_node_at(a, &FilePath::split("a.txt").unwrap())
            .unwrap();
        let b = base.create_file_node(FileId::of(b"b"), &mut nis);
        base.attach_node_at(b, &FilePath::split("b.txt").unwrap())
            .unwrap();

        let base_rid = rid("base");
        let base_marks = mark_roster_with_no_parents(base_rid, &base);

        let mut left_cs = ChangeSet::default();
        left_cs
            .nodes_renamed
            .insert(FilePath::split("a.txt").unwrap(), FilePath::split("c.txt").unwrap());
        let left_roster = apply_cset(&base, &left_cs, &mut nis).unwrap();
        let left_rid = rid("left");
        let left_marks = mark_roster_with_one_parent(&base, &base_marks, left_rid, &left_roster);

        let mut right_cs = ChangeSet::default();
        right_cs.nodes_deleted.insert(FilePath::split("b.txt").unwrap());
        let right_roster = apply_cset(&base, &right_cs, &mut nis).unwrap();
        let right_rid = rid("right");
        let right_marks = mark_roster_with_one_parent(&base, &base_marks, right_rid, &right_roster);

        let left = side(left_roster, left_marks, &["left"]);
        let right = side(right_roster, right_marks, &["right"]);

        let mut resolver = AlwaysDefer;
        let result = three_way_merge(&base, &left, &right, rid("merge"), &mut resolver, &mut NullObserver);
        assert!(result.conflicts.is_empty(), "{:?}", result.conflicts.iter().map(|c| &c.kind).collect::<Vec<_>>());
        let merged = result.roster.unwrap();
        assert!(merged.get_node(&FilePath::split("c.txt").unwrap()).is_ok());
        assert!(merged.get_node(&FilePath::split("b.txt").unwrap()).is_err());
    }

    #[test]
    fn content_conflict_is_reported_when_deferred() {
        let mut nis = TempNodeIdSource::new();
        let mut base = Roster::empty();
        let a = base.create_file_node(FileId::of(b"base"), &mut nis);
        base.attach_node_at(a, &FilePath::split("a.txt").unwrap())
            .unwrap();
        let base_rid = rid("base");
        let base_marks = mark_roster_with_no_parents(base_rid, &base);

        let mut left_roster = base.clone();
        left_roster
            .apply_delta(&FilePath::split("a.txt").unwrap(), FileId::of(b"base"), FileId::of(b"left"))
            .unwrap();
        let left_marks = mark_roster_with_one_parent(&base, &base_marks, rid("left"), &left_roster);

        let mut right_roster = base.clone();
        right_roster
            .apply_delta(&FilePath::split("a.txt").unwrap(), FileId::of(b"base"), FileId::of(b"right"))
            .unwrap();
        let right_marks = mark_roster_with_one_parent(&base, &base_marks, rid("right"), &right_roster);

        let left = side(left_roster, left_marks, &["left"]);
        let right = side(right_roster, right_marks, &["right"]);

        let mut resolver = AlwaysDefer;
        let result = three_way_merge(&base, &left, &right, rid("merge"), &mut resolver, &mut NullObserver);
        assert!(result.roster.is_none());
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].kind, ConflictKind::Content);
    }

    #[test]
    fn duplicate_name_conflict_on_independent_adds() {
        let base = Roster::empty();
        let base_rid = rid("base");
        let base_marks = mark_roster_with_no_parents(base_rid, &base);

        let mut nis_left = TempNodeIdSource::new();
        let mut left_roster = base.clone();
        let lf = left_roster.create_file_node(FileId::of(b"l"), &mut nis_left);
        left_roster
            .attach_node_at(lf, &FilePath::split("x").unwrap())
            .unwrap();
        let left_marks = mark_roster_with_one_parent(&base, &base_marks, rid("left"), &left_roster);

        let mut nis_right = TempNodeIdSource::new();
        let mut right_roster = base.clone();
        let rd = right_roster.create_dir_node(&mut nis_right);
        right_roster
            .attach_node_at(rd, &FilePath::split("x").unwrap())
            .unwrap();
        let right_marks = mark_roster_with_one_parent(&base, &base_marks, rid("right"), &right_roster);

        let left = side(left_roster, left_marks, &["left"]);
        let right = side(right_roster, right_marks, &["right"]);

        let mut resolver = AlwaysDefer;
        let result = three_way_merge(&base, &left, &right, rid("merge"), &mut resolver, &mut NullObserver);
        assert!(result.roster.is_none());
        assert!(result
            .conflicts
            .iter()
            .any(|c| c.kind == ConflictKind::DuplicateName));
    }

    #[test]
    fn duplicate_name_conflict_is_resolved_by_renaming_the_loser() {
        struct KeepFirst;
        impl crate::database::ConflictResolver for KeepFirst {
            fn resolve_content(&mut self, left: FileId, _right: FileId) -> Resolution<FileId> {
                Resolution::Use(left)
            }

            fn resolve_duplicate_name(&mut self, _parent: NodeId, _name: &PathComponent, candidates: &[NodeId]) -> Resolution<NodeId> {
                Resolution::Use(candidates[0])
            }
        }

        let base = Roster::empty();
        let base_rid = rid("base");
        let base_marks = mark_roster_with_no_parents(base_rid, &base);

        let mut nis_left = TempNodeIdSource::new();
        let mut left_roster = base.clone();
        let lf = left_roster.create_file_node(FileId::of(b"l"), &mut nis_left);
        left_roster
            .attach_node_at(lf, &FilePath::split("x").unwrap())
            .unwrap();
        let left_marks = mark_roster_with_one_parent(&base, &base_marks, rid("left"), &left_roster);

        let mut nis_right = TempNodeIdSource::new();
        let mut right_roster = base.clone();
        let rd = right_roster.create_dir_node(&mut nis_right);
        right_roster
            .attach_node_at(rd, &FilePath::split("x").unwrap())
            .unwrap();
        let right_marks = mark_roster_with_one_parent(&base, &base_marks, rid("right"), &right_roster);

        let left = side(left_roster, left_marks, &["left"]);
        let right = side(right_roster, right_marks, &["right"]);

        let mut resolver = KeepFirst;
        let result = three_way_merge(&base, &left, &right, rid("merge"), &mut resolver, &mut NullObserver);
        assert!(result.conflicts.iter().all(|c| c.kind != ConflictKind::DuplicateName));
        let roster = result.roster.expect("resolved merge produces a roster");
        assert!(roster.get_node(&FilePath::split("x").unwrap()).is_ok());
    }

    #[test]
    fn attr_cleared_on_one_side_and_set_to_a_value_on_the_other_is_a_conflict() {
        use crate::attr::{AttrKey, AttrValue};

        let mut nis = TempNodeIdSource::new();
        let mut base = Roster::empty();
        let a = base.create_file_node(FileId::of(b"x"), &mut nis);
        base.attach_node_at(a, &FilePath::split("a.txt").unwrap()).unwrap();
        base.set_attr(&FilePath::split("a.txt").unwrap(), AttrKey::from("k"), AttrValue::from("v0"))
            .unwrap();
        let base_rid = rid("base");
        let base_marks = mark_roster_with_no_parents(base_rid, &base);

        let mut left_roster = base.clone();
        left_roster.clear_attr(&FilePath::split("a.txt").unwrap(), &AttrKey::from("k")).unwrap();
        let left_marks = mark_roster_with_one_parent(&base, &base_marks, rid("left"), &left_roster);

        let mut right_roster = base.clone();
        right_roster
            .set_attr(&FilePath::split("a.txt").unwrap(), AttrKey::from("k"), AttrValue::from("v1"))
            .unwrap();
        let right_marks = mark_roster_with_one_parent(&base, &base_marks, rid("right"), &right_roster);

        let left = side(left_roster, left_marks, &["left"]);
        let right = side(right_roster, right_marks, &["right"]);

        let mut resolver = AlwaysDefer;
        let result = three_way_merge(&base, &left, &right, rid("merge"), &mut resolver, &mut NullObserver);
        assert!(result.roster.is_none());
        assert!(result.conflicts.iter().any(|c| c.kind == ConflictKind::Attr));
    }

    #[test]
    fn attr_unchanged_on_one_side_keeps_the_others_edit() {
        use crate::attr::{AttrKey, AttrValue};

        let mut nis = TempNodeIdSource::new();
        let mut base = Roster::empty();
        let a = base.create_file_node(FileId::of(b"x"), &mut nis);
        base.attach_node_at(a, &FilePath::split("a.txt").unwrap()).unwrap();
        base.set_attr(&FilePath::split("a.txt").unwrap(), AttrKey::from("k"), AttrValue::from("v0"))
            .unwrap();
        let base_rid = rid("base");
        let base_marks = mark_roster_with_no_parents(base_rid, &base);

        let left_roster = base.clone();
        let left_marks = mark_roster_with_one_parent(&base, &base_marks, rid("left"), &left_roster);

        let mut right_roster = base.clone();
        right_roster
            .set_attr(&FilePath::split("a.txt").unwrap(), AttrKey::from("k"), AttrValue::from("v1"))
            .unwrap();
        let right_marks = mark_roster_with_one_parent(&base, &base_marks, rid("right"), &right_roster);

        let left = side(left_roster, left_marks, &["left"]);
        let right = side(right_roster, right_marks, &["right"]);

        let mut resolver = AlwaysDefer;
        let result = three_way_merge(&base, &left, &right, rid("merge"), &mut resolver, &mut NullObserver);
        assert!(result.conflicts.is_empty());
        let merged = result.roster.unwrap();
        assert_eq!(
            merged.get_attr(&FilePath::split("a.txt").unwrap(), &AttrKey::from("k")).unwrap(),
            Some(&AttrValue::from("v1"))
        );
    }

    #[test]
    fn merge_identity_returns_roster_unchanged() {
        let mut nis = TempNodeIdSource::new();
        let mut base = Roster::empty();
        let a = base.create_file_node(FileId::of(b"x"), &mut nis);
        base.attach_node_at(a, &FilePath::split("a.txt").unwrap())
            .unwrap();
        let base_rid = rid("base");
        let base_marks = mark_roster_with_no_parents(base_rid, &base);

        let left = side(base.clone(), base_marks.clone(), &[]);
        let right = side(base.clone(), base_marks, &[]);

        let mut resolver = AlwaysDefer;
        let result = three_way_merge(&base, &left, &right, rid("merge"), &mut resolver, &mut NullObserver);
        assert!(result.conflicts.is_empty());
        assert_eq!(result.roster.unwrap(), base);
    }
}
