//! Per-node provenance (spec §3 "Marking", §4.5 "Marking construction and propagation").

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::attr::AttrKey;
use crate::error::{Result, RosterError};
use crate::hash::RevisionId;
use crate::node::{Node, NodeId};
use crate::roster::Roster;

/// Per-node, per-aspect provenance: which revisions last touched each
/// mutable aspect of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marking {
    pub birth_revision: RevisionId,
    pub parent_name: BTreeSet<RevisionId>,
    pub file_content: BTreeSet<RevisionId>,
    pub attrs: BTreeMap<AttrKey, BTreeSet<RevisionId>>,
}

impl Marking {
    fn singleton(rid: RevisionId, node: &Node) -> Marking {
        let mut attrs = BTreeMap::new();
        for key in node.attrs().keys() {
            attrs.insert(key.clone(), BTreeSet::from([rid]));
        }
        Marking {
            birth_revision: rid,
            parent_name: BTreeSet::from([rid]),
            file_content: if node.is_file() {
                BTreeSet::from([rid])
            } else {
                BTreeSet::new()
            },
            attrs,
        }
    }
}

/// Copy-on-write `NodeId -> Marking` map, mirroring [`crate::roster::Roster`]'s
/// COW technique.
#[derive(Debug, Clone, Default)]
pub struct MarkingMap {
    markings: FxHashMap<NodeId, Arc<Marking>>,
}

impl MarkingMap {
    pub fn new() -> MarkingMap {
        MarkingMap::default()
    }

    pub fn get(&self, id: NodeId) -> Option<&Marking> {
        self.markings.get(&id).map(Arc::as_ref)
    }

    pub fn get_for_update(&mut self, id: NodeId) -> Option<&mut Marking> {
        self.markings.get_mut(&id).map(Arc::make_mut)
    }

    pub fn put(&mut self, id: NodeId, marking: Marking) {
        self.markings.insert(id, Arc::new(marking));
    }

    pub fn remove(&mut self, id: NodeId) {
        self.markings.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.markings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markings.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.markings.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Marking)> {
        self.markings.iter().map(|(id, m)| (*id, m.as_ref()))
    }

    /// Invariant: `markings.keys() == roster.nodes.keys()`, `file_content` is
    /// non-empty for files, and `attrs` covers exactly the node's attr keys.
    pub fn check_sane_against(&self, roster: &Roster) -> Result<()> {
        crate::error::invariant!(
            self.len() == roster.node_count(),
            "marking map has {} entries, roster has {} nodes",
            self.len(),
            roster.node_count()
        );
        for (id, node) in roster.all_nodes() {
            let marking = self
                .get(id)
                .ok_or(RosterError::NotFoundById(id))?;
            if node.is_file() {
                crate::error::invariant!(
                    !marking.file_content.is_empty(),
                    "file node {id} has empty file_content marking"
                );
            }
            let node_keys: BTreeSet<_> = node.attrs().keys().cloned().collect();
            let marking_keys: BTreeSet<_> = marking.attrs.keys().cloned().collect();
            crate::error::invariant!(
                node_keys == marking_keys,
                "node {id} attr keys don't match marking attr keys"
            );
        }
        Ok(())
    }
}

/// No-parent marking (spec §4.5): every aspect of every node is marked with
/// `rid`, since this is a root revision.
pub fn mark_roster_with_no_parents(rid: RevisionId, roster: &Roster) -> MarkingMap {
    let mut out = MarkingMap::new();
    for (id, node) in roster.all_nodes() {
        out.put(id, Marking::singleton(rid, node));
    }
    out
}

/// One-parent marking (spec §4.5): for each node in `child`, inherit the
/// parent's mark set for any aspect that's unchanged, else mark it `rid`.
pub fn mark_roster_with_one_parent(
    parent: &Roster,
    parent_marks: &MarkingMap,
    rid: RevisionId,
    child: &Roster,
) -> MarkingMap {
    let mut out = MarkingMap::new();
    for (id, node) in child.all_nodes() {
        let Ok(old_node) = parent.get_node_by_id(id) else {
            out.put(id, Marking::singleton(rid, node));
            continue;
        };
        let old_marking = parent_marks.get(id).expect("parent marking present for existing node");

        let parent_name_unchanged = node.parent() == old_node.parent() && node.name() == old_node.name();
        let parent_name = if parent_name_unchanged {
            old_marking.parent_name.clone()
        } else {
            BTreeSet::from([rid])
        };

        let file_content = match (node, old_node) {
            (Node::File(f), Node::File(old_f)) if f.content == old_f.content => {
                old_marking.file_content.clone()
            }
            (Node::File(_), _) => BTreeSet::from([rid]),
            _ => BTreeSet::new(),
        };

        let mut attrs = BTreeMap::new();
        for key in node.attrs().keys() {
            let new_val = node.attrs().get(key);
            let old_val = old_node.attrs().get(key);
            if new_val == old_val {
                if let Some(set) = old_marking.attrs.get(key) {
                    attrs.insert(key.clone(), set.clone());
                    continue;
                }
            }
            attrs.insert(key.clone(), BTreeSet::from([rid]));
        }

        out.put(
            id,
            Marking {
                birth_revision: old_marking.birth_revision,
                parent_name,
                file_content,
                attrs,
            },
        );
    }
    out
}

pub(crate) fn changed(marks: &BTreeSet<RevisionId>, uncommon: &HashSet<RevisionId>) -> bool {
    marks.iter().any(|r| uncommon.contains(r))
}

/// Resolves one mark-bearing aspect during merge, reusing the structural
/// resolution table of spec §4.6 (see `DESIGN.md` for why this crate folds
/// the two tables together): returns the winning mark set, or `None` if both
/// sides changed to genuinely different values (a conflict the caller must
/// resolve and then re-mark with `{new_rid}`).
fn resolve_aspect<T: PartialEq>(
    left_val: &T,
    right_val: &T,
    left_marks: &BTreeSet<RevisionId>,
    right_marks: &BTreeSet<RevisionId>,
    left_uncommon: &HashSet<RevisionId>,
    right_uncommon: &HashSet<RevisionId>,
) -> Option<BTreeSet<RevisionId>> {
    let left_changed = changed(left_marks, left_uncommon);
    let right_changed = changed(right_marks, right_uncommon);
    match (left_changed, right_changed) {
        (false, false) => Some(left_marks.union(right_marks).cloned().collect()),
        (true, false) => Some(left_marks.clone()),
        (false, true) => Some(right_marks.clone()),
        (true, true) if left_val == right_val => {
            Some(left_marks.union(right_marks).cloned().collect())
        }
        (true, true) => None,
    }
}

/// Merge marking (spec §4.5, merge entry point): for each node and aspect,
/// resolve provenance using the uncommon-ancestor sets supplied by the
/// caller. Aspects that resolved to a genuine value conflict (both sides
/// changed to different values) are marked `{new_rid}`, matching a freshly
/// resolved value.
pub fn mark_merge_roster(
    left: &Roster,
    left_marks: &MarkingMap,
    left_uncommon: &HashSet<RevisionId>,
    right: &Roster,
    right_marks: &MarkingMap,
    right_uncommon: &HashSet<RevisionId>,
    new_rid: RevisionId,
    merged: &Roster,
) -> MarkingMap {
    let mut out = MarkingMap::new();
    for (id, node) in merged.all_nodes() {
        let on_left = left.get_node_by_id(id).ok();
        let on_right = right.get_node_by_id(id).ok();

        let (birth_revision, parent_name, file_content, attrs) = match (on_left, on_right) {
            (Some(l), Some(r)) => {
                let lm = left_marks.get(id).expect("left marking present");
                let rm = right_marks.get(id).expect("right marking present");

                let parent_name = resolve_aspect(
                    &(l.parent(), l.name().cloned()),
                    &(r.parent(), r.name().cloned()),
                    &lm.parent_name,
                    &rm.parent_name,
                    left_uncommon,
                    right_uncommon,
                )
                .unwrap_or_else(|| BTreeSet::from([new_rid]));

                let file_content = match (node, l, r) {
                    (Node::File(_), Node::File(lf), Node::File(rf)) => resolve_aspect(
                        &lf.content,
                        &rf.content,
                        &lm.file_content,
                        &rm.file_content,
                        left_uncommon,
                        right_uncommon,
                    )
                    .unwrap_or_else(|| BTreeSet::from([new_rid])),
                    _ => BTreeSet::new(),
                };

                let mut attrs = BTreeMap::new();
                for key in node.attrs().keys() {
                    let lv = l.attrs().get(key);
                    let rv = r.attrs().get(key);
                    let empty = BTreeSet::new();
                    let l_set = lm.attrs.get(key).unwrap_or(&empty);
                    let r_set = rm.attrs.get(key).unwrap_or(&empty);
                    let resolved = resolve_aspect(
                        &lv, &rv, l_set, r_set, left_uncommon, right_uncommon,
                    )
                    .unwrap_or_else(|| BTreeSet::from([new_rid]));
                    attrs.insert(key.clone(), resolved);
                }

                // a node id present on both parents necessarily traces back to
                // the same birth revision on both sides.
                (lm.birth_revision, parent_name, file_content, attrs)
            }
            (Some(l), None) => {
                let lm = left_marks.get(id).expect("left marking present");
                (lm.birth_revision, lm.parent_name.clone(), lm.file_content.clone(), {
                    let mut attrs = BTreeMap::new();
                    for key in l.attrs().keys() {
                        if let Some(set) = lm.attrs.get(key) {
                            attrs.insert(key.clone(), set.clone());
                        }
                    }
                    attrs
                })
            }
            (None, Some(r)) => {
                let rm = right_marks.get(id).expect("right marking present");
                (rm.birth_revision, rm.parent_name.clone(), rm.file_content.clone(), {
                    let mut attrs = BTreeMap::new();
                    for key in r.attrs().keys() {
                        if let Some(set) = rm.attrs.get(key) {
                            attrs.insert(key.clone(), set.clone());
                        }
                    }
                    attrs
                })
            }
            (None, None) => (new_rid, BTreeSet::from([new_rid]), if node.is_file() {
                BTreeSet::from([new_rid])
            } else {
                BTreeSet::new()
            }, {
                let mut attrs = BTreeMap::new();
                for key in node.attrs().keys() {
                    attrs.insert(key.clone(), BTreeSet::from([new_rid]));
                }
                attrs
            }),
        };

        // newly-created node ids (no matching id on either parent side) get a
        // fresh birth revision rather than an inherited one.
        let birth_revision = if on_left.is_none() && on_right.is_none() {
            new_rid
        } else {
            birth_revision
        };

        // a dormant attribute set on an attr the node doesn't currently carry
        // is dropped; attrs map must cover exactly the node's live+dormant keys.
        let attrs: BTreeMap<_, _> = attrs
            .into_iter()
            .filter(|(k, _)| node.attrs().contains_key(k))
            .collect();

        out.put(
            id,
            Marking {
                birth_revision,
                parent_name,
                file_content,
                attrs,
            },
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cset::{apply_cset, diff_rosters};
    use crate::hash::FileId;
    use crate::node::TempNodeIdSource;
    use crate::path::FilePath;

    fn rid(s: &str) -> RevisionId {
        RevisionId::of(s.as_bytes())
    }

    #[test]
    fn no_parent_marking_marks_everything_with_rid() {
        let mut r = Roster::empty();
        let mut nis = TempNodeIdSource::new();
        let id = r.create_file_node(FileId::of(b"x"), &mut nis);
        r.attach_node_at(id, &FilePath::split("a.txt").unwrap())
            .unwrap();
        let rid0 = rid("r0");
        let marks = mark_roster_with_no_parents(rid0, &r);
        marks.check_sane_against(&r).unwrap();
        let m = marks.get(id).unwrap();
        assert_eq!(m.birth_revision, rid0);
        assert_eq!(m.parent_name, BTreeSet::from([rid0]));
        assert_eq!(m.file_content, BTreeSet::from([rid0]));
    }

    #[test]
    fn one_parent_marking_inherits_unchanged_aspects() {
        let mut base = Roster::empty();
        let mut nis = TempNodeIdSource::new();
        let id = base.create_file_node(FileId::of(b"x"), &mut nis);
        base.attach_node_at(id, &FilePath::split("a.txt").unwrap())
            .unwrap();
        let rid0 = rid("r0");
        let base_marks = mark_roster_with_no_parents(rid0, &base);

        let cs = diff_rosters(&base, &base).unwrap();
        let child = apply_cset(&base, &cs, &mut nis).unwrap();
        let rid1 = rid("r1");
        let child_marks = mark_roster_with_one_parent(&base, &base_marks, rid1, &child);
        let m = child_marks.get(id).unwrap();
        assert_eq!(m.parent_name, BTreeSet::from([rid0]));
        assert_eq!(m.file_content, BTreeSet::from([rid0]));
    }
}
