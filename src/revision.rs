//! Revisions: a manifest hash plus one cset per parent edge (spec §3
//! "Revision", §4.5 "Marking construction and propagation").

use std::collections::{BTreeMap, HashSet};

use crate::basic_io::{write_canonical_revision, write_canonical_roster};
use crate::cset::ChangeSet;
use crate::error::{Result, VertreeError};
use crate::hash::{ContentHash, ManifestId, RevisionId};
use crate::marking::{mark_merge_roster, mark_roster_with_no_parents, mark_roster_with_one_parent, MarkingMap};
use crate::node::PermanentNodeIdSource;
use crate::observer::Observer;
use crate::roster::Roster;

/// A commit: the hash of the roster it produces, plus a cset from each
/// parent (`RevisionId::NULL` for a root revision's single synthetic edge
/// from the empty roster).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    pub new_manifest: ManifestId,
    pub edges: BTreeMap<RevisionId, ChangeSet>,
}

/// Hashes `roster`'s canonical text (markings are never part of the hashed
/// form: two rosters with identical structure/content but different
/// provenance hash identically, per spec §4.7).
pub fn hash_manifest(roster: &Roster) -> Result<ManifestId> {
    let text = write_canonical_roster(roster, None)?;
    Ok(ManifestId::from(ContentHash::of(text.as_bytes())))
}

pub fn hash_revision(revision: &Revision) -> Result<RevisionId> {
    let text = write_canonical_revision(revision);
    Ok(RevisionId::from(ContentHash::of(text.as_bytes())))
}

/// One parent roster/marking pair, keyed by the parent's revision id, as
/// supplied to [`make_roster_for_revision`].
pub struct ParentContext<'a> {
    pub rid: RevisionId,
    pub roster: &'a Roster,
    pub markings: &'a MarkingMap,
    /// Ancestors reachable from this parent but not from every other parent
    /// (spec §4.5); empty and unused when there is only one parent. The core
    /// does not compute this itself -- it is a graph query over revision
    /// history, out of scope per spec §5 -- so the caller supplies it.
    pub uncommon: HashSet<RevisionId>,
}

/// Reconstructs the roster and marking map `revision` describes, applying
/// its cset(s) on top of the supplied parent state and verifying the result
/// hashes to `revision.new_manifest`.
///
/// `parents` must have exactly as many entries as `revision.edges`, one per
/// edge, matched by `rid`. An empty slice means a root revision, whose single
/// edge is keyed `RevisionId::NULL` and diffs from the empty roster.
pub fn make_roster_for_revision(
    revision: &Revision,
    rid: RevisionId,
    parents: &[ParentContext<'_>],
    observer: &mut dyn Observer,
) -> Result<(Roster, MarkingMap)> {
    let mut nis = PermanentNodeIdSource::default();

    let (roster, markings) = match parents {
        [] => {
            let cs = revision.edges.get(&RevisionId::NULL).ok_or_else(|| {
                let err = VertreeError::IntegrityAssertion("root revision missing null-parent edge".to_string());
                observer.warn(&format!("{err}"));
                err
            })?;
            let roster = crate::cset::apply_cset(&Roster::empty(), cs, &mut nis).map_err(|err| {
                observer.warn(&format!("{err}"));
                err
            })?;
            let markings = mark_roster_with_no_parents(rid, &roster);
            (roster, markings)
        }
        [parent] => {
            let cs = revision.edges.get(&parent.rid).ok_or_else(|| {
                let err = VertreeError::IntegrityAssertion(format!("revision missing edge for parent {}", parent.rid));
                observer.warn(&format!("{err}"));
                err
            })?;
            let roster = crate::cset::apply_cset(parent.roster, cs, &mut nis).map_err(|err| {
                observer.warn(&format!("{err}"));
                err
            })?;
            let markings = mark_roster_with_one_parent(parent.roster, parent.markings, rid, &roster);
            (roster, markings)
        }
        [left, right] => {
            let cs = revision.edges.get(&left.rid).ok_or_else(|| {
                let err = VertreeError::IntegrityAssertion(format!("revision missing edge for parent {}", left.rid));
                observer.warn(&format!("{err}"));
                err
            })?;
            if !revision.edges.contains_key(&right.rid) {
                let err = VertreeError::IntegrityAssertion(format!("revision missing edge for parent {}", right.rid));
                observer.warn(&format!("{err}"));
                return Err(err);
            }
            let roster = crate::cset::apply_cset(left.roster, cs, &mut nis).map_err(|err| {
                observer.warn(&format!("{err}"));
                err
            })?;
            let markings = mark_merge_roster(
                left.roster,
                left.markings,
                &left.uncommon,
                right.roster,
                right.markings,
                &right.uncommon,
                rid,
                &roster,
            );
            (roster, markings)
        }
        _ => {
            let err = VertreeError::IntegrityAssertion(format!(
                "revision {rid} has {} parents; only 0, 1 or 2 are supported",
                parents.len()
            ));
            observer.warn(&format!("{err}"));
            return Err(err);
        }
    };

    let actual = hash_manifest(&roster).map_err(|err| {
        observer.warn(&format!("{err}"));
        err
    })?;
    if actual != revision.new_manifest {
        let err = VertreeError::HashMismatch {
            claimed: revision.new_manifest,
            actual,
        };
        observer.warn(&format!("{err}"));
        return Err(err);
    }

    Ok((roster, markings))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::cset::diff_rosters;
    use crate::hash::FileId;
    use crate::node::TempNodeIdSource;
    use crate::observer::NullObserver;
    use crate::path::FilePath;

    fn rid(s: &str) -> RevisionId {
        RevisionId::of(s.as_bytes())
    }

    #[test]
    fn manifest_hash_is_deterministic() {
        let mut r = Roster::empty();
        let mut nis = TempNodeIdSource::new();
        let id = r.create_file_node(FileId::of(b"x"), &mut nis);
        r.attach_node_at(id, &FilePath::split("a.txt").unwrap()).unwrap();
        assert_eq!(hash_manifest(&r).unwrap(), hash_manifest(&r).unwrap());
    }

    #[test]
    fn root_revision_round_trips() {
        let mut r = Roster::empty();
        let mut nis = TempNodeIdSource::new();
        let id = r.create_file_node(FileId::of(b"x"), &mut nis);
        r.attach_node_at(id, &FilePath::split("a.txt").unwrap()).unwrap();

        let cs = diff_rosters(&Roster::empty(), &r).unwrap();
        let rid0 = rid("r0");
        let revision = Revision {
            new_manifest: hash_manifest(&r).unwrap(),
            edges: BTreeMap::from([(RevisionId::NULL, cs)]),
        };

        let (roster, markings) = make_roster_for_revision(&revision, rid0, &[], &mut NullObserver).unwrap();
        assert_eq!(roster, r);
        assert_eq!(markings.len(), roster.node_count());
    }

    #[test]
    fn hash_mismatch_is_rejected() {
        let mut r = Roster::empty();
        let mut nis = TempNodeIdSource::new();
        let id = r.create_file_node(FileId::of(b"x"), &mut nis);
        r.attach_node_at(id, &FilePath::split("a.txt").unwrap()).unwrap();

        let cs = diff_rosters(&Roster::empty(), &r).unwrap();
        let revision = Revision {
            new_manifest: ManifestId::of(b"not the real hash"),
            edges: BTreeMap::from([(RevisionId::NULL, cs)]),
        };

        let err = make_roster_for_revision(&revision, rid("r0"), &[], &mut NullObserver).unwrap_err();
        assert!(matches!(err, VertreeError::HashMismatch { .. }));
    }

    #[test]
    fn one_parent_revision_round_trips() {
        let mut base = Roster::empty();
        let mut nis = TempNodeIdSource::new();
        let id = base.create_file_node(FileId::of(b"x"), &mut nis);
        base.attach_node_at(id, &FilePath::split("a.txt").unwrap()).unwrap();
        let rid0 = rid("r0");
        let base_marks = mark_roster_with_no_parents(rid0, &base);

        let mut child = base.clone();
        child
            .apply_delta(&FilePath::split("a.txt").unwrap(), FileId::of(b"x"), FileId::of(b"y"))
            .unwrap();
        let cs = diff_rosters(&base, &child).unwrap();
        let rid1 = rid("r1");
        let revision = Revision {
            new_manifest: hash_manifest(&child).unwrap(),
            edges: BTreeMap::from([(rid0, cs)]),
        };

        let parents = [ParentContext {
            rid: rid0,
            roster: &base,
            markings: &base_marks,
            uncommon: HashSet::new(),
        }];
        let (roster, _markings) = make_roster_for_revision(&revision, rid1, &parents, &mut NullObserver).unwrap();
        assert_eq!(roster, child);
    }
}
