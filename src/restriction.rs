//! Path restrictions: masking a cset down to a subset of its changes so a
//! partial commit or partial revert can be computed (spec §9 supplement,
//! grounded in `original_source/src/restrictions.hh`).
//!
//! Conceptually, between revisions A and B there is a cset; a restriction
//! picks out a subset X such that applying the included changes to A
//! produces X, and the excluded changes would carry X on to B.

use std::collections::BTreeSet;

use crate::cset::{diff_rosters, ChangeSet};
use crate::error::{Result, VertreeError};
use crate::node::{NodeId, PermanentNodeIdSource};
use crate::observer::Observer;
use crate::path::FilePath;
use crate::roster::Roster;

/// An include/exclude path set plus an optional depth bound, applied as a
/// mask over a cset. `included` empty means "everything not excluded".
#[derive(Debug, Clone, Default)]
pub struct Restriction {
    included: BTreeSet<FilePath>,
    excluded: BTreeSet<FilePath>,
    depth: Option<usize>,
}

impl Restriction {
    pub fn new(included: BTreeSet<FilePath>, excluded: BTreeSet<FilePath>, depth: Option<usize>) -> Restriction {
        Restriction {
            included,
            excluded,
            depth,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.included.is_empty() && self.excluded.is_empty() && self.depth.is_none()
    }

    /// True iff `path` survives this restriction's include/exclude/depth mask.
    pub fn includes(&self, path: &FilePath) -> bool {
        if self.excluded.iter().any(|ex| ex.is_prefix_of(path)) {
            return false;
        }
        if self.included.is_empty() {
            return true;
        }
        self.included.iter().any(|inc| {
            inc.is_prefix_of(path)
                && self.depth.is_none_or(|d| path.depth() - inc.depth() <= d)
        })
    }

    /// Checks that every path this restriction names actually exists in at
    /// least one of the two rosters being compared (`restrictions.hh`'s
    /// validity check, which otherwise silently no-ops on a typo'd path).
    pub fn validate_against_edge(&self, roster1: &Roster, roster2: &Roster, observer: &mut dyn Observer) -> Result<()> {
        let known1 = roster1.extract_path_set()?;
        let known2 = roster2.extract_path_set()?;
        for path in self.included.iter().chain(self.excluded.iter()) {
            if !known1.contains(path) && !known2.contains(path) {
                let err = VertreeError::UnknownRestrictionPath(path.clone());
                observer.warn(&format!("{err}"));
                return Err(err);
            }
        }
        Ok(())
    }
}

/// A restriction resolved against one roster's actual node ids, so
/// membership can be tested by id rather than by re-walking paths on every
/// call (`node_restriction::includes` in the original).
pub struct NodeRestriction<'a> {
    restriction: &'a Restriction,
    paths: std::collections::BTreeMap<NodeId, FilePath>,
}

impl<'a> NodeRestriction<'a> {
    pub fn new(restriction: &'a Restriction, roster: &Roster) -> Result<NodeRestriction<'a>> {
        Ok(NodeRestriction {
            restriction,
            paths: roster.collect_id_paths()?,
        })
    }

    pub fn includes(&self, id: NodeId) -> bool {
        match self.paths.get(&id) {
            Some(path) => self.restriction.includes(path),
            None => false,
        }
    }
}

/// Computes revision X: applies to `base` only the entries of
/// `diff_rosters(base, target)` that `restriction` includes.
pub fn make_restricted_roster(base: &Roster, target: &Roster, restriction: &Restriction, observer: &mut dyn Observer) -> Result<Roster> {
    restriction.validate_against_edge(base, target, observer)?;
    let full = diff_rosters(base, target)?;
    let masked = mask_cset(&full, restriction);
    let mut nis = PermanentNodeIdSource::default();
    crate::cset::apply_cset(base, &masked, &mut nis)
}

fn mask_cset(cs: &ChangeSet, restriction: &Restriction) -> ChangeSet {
    let mut out = ChangeSet::default();
    for path in &cs.nodes_deleted {
        if restriction.includes(path) {
            out.nodes_deleted.insert(path.clone());
        }
    }
    for (src, dst) in &cs.nodes_renamed {
        if restriction.includes(src) || restriction.includes(dst) {
            out.nodes_renamed.insert(src.clone(), dst.clone());
        }
    }
    for path in &cs.dirs_added {
        if restriction.includes(path) {
            out.dirs_added.insert(path.clone());
        }
    }
    for (path, fid) in &cs.files_added {
        if restriction.includes(path) {
            out.files_added.insert(path.clone(), *fid);
        }
    }
    for (path, delta) in &cs.deltas_applied {
        if restriction.includes(path) {
            out.deltas_applied.insert(path.clone(), *delta);
        }
    }
    for (path, key) in &cs.attrs_cleared {
        if restriction.includes(path) {
            out.attrs_cleared.insert((path.clone(), key.clone()));
        }
    }
    for ((path, key), value) in &cs.attrs_set {
        if restriction.includes(path) {
            out.attrs_set.insert((path.clone(), key.clone()), value.clone());
        }
    }
    out
}
