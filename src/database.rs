//! Collaborator interfaces the core consumes but does not implement
//! (spec §6): storage, id allocation, and conflict resolution, plus a small
//! in-memory reference implementation used by tests and by `xdev`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, VertreeError};
use crate::hash::{FileId, KeyId, RevisionId};
use crate::marking::MarkingMap;
use crate::node::NodeId;
use crate::path::PathComponent;
use crate::revision::Revision;
use crate::roster::Roster;

/// Either a resolved value or a deferral: the merge engine records a
/// conflict and leaves it to the caller when a resolver defers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<T> {
    Use(T),
    Defer,
}

/// Given a content or naming conflict, returns a resolved value or defers
/// (spec §6). `AlwaysDefer` is the reference implementation: it never
/// resolves anything, so every conflict surfaces to the caller.
pub trait ConflictResolver {
    fn resolve_content(&mut self, left: FileId, right: FileId) -> Resolution<FileId>;

    /// Two or more surviving nodes claim the same `(parent, name)` slot.
    /// Returns which of `candidates` keeps the name; the core renames the
    /// rest aside to disambiguate. Deferring leaves the slot as a
    /// `DuplicateName`/`MultipleNames` conflict.
    fn resolve_duplicate_name(&mut self, parent: NodeId, name: &PathComponent, candidates: &[NodeId]) -> Resolution<NodeId>;
}

pub struct AlwaysDefer;

impl ConflictResolver for AlwaysDefer {
    fn resolve_content(&mut self, _left: FileId, _right: FileId) -> Resolution<FileId> {
        Resolution::Defer
    }

    fn resolve_duplicate_name(&mut self, _parent: NodeId, _name: &PathComponent, _candidates: &[NodeId]) -> Resolution<NodeId> {
        Resolution::Defer
    }
}

/// Cheap staleness token: a collaborator captures one before reading, then
/// compares it later to detect that the underlying graph moved underneath
/// it, without re-reading the whole database. Grounded in
/// `original_source/src/outdated_indicator.cc`'s `outdated_indicator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Fingerprint(u64);

/// Abstract storage: key-value-plus-graph-queries, per spec §6. Implemented
/// here only as an in-memory reference (`MemDatabase`); SQL storage is out
/// of scope.
pub trait Database {
    fn get_file(&self, id: FileId) -> Result<Vec<u8>>;
    fn put_file(&mut self, bytes: Vec<u8>) -> FileId;
    fn get_revision(&self, id: RevisionId) -> Result<Revision>;
    fn put_revision(&mut self, revision: Revision) -> Result<RevisionId>;
    fn get_roster(&self, id: RevisionId) -> Result<(Roster, MarkingMap)>;
    fn put_roster(&mut self, id: RevisionId, roster: Roster, marking: MarkingMap);
    fn parents(&self, id: RevisionId) -> Vec<RevisionId>;
    fn children(&self, id: RevisionId) -> Vec<RevisionId>;
    fn heads(&self, branch: &str) -> Vec<RevisionId>;
    fn fingerprint(&self) -> Fingerprint;
}

#[derive(Debug, Default)]
pub struct MemDatabase {
    files: HashMap<FileId, Vec<u8>>,
    revisions: HashMap<RevisionId, Revision>,
    rosters: HashMap<RevisionId, (Roster, MarkingMap)>,
    children_of: HashMap<RevisionId, Vec<RevisionId>>,
    branch_heads: HashMap<String, Vec<RevisionId>>,
    #[allow(dead_code)]
    key_store: HashMap<KeyId, Vec<u8>>,
    counter: AtomicU64,
}

impl MemDatabase {
    pub fn new() -> MemDatabase {
        MemDatabase::default()
    }

    pub fn set_branch_heads(&mut self, branch: impl Into<String>, heads: Vec<RevisionId>) {
        self.branch_heads.insert(branch.into(), heads);
    }

    fn bump(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }
}

impl Database for MemDatabase {
    fn get_file(&self, id: FileId) -> Result<Vec<u8>> {
        self.files
            .get(&id)
            .cloned()
            .ok_or_else(|| VertreeError::NotFound(format!("file {id}")))
    }

    fn put_file(&mut self, bytes: Vec<u8>) -> FileId {
        let id = FileId::of(&bytes);
        self.files.insert(id, bytes);
        self.bump();
        id
    }

    fn get_revision(&self, id: RevisionId) -> Result<Revision> {
        self.revisions
            .get(&id)
            .cloned()
            .ok_or_else(|| VertreeError::NotFound(format!("revision {id}")))
    }

    fn put_revision(&mut self, revision: Revision) -> Result<RevisionId> {
        let id = crate::revision::hash_revision(&revision)?;
        for parent in revision.edges.keys() {
            if !parent.is_null() {
                self.children_of.entry(*parent).or_default().push(id);
            }
        }
        self.revisions.insert(id, revision);
        self.bump();
        Ok(id)
    }

    fn get_roster(&self, id: RevisionId) -> Result<(Roster, MarkingMap)> {
        self.rosters
            .get(&id)
            .cloned()
            .ok_or_else(|| VertreeError::NotFound(format!("roster for revision {id}")))
    }

    fn put_roster(&mut self, id: RevisionId, roster: Roster, marking: MarkingMap) {
        self.rosters.insert(id, (roster, marking));
        self.bump();
    }

    fn parents(&self, id: RevisionId) -> Vec<RevisionId> {
        self.revisions
            .get(&id)
            .map(|r| r.edges.keys().copied().collect())
            .unwrap_or_default()
    }

    fn children(&self, id: RevisionId) -> Vec<RevisionId> {
        self.children_of.get(&id).cloned().unwrap_or_default()
    }

    fn heads(&self, branch: &str) -> Vec<RevisionId> {
        self.branch_heads.get(branch).cloned().unwrap_or_default()
    }

    fn fingerprint(&self) -> Fingerprint {
        Fingerprint(self.counter.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_changes_on_mutation() {
        let mut db = MemDatabase::new();
        let before = db.fingerprint();
        db.put_file(b"hello\n".to_vec());
        let after = db.fingerprint();
        assert_ne!(before, after);
    }

    #[test]
    fn put_then_get_file_round_trips() {
        let mut db = MemDatabase::new();
        let id = db.put_file(b"hello\n".to_vec());
        assert_eq!(db.get_file(id).unwrap(), b"hello\n");
    }
}
