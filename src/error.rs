//! The crate-wide error taxonomy.
//!
//! Every fallible entry point returns [`VertreeError`]. Recoverable kinds carry
//! enough structured context to be resolved by a caller; `HashMismatch` and
//! `IntegrityAssertion` are fatal and indicate a bug in a collaborator or in
//! this crate, but are still returned rather than panicking, since a library
//! has no process to abort.

use std::fmt;

use crate::hash::{FileId, ManifestId};
use crate::merge::ConflictKind;
use crate::path::FilePath;

pub type Result<T> = std::result::Result<T, VertreeError>;

#[derive(Debug, thiserror::Error)]
pub enum VertreeError {
    #[error("invalid path {path:?}: {reason}")]
    Path { path: String, reason: PathReason },

    #[error("roster error: {0}")]
    Roster(#[from] RosterError),

    #[error("invalid changeset entry at {path}: {reason}")]
    CsetInvalid { path: FilePath, reason: String },

    #[error(
        "content mismatch at {path}: expected {expected}, found {actual}"
    )]
    ContentMismatch {
        path: FilePath,
        expected: FileId,
        actual: FileId,
    },

    #[error("merge conflict: {0}")]
    MergeConflict(#[from] Box<MergeConflictError>),

    #[error("serialization error at {line}:{column}: expected {expected}")]
    Serialization {
        line: usize,
        column: usize,
        expected: String,
    },

    #[error("hash mismatch: claimed {claimed}, actual {actual}")]
    HashMismatch {
        claimed: ManifestId,
        actual: ManifestId,
    },

    #[error("internal invariant violated: {0}")]
    IntegrityAssertion(String),

    /// Not one of spec.md §7's eight kinds: an ambient collaborator-facing
    /// error for the in-memory `Database` reference implementation, which
    /// the taxonomy leaves unspecified since database I/O is a non-goal.
    #[error("not found: {0}")]
    NotFound(String),

    /// A restriction named a path absent from every roster it was checked
    /// against (`original_source/src/restrictions.hh`'s validity check).
    #[error("restriction names unknown path {0}")]
    UnknownRestrictionPath(FilePath),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathReason {
    EmptyComponent,
    DotComponent,
    DotDotComponent,
    LeadingSlash,
    EmbeddedNul,
    Backslash,
    EmbeddedSlash,
}

impl fmt::Display for PathReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PathReason::EmptyComponent => "empty path component",
            PathReason::DotComponent => "'.' is not a valid path component",
            PathReason::DotDotComponent => "'..' is not a valid path component",
            PathReason::LeadingSlash => "internal paths must not start with '/'",
            PathReason::EmbeddedNul => "path contains an embedded NUL byte",
            PathReason::Backslash => "path contains a backslash",
            PathReason::EmbeddedSlash => "a path component must not contain '/'",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error("no node at {0}")]
    NotFound(FilePath),

    #[error("node {0} not found")]
    NotFoundById(crate::node::NodeId),

    #[error("node at {path} has the wrong kind (expected {expected}, found {found})")]
    WrongKind {
        path: FilePath,
        expected: &'static str,
        found: &'static str,
    },

    #[error("a child named {name:?} already exists under {parent}")]
    NameCollision {
        parent: FilePath,
        name: String,
    },

    #[error("cannot drop node {0}: still attached")]
    StillAttached(crate::node::NodeId),

    #[error("cannot re-attach node {0} at its old location")]
    ReattachAtOldLocation(crate::node::NodeId),

    #[error("cannot detach the root node")]
    CannotDetachRoot,

    #[error("{0} is not a directory")]
    NotADirectory(FilePath),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at {}", locations.join(", "))]
pub struct MergeConflictError {
    pub kind: ConflictKind,
    pub locations: Vec<String>,
}

/// Returns an [`VertreeError::IntegrityAssertion`] carrying `msg` when `cond` is false.
///
/// This is the crate's equivalent of the source implementation's `I(...)` assertion:
/// a condition that should be unreachable given the rest of the crate's invariants.
macro_rules! invariant {
    ($cond:expr, $($arg:tt)+) => {
        if !($cond) {
            return Err($crate::error::VertreeError::IntegrityAssertion(format!($($arg)+)));
        }
    };
}

pub(crate) use invariant;
