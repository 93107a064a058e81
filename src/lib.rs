//! In-memory roster/cset/marking core for a distributed revision-control engine.
//!
//! ## Overview
//!
//! This crate models a single revision-control repository's structural
//! state: a [`roster::Roster`] is a tree of files and directories, a
//! [`cset::ChangeSet`] is the diff between two rosters, and a
//! [`marking::MarkingMap`] records which revision last touched each aspect
//! of each node. Applying csets forward through a revision graph, and
//! three-way merging when the graph branches and rejoins, is the whole of
//! what this crate does.
//!
//! ## Using as a library to build other programs
//!
//! This crate has no notion of a working directory, a network, or a
//! database: [`database::Database`] is the seam a caller implements to
//! supply storage, and [`database::ConflictResolver`] is the seam for
//! content conflict resolution. [`database::MemDatabase`] is a reference
//! implementation good enough for tests and small tools, not for a real
//! repository.

pub mod attr;
pub mod basic_io;
pub mod cset;
pub mod database;
pub mod error;
pub mod hash;
pub mod marking;
pub mod merge;
pub mod node;
pub mod observer;
pub mod path;
pub mod restriction;
pub mod revision;
pub mod roster;

pub use cset::ChangeSet;
pub use error::{Result, VertreeError};
pub use hash::{ContentHash, FileId, ManifestId, RevisionId};
pub use marking::{Marking, MarkingMap};
pub use merge::{three_way_merge, MergeResult, MergeSide};
pub use path::FilePath;
pub use revision::Revision;
pub use roster::Roster;
