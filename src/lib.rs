//! Path-filtered mirroring of git commit graphs, in both directions.
//!
//! A *full* repository is projected through a list of gitignore-style
//! patterns into a *filtered* repository whose history contains only the
//! selected paths, and commits made on the filtered side can be lifted
//! back onto the full side by replaying their in-filter diff.
//!
//! The building blocks, bottom up:
//!
//!   - [`filter`] — the restricted pattern dialect and its tri-state
//!     matcher (`In` / `DirDive` / `Out`).
//!   - [`dfs`] — deterministic post-order linearization of a commit graph.
//!   - [`trim`] — projecting trees and commits through a filter.
//!   - [`expand`] — replaying a filtered diff onto a full baseline tree.
//!   - [`filtered_dfs`] — the persistent bidirectional mapping between the
//!     two histories, with append (full → filtered) and expand
//!     (filtered → full) operations.
//!   - [`sync`] — branch status classification and the two sync
//!     directions over a pair of workspaces, plus sync records, id locks
//!     and sealed secrets.
//!
//! Object storage is abstracted behind [`ObjectStore`]; [`MemoryStore`]
//! backs one repository for the duration of a sync operation. Long-running
//! operations poll a [`Cancel`] token and unwind without persisting
//! anything when it fires.

pub mod cancel;
pub mod dfs;
pub mod error;
pub mod expand;
pub mod filter;
pub mod filtered_dfs;
pub mod hash;
pub mod object;
pub mod patch;
pub mod strip;
pub mod sync;
pub mod trim;

#[cfg(test)]
pub(crate) mod testutil;

pub use cancel::Cancel;
pub use error::{Error, Result};
pub use filter::{FilterSet, Match, Pattern};
pub use filtered_dfs::{FilteredDfs, MappingState};
pub use hash::{Hash, HashSet};
pub use object::{Commit, EntryMode, Ident, MemoryStore, ObjectStore, Tree, TreeEntry};
pub use sync::{
    BranchStatus, ImportReport, ImportStatus, SyncId, SyncOptions, SyncPair, SyncRecord,
};
