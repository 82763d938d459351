//! Replicated file/folder tree for Roam.
//!
//! Every folder and file is an [`EventStreamHandler`]: it keeps a position
//! in the merged event streams of its sources and folds each relevant entry
//! into its node data. Merges are idempotent, so replaying a stream or
//! receiving an entry twice leaves the tree unchanged.
//!
//! Node data lives in one [`TreeContext`]; [`NomadFolder`] and [`NomadFile`]
//! are thin live views built on demand. Every live view registers with the
//! context's [`HandlerRegistry`], and an entry accepted by one handler is
//! offered to all others, so two views of the same node never diverge.
//!
//! ```text
//! remote entry ──► dispatch ──► try_advance ──► apply (merge)
//!                                    │
//! local mutation ──► commit ──► preview ──► log.append ──► apply ──► broadcast
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod file;
pub mod folder;
pub mod handler;
pub mod item;
pub mod merge;
pub mod node;
pub mod registry;

pub use config::TreeConfig;
pub use context::TreeContext;
pub use error::{TreeError, TreeResult};
pub use file::NomadFile;
pub use folder::NomadFolder;
pub use handler::{
    AdvanceOutcome, EventStreamHandler, HandlerCursor, Identifiable, MutableFolder, Navigable,
};
pub use item::{KindFilter, StorableItem};
pub use merge::{apply_event, preview_event, MergeOutcome};
pub use node::{FileNodeData, FolderNodeData, NodeKind, NodeLocation};
pub use registry::HandlerRegistry;
