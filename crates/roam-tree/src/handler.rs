//! Capability traits implemented by live tree nodes.
//!
//! A node is [`Identifiable`], [`Navigable`], and an [`EventStreamHandler`];
//! folders are additionally a [`MutableFolder`]. Handler state lives in a
//! [`HandlerCursor`] shared by every live object with the same id.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use roam_event::StorageUpdateEvent;
use roam_stream::{EntryId, EventStreamEntry};
use roam_types::SourceAddress;

use crate::error::TreeResult;
use crate::file::NomadFile;
use crate::folder::NomadFolder;
use crate::item::StorableItem;
use crate::merge::MergeOutcome;

/// Something with a stable id and a display name.
pub trait Identifiable {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
}

/// Something with an optional parent folder.
pub trait Navigable: Identifiable {
    /// The containing folder, or `None` for the root.
    fn parent(&self) -> Option<Arc<NomadFolder>>;
}

/// Result of offering an entry to a handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The entry targeted this handler and was merged into its node.
    Applied(MergeOutcome),
    /// The entry created or removed this handler's node; only the position
    /// moved.
    Seeded,
    /// The entry was already observed.
    Duplicate,
    /// The entry is not relevant to this handler.
    Ignored,
}

impl AdvanceOutcome {
    /// Returns `true` if the handler's position moved.
    pub fn accepted(&self) -> bool {
        matches!(self, Self::Applied(_) | Self::Seeded)
    }
}

/// Replay cursor of one handler id.
///
/// `position` is `None` until the first entry is accepted and moves only
/// forward until [`HandlerCursor::clear`].
#[derive(Debug, Default)]
pub struct HandlerCursor {
    position: Option<EventStreamEntry>,
    observed: HashSet<EntryId>,
}

impl HandlerCursor {
    /// The last accepted entry.
    pub fn position(&self) -> Option<&EventStreamEntry> {
        self.position.as_ref()
    }

    pub fn has_observed(&self, id: &EntryId) -> bool {
        self.observed.contains(id)
    }

    /// Number of accepted entries since the last reset.
    pub fn observed_len(&self) -> usize {
        self.observed.len()
    }

    pub(crate) fn observe(&mut self, entry: &EventStreamEntry) {
        self.observed.insert(entry.id);
        self.position = Some(entry.clone());
    }

    pub(crate) fn clear(&mut self) {
        self.position = None;
        self.observed.clear();
    }
}

/// The replay state machine every live node implements.
///
/// Uninitialized (no position) → Advancing → Converged; [`reset`] returns
/// to Uninitialized.
///
/// [`reset`]: EventStreamHandler::reset
#[async_trait]
pub trait EventStreamHandler: Identifiable + Send + Sync {
    /// The last entry this handler accepted.
    async fn position(&self) -> Option<EventStreamEntry>;

    /// Sources whose streams feed this handler.
    fn sources(&self) -> Vec<SourceAddress>;

    /// Acceptance policy: whether `entry` is relevant to this handler.
    fn handles(&self, entry: &EventStreamEntry) -> bool;

    /// Offer `entry` to this handler.
    ///
    /// Fails with [`crate::TreeError::Cancelled`] if `cancel` fires before
    /// anything is mutated. An accepted entry is then offered to every other
    /// live handler.
    async fn try_advance(
        &self,
        entry: &EventStreamEntry,
        cancel: &CancellationToken,
    ) -> TreeResult<AdvanceOutcome>;

    /// The outcome [`apply`] would report for `event`, without mutating.
    ///
    /// [`apply`]: EventStreamHandler::apply
    fn preview(&self, event: &StorageUpdateEvent) -> TreeResult<MergeOutcome>;

    /// Merge `event` into this handler's node. Synchronous and in-memory.
    fn apply(&self, event: &StorageUpdateEvent) -> TreeResult<MergeOutcome>;

    /// Forget every applied entry and return the node to its baseline.
    async fn reset(&self, cancel: &CancellationToken) -> TreeResult<()>;
}

/// Folder operations that append to the local log.
///
/// Each operation checks the merge, appends to the local log, applies
/// locally, advances the folder's position, then fans the new entry out.
#[async_trait]
pub trait MutableFolder {
    /// Create (or, without `overwrite`, reuse) the file `name`.
    async fn create_file(
        &self,
        name: &str,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> TreeResult<Arc<NomadFile>>;

    /// Create (or, without `overwrite`, reuse) the subfolder `name`.
    async fn create_folder(
        &self,
        name: &str,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> TreeResult<Arc<NomadFolder>>;

    /// Remove a direct child.
    async fn delete(&self, item: &StorableItem, cancel: &CancellationToken) -> TreeResult<()>;
}
