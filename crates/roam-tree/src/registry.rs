use std::sync::{Arc, RwLock, Weak};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use roam_stream::EventStreamEntry;

use crate::error::TreeError;
use crate::handler::EventStreamHandler;

/// Registry of live handlers sharing one tree.
///
/// Handlers register when materialized and are held weakly, so dropping a
/// live object is enough to unregister it; dead entries are pruned on the
/// next broadcast.
pub struct HandlerRegistry {
    handlers: RwLock<Vec<Weak<dyn EventStreamHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Add a handler.
    pub fn register(&self, handler: Weak<dyn EventStreamHandler>) {
        self.handlers.write().expect("lock poisoned").push(handler);
    }

    /// Every handler still alive, pruning the dead ones.
    pub fn live(&self) -> Vec<Arc<dyn EventStreamHandler>> {
        let mut handlers = self.handlers.write().expect("lock poisoned");
        let mut live = Vec::with_capacity(handlers.len());
        handlers.retain(|weak| match weak.upgrade() {
            Some(handler) => {
                live.push(handler);
                true
            }
            None => false,
        });
        live
    }

    /// Number of registered handlers, including ones not yet pruned.
    pub fn len(&self) -> usize {
        self.handlers.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Offer `entry` to every live handler whose id is not `except_id`.
    ///
    /// Each handler decides on its own whether the entry applies. Stops
    /// early if `cancel` fires; other failures are logged and skipped.
    pub async fn broadcast(
        &self,
        entry: &EventStreamEntry,
        except_id: &str,
        cancel: &CancellationToken,
    ) {
        for handler in self.live() {
            if handler.id() == except_id {
                continue;
            }
            match handler.try_advance(entry, cancel).await {
                Ok(outcome) if outcome.accepted() => {
                    debug!(
                        handler = handler.id(),
                        entry = %entry.id,
                        ?outcome,
                        "fan-out accepted"
                    );
                }
                Ok(_) => {}
                Err(TreeError::Cancelled) => {
                    debug!(entry = %entry.id, "fan-out cancelled");
                    return;
                }
                Err(e) => {
                    warn!(handler = handler.id(), entry = %entry.id, error = %e, "fan-out failed");
                }
            }
        }
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
