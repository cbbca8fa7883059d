//! CQRS flag and store selector
//!
//! Two states, `EventStoreOnly` and `CqrsEnabled`. Reads consult the flag on
//! every request, so a toggle takes effect for the very next read.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Which store serves reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CqrsMode {
    /// Reads replay the event log on demand
    EventStoreOnly,
    /// Reads are served by the application store
    CqrsEnabled,
}

impl CqrsMode {
    pub fn is_enabled(self) -> bool {
        matches!(self, CqrsMode::CqrsEnabled)
    }
}

/// Handle identifying one rebuild run
///
/// A ticket goes stale as soon as the flag is toggled again; a rebuild holding
/// a stale ticket must stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildTicket {
    epoch: u64,
}

/// Result of a toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toggle {
    pub mode: CqrsMode,
    /// Present when the toggle enabled CQRS and a rebuild must run
    pub rebuild: Option<RebuildTicket>,
}

/// Process-wide CQRS state, owned explicitly and shared by reference
///
/// The flag (bit 0) and the rebuild epoch (remaining bits) share one atomic,
/// so a toggle changes both at once.
#[derive(Debug, Default)]
pub struct StoreSelector {
    state: AtomicU64,
}

const ENABLED_BIT: u64 = 1;
const EPOCH_STEP: u64 = 2;

impl StoreSelector {
    pub fn new(enabled: bool) -> Self {
        Self {
            state: AtomicU64::new(u64::from(enabled)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state.load(Ordering::SeqCst) & ENABLED_BIT != 0
    }

    pub fn mode(&self) -> CqrsMode {
        if self.is_enabled() {
            CqrsMode::CqrsEnabled
        } else {
            CqrsMode::EventStoreOnly
        }
    }

    /// Flip the flag and invalidate any rebuild in flight
    pub fn toggle(&self) -> Toggle {
        let next = |state: u64| state.wrapping_add(EPOCH_STEP) ^ ENABLED_BIT;
        let previous = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |state| Some(next(state)))
            .unwrap_or_else(|state| state);
        let current = next(previous);

        if current & ENABLED_BIT != 0 {
            Toggle {
                mode: CqrsMode::CqrsEnabled,
                rebuild: Some(RebuildTicket {
                    epoch: epoch_of(current),
                }),
            }
        } else {
            Toggle {
                mode: CqrsMode::EventStoreOnly,
                rebuild: None,
            }
        }
    }

    /// Ticket for a rebuild that is not triggered by a toggle
    pub fn ticket(&self) -> RebuildTicket {
        RebuildTicket {
            epoch: epoch_of(self.state.load(Ordering::SeqCst)),
        }
    }

    /// Whether a rebuild holding `ticket` has been superseded
    pub fn is_cancelled(&self, ticket: RebuildTicket) -> bool {
        epoch_of(self.state.load(Ordering::SeqCst)) != ticket.epoch
    }
}

fn epoch_of(state: u64) -> u64 {
    state >> 1
}
