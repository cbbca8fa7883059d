//! Application Store synchronization
//!
//! - `Synchronizer`: full rebuilds (`rebuild_all`) and purges (`reset`)
//! - `ProgressThrottle`: rate-limits progress notifications
//!
//! Incremental updates on each write are applied by the write pipeline under
//! the same per-entity locks the synchronizer uses.

mod synchronizer;
mod throttle;

pub use synchronizer::{RebuildOutcome, RebuildReport, SyncError, Synchronizer};
pub use throttle::ProgressThrottle;
