//! Write pipeline
//!
//! ```text
//! command ──► validate against history ──► append ──► apply to app store ──► publish
//!              (under the entity's lock ─────────────────────────────────)
//! ```

mod locks;
mod write;

pub use locks::{EntityGuard, EntityLocks};
pub use write::WritePipeline;
