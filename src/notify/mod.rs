//! Notification channel
//!
//! Typed notifications (`cqrs-status-changed`, `replay-*`, `entity-*`,
//! `store-cleared`, `bulk-*`) published by the engine and consumed by the
//! WebSocket endpoint or any other observer.

mod broadcaster;
mod events;

pub use broadcaster::{Broadcaster, Publisher};
pub use events::{ClientMessage, Envelope, Notification, PongMessage, WelcomeMessage};
