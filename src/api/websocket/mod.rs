//! WebSocket endpoint at `/ws`
//!
//! Streams every notification envelope to connected clients. A client that
//! falls behind the channel capacity receives a `lagged` error and should
//! refetch over REST, using `sequence_id` for gap detection.

pub mod handler;

pub use handler::ws_handler;
