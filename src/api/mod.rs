//! API module for HTTP and WebSocket endpoints
//!
//! REST endpoints drive the catalog commands and reads; the WebSocket
//! endpoint streams notification envelopes to connected clients.

pub mod http;
pub mod rest;
pub mod state;
pub mod websocket;

pub use http::create_router;
pub use state::AppState;
