//! Tutorboard WebSocket Relay Server
//!
//! Relays session broadcasts between connected clients. The relay is
//! stateless with respect to canvas content: it keeps no history, and a
//! broadcast is never delivered back to the connection that published it.
//!
//! ## Protocol
//!
//! Messages are JSON tagged by `type`:
//! ```json
//! { "type": "join", "session": "session:abc", "user_id": "u1" }
//! { "type": "broadcast", "event": "canvas-update", "payload": { ... } }
//! { "type": "leave" }
//! ```

pub mod config;
pub mod handlers;
pub mod state;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use config::Config;
pub use state::AppState;

/// Build the relay router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/ws", get(handlers::ws_handler))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
