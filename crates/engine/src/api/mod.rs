//! API layer - the WebSocket entry point.

pub mod connections;
pub mod websocket;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

pub use connections::{ConnectionError, ConnectionInfo, ConnectionManager, Membership};

use crate::app::App;
use websocket::WsState;

/// Router serving the session WebSocket at `/ws`.
pub fn router(app: Arc<App>) -> Router {
    let state = Arc::new(WsState::new(app));
    Router::new().route("/ws", get(websocket::ws_handler).with_state(state))
}
