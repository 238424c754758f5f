//! HTTP and WebSocket handlers

use crate::config::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};

pub mod messages;
pub mod users;
pub mod ws;

pub use ws::run_connection;

/// Routes that require a caller identity
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .route("/api/messages", post(messages::post_message))
        .route("/api/messages/{id}", get(messages::get_conversation))
        .route("/api/messages/{id}/read", put(messages::mark_read))
        .route("/api/users", get(users::list_users))
        .route("/api/presence/{user_id}", get(users::get_presence))
}
