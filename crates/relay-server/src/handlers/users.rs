//! User directory and presence lookups

use crate::config::AppState;
use crate::ctx::Ctx;
use crate::error::Result;
use crate::models::{PresenceState, UserId, UserPresenceRecord};
use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

/// GET /api/users
///
/// Everyone the server has seen except the caller, online first. The online
/// flag comes from the live registry, not the stored row.
pub async fn list_users(ctx: Ctx, State(state): State<AppState>) -> Result<Json<Vec<UserPresenceRecord>>> {
    info!("GET /api/users by {}", ctx.user_id());

    let registry = state.hub.registry();
    let mut users: Vec<UserPresenceRecord> = state
        .store
        .list_users()
        .await?
        .into_iter()
        .filter(|u| &u.user_id != ctx.user_id())
        .map(|mut u| {
            u.is_online = registry.is_online(&u.user_id);
            u
        })
        .collect();

    users.sort_by(|a, b| {
        b.is_online
            .cmp(&a.is_online)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    Ok(Json(users))
}

/// GET /api/presence/:user_id
pub async fn get_presence(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Json<PresenceState> {
    Json(state.hub.presence().presence(&UserId::new(user_id)))
}
