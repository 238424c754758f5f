//! Request identity
//!
//! Requests arrive pre-authenticated: a fronting gateway sets `x-user-id`.
//! Browser WebSocket clients cannot set headers, so `?user_id=` is accepted
//! as well. No credentials are checked here.

use crate::error::{ChatError, Result};
use crate::models::UserId;
use axum::{
    extract::{FromRequestParts, Query, Request},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use tracing::debug;

pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Clone, Debug)]
pub struct Ctx {
    user_id: UserId,
}

impl Ctx {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn into_user_id(self) -> UserId {
        self.user_id
    }
}

impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = ChatError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<Ctx>()
            .cloned()
            .ok_or(ChatError::IdentityMissing)
    }
}

#[derive(Deserialize)]
struct IdentityQuery {
    user_id: Option<String>,
}

fn resolve_identity(req: &Request) -> Option<UserId> {
    let from_header = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(UserId::from);

    from_header.or_else(|| {
        Query::<IdentityQuery>::try_from_uri(req.uri())
            .ok()
            .and_then(|Query(q)| q.user_id)
            .filter(|v| !v.trim().is_empty())
            .map(UserId::from)
    })
}

pub async fn mw_require_identity(mut req: Request, next: Next) -> Result<Response> {
    debug!("MIDDLEWARE: require_identity");

    let user_id = resolve_identity(&req).ok_or(ChatError::IdentityMissing)?;
    req.extensions_mut().insert(Ctx::new(user_id));

    Ok(next.run(req).await)
}
