//! HTTP handlers: sign-in, identities and inboxes.
//!
//! Authenticated routes take the session token as `Authorization: Bearer`.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use hyperspace_core::{AccountId, InboxId, SpaceId};
use hyperspace_keys::{IdentityKeyBox, PublicIdentity};
use hyperspace_store::{InboxMessageRecord, KeyValueStore, Store};

use crate::app::AppState;
use crate::auth::{LoginRequest, RegisterIdentityRequest};
use crate::error::{Result, ServerError};
use crate::service::{InboxInfo, PostInboxMessage};

/// The account behind a valid bearer token.
pub struct Session(pub AccountId);

#[axum::async_trait]
impl<S> FromRequestParts<Arc<AppState<S>>> for Session
where
    S: Store + KeyValueStore + 'static,
{
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> std::result::Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServerError::Unauthorized("missing bearer token".into()))?;
        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ServerError::Unauthorized("malformed authorization header".into()))?;
        Ok(Session(state.auth.resolve_session(token).await?))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceRequest {
    pub account_id: AccountId,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceResponse {
    pub session_nonce: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhoAmIResponse {
    pub account_id: AccountId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityQuery {
    pub account_id: AccountId,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedIdentityResponse {
    pub key_box: IdentityKeyBox,
}

// ─────────────────────────────────────────────────────────────────────────────
// Sign-in and identities
// ─────────────────────────────────────────────────────────────────────────────

pub async fn login_nonce<S>(
    State(state): State<Arc<AppState<S>>>,
    Json(request): Json<NonceRequest>,
) -> Result<Json<NonceResponse>>
where
    S: Store + KeyValueStore + 'static,
{
    let session_nonce = state.auth.issue_nonce(&request.account_id).await?;
    Ok(Json(NonceResponse { session_nonce }))
}

pub async fn login<S>(
    State(state): State<Arc<AppState<S>>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<SessionResponse>>
where
    S: Store + KeyValueStore + 'static,
{
    let session_token = state.auth.login(&request).await?;
    Ok(Json(SessionResponse { session_token }))
}

pub async fn register_identity<S>(
    State(state): State<Arc<AppState<S>>>,
    Json(request): Json<RegisterIdentityRequest>,
) -> Result<Json<SessionResponse>>
where
    S: Store + KeyValueStore + 'static,
{
    let session_token = state.auth.register_identity(request).await?;
    Ok(Json(SessionResponse { session_token }))
}

pub async fn whoami(Session(account_id): Session) -> Json<WhoAmIResponse> {
    Json(WhoAmIResponse { account_id })
}

pub async fn public_identity<S>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<IdentityQuery>,
) -> Result<Json<PublicIdentity>>
where
    S: Store + KeyValueStore + 'static,
{
    Ok(Json(state.auth.public_identity(&query.account_id).await?))
}

pub async fn encrypted_identity<S>(
    State(state): State<Arc<AppState<S>>>,
    Session(account_id): Session,
) -> Result<Json<EncryptedIdentityResponse>>
where
    S: Store + KeyValueStore + 'static,
{
    let identity = state.auth.identity(&account_id).await?;
    Ok(Json(EncryptedIdentityResponse {
        key_box: identity.key_box,
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Inboxes
// ─────────────────────────────────────────────────────────────────────────────

pub async fn space_inboxes<S>(
    State(state): State<Arc<AppState<S>>>,
    Path(space_id): Path<SpaceId>,
) -> Result<Json<Vec<InboxInfo>>>
where
    S: Store + KeyValueStore + 'static,
{
    Ok(Json(state.service.public_space_inboxes(&space_id).await?))
}

pub async fn space_inbox<S>(
    State(state): State<Arc<AppState<S>>>,
    Path((space_id, inbox_id)): Path<(SpaceId, InboxId)>,
) -> Result<Json<InboxInfo>>
where
    S: Store + KeyValueStore + 'static,
{
    Ok(Json(
        state.service.public_space_inbox(&space_id, &inbox_id).await?,
    ))
}

pub async fn post_space_inbox_message<S>(
    State(state): State<Arc<AppState<S>>>,
    Path((space_id, inbox_id)): Path<(SpaceId, InboxId)>,
    Json(post): Json<PostInboxMessage>,
) -> Result<(StatusCode, Json<InboxMessageRecord>)>
where
    S: Store + KeyValueStore + 'static,
{
    let message = state
        .service
        .post_space_inbox_message(&space_id, &inbox_id, post)
        .await
        .map_err(|e| {
            e.log("post-space-inbox-message");
            e
        })?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn account_inboxes<S>(
    State(state): State<Arc<AppState<S>>>,
    Path(account_id): Path<AccountId>,
) -> Result<Json<Vec<InboxInfo>>>
where
    S: Store + KeyValueStore + 'static,
{
    Ok(Json(state.service.public_account_inboxes(&account_id).await?))
}

pub async fn account_inbox<S>(
    State(state): State<Arc<AppState<S>>>,
    Path((account_id, inbox_id)): Path<(AccountId, InboxId)>,
) -> Result<Json<InboxInfo>>
where
    S: Store + KeyValueStore + 'static,
{
    Ok(Json(
        state
            .service
            .public_account_inbox(&account_id, &inbox_id)
            .await?,
    ))
}

pub async fn post_account_inbox_message<S>(
    State(state): State<Arc<AppState<S>>>,
    Path((account_id, inbox_id)): Path<(AccountId, InboxId)>,
    Json(post): Json<PostInboxMessage>,
) -> Result<(StatusCode, Json<InboxMessageRecord>)>
where
    S: Store + KeyValueStore + 'static,
{
    let message = state
        .service
        .post_account_inbox_message(&account_id, &inbox_id, post)
        .await
        .map_err(|e| {
            e.log("post-account-inbox-message");
            e
        })?;
    Ok((StatusCode::CREATED, Json(message)))
}
