//! Session tokens and the session extractors.
//!
//! A session token is 32 bytes from the OS RNG, base64url-encoded. Only its
//! SHA-256 digest is ever stored, so a leaked database does not leak usable
//! tokens. Tokens arrive as `Authorization: Bearer <token>` or in the
//! [`COOKIE_NAME`] cookie.

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, HeaderValue, header, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{Duration, Utc};
use clienthub_core::{Error as DomainError, profile::Profile, store::HubStore};
use rand_core::{OsRng, RngCore as _};
use sha2::{Digest as _, Sha256};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

pub const COOKIE_NAME: &str = "clienthub_session";

/// A fresh random token.
pub fn generate_token() -> String {
  let mut bytes = [0u8; 32];
  OsRng.fill_bytes(&mut bytes);
  URL_SAFE_NO_PAD.encode(bytes)
}

/// The stored form of a token.
pub fn hash_token(token: &str) -> String { hex::encode(Sha256::digest(token.as_bytes())) }

/// The raw token presented with a request, if any. A bearer header wins
/// over the cookie.
pub fn presented_token(headers: &HeaderMap) -> Option<&str> {
  let bearer = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .map(str::trim)
    .filter(|t| !t.is_empty());
  if bearer.is_some() {
    return bearer;
  }

  headers
    .get_all(header::COOKIE)
    .iter()
    .filter_map(|v| v.to_str().ok())
    .flat_map(|v| v.split(';'))
    .filter_map(|pair| pair.trim().split_once('='))
    .find(|(name, _)| *name == COOKIE_NAME)
    .map(|(_, value)| value)
    .filter(|t| !t.is_empty())
}

/// `Set-Cookie` value carrying `token` for `ttl`.
pub fn session_cookie(token: &str, ttl: Duration) -> Option<HeaderValue> {
  HeaderValue::from_str(&format!(
    "{COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
    ttl.num_seconds()
  ))
  .ok()
}

/// `Set-Cookie` value removing the session cookie.
pub fn cleared_cookie() -> HeaderValue {
  HeaderValue::from_static("clienthub_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Create a session for `profile_id` and return its raw token.
pub async fn start_session<S: HubStore>(
  state: &AppState<S>,
  profile_id: Uuid,
) -> Result<String, ApiError> {
  let token = generate_token();
  state
    .store
    .create_session(profile_id, hash_token(&token), Utc::now() + state.config.session_ttl())
    .await
    .map_err(ApiError::store)?;
  Ok(token)
}

// ─── Extractors ──────────────────────────────────────────────────────────────

/// A signed-in caller.
#[derive(Debug, Clone)]
pub struct Session {
  pub profile:    Profile,
  pub token_hash: String,
}

/// The caller's session, or `None` when no valid session was presented.
/// Never rejects except on storage failure.
pub struct MaybeSession(pub Option<Session>);

impl<S> FromRequestParts<AppState<S>> for MaybeSession
where
  S: HubStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let Some(token) = presented_token(&parts.headers) else {
      return Ok(Self(None));
    };
    let token_hash = hash_token(token);

    let profile = state
      .store
      .profile_for_session(token_hash.clone(), Utc::now())
      .await
      .map_err(ApiError::store)?;

    Ok(Self(profile.map(|profile| Session { profile, token_hash })))
  }
}

impl<S> FromRequestParts<AppState<S>> for Session
where
  S: HubStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let MaybeSession(session) = MaybeSession::from_request_parts(parts, state).await?;
    session.ok_or(ApiError::Domain(DomainError::AuthRequired))
  }
}
