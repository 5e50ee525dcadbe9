//! ETags for requests and `If-Match` handling.
//!
//! A request's ETag is a SHA-256 over its id and version, so it changes on
//! every write. Status changes and edits that carry `If-Match` are turned
//! into an expected version which the store checks inside the write.

use axum::http::{HeaderMap, HeaderName, header};
use clienthub_core::{
  Entity, Error as DomainError, access::TenantScope, request::Request, store::HubStore,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ApiError;

/// The quoted ETag of `request`'s current version.
pub fn request_etag(request: &Request) -> String {
  let mut hasher = Sha256::new();
  hasher.update(request.id.as_bytes());
  hasher.update(request.version.to_le_bytes());
  format!("\"{}\"", hex::encode(hasher.finalize()))
}

/// Header pair for responses carrying `request`.
pub fn etag_header(request: &Request) -> [(HeaderName, String); 1] {
  [(header::ETAG, request_etag(request))]
}

/// Compare ETags ignoring quotes and a weak prefix.
pub fn strip_etag_quotes(s: &str) -> &str {
  let s = s.trim();
  s.strip_prefix("W/").unwrap_or(s).trim_matches('"')
}

/// The version a write must find, or `None` for an unconditional write.
///
/// Fails with [`DomainError::VersionConflict`] straight away when the tag no
/// longer matches; the store repeats the check inside its transaction.
pub async fn expected_version<S: HubStore>(
  store: &S,
  scope: TenantScope,
  request_id: Uuid,
  headers: &HeaderMap,
) -> Result<Option<i64>, ApiError> {
  let Some(tag) = headers.get(header::IF_MATCH).and_then(|v| v.to_str().ok()) else {
    return Ok(None);
  };
  if tag.trim() == "*" {
    return Ok(None);
  }

  let current = store
    .get_request(scope, request_id)
    .await
    .map_err(ApiError::store)?
    .ok_or(DomainError::NotFound(Entity::Request))?;

  let current_tag = request_etag(&current);
  if strip_etag_quotes(tag) != strip_etag_quotes(&current_tag) {
    tracing::debug!(request = %request_id, "stale If-Match");
    return Err(DomainError::VersionConflict.into());
  }
  Ok(Some(current.version))
}
