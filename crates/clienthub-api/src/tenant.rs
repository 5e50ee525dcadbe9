//! Tenant extractors.
//!
//! [`Staff`] and [`Portal`] resolve the `{slug}` path segment and the
//! caller's session into a [`SessionContext`] for the dashboard or the portal.
//! A handler taking either one only runs once access has been granted; every
//! refusal is answered with the login route of the surface being used.

use std::collections::HashMap;

use axum::{
  extract::{FromRequestParts, Path},
  http::request::Parts,
};
use chrono::Utc;
use clienthub_core::{
  access::{self, SessionContext, Surface},
  store::HubStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError, session::MaybeSession};

/// A staff member inside their organization's dashboard.
pub struct Staff(pub SessionContext);

/// A client user inside their organization's portal.
pub struct Portal(pub SessionContext);

/// Path of routes addressing one record below an organization.
#[derive(Debug, Deserialize)]
pub struct ItemPath {
  pub slug: String,
  pub id:   Uuid,
}

async fn resolve_surface<S>(
  parts: &mut Parts,
  state: &AppState<S>,
  surface: Surface,
) -> Result<SessionContext, ApiError>
where
  S: HubStore + 'static,
{
  let Path(params) = Path::<HashMap<String, String>>::from_request_parts(parts, state)
    .await
    .map_err(|e| ApiError::Internal(format!("path extraction failed: {e}")))?;
  let slug = params
    .get("slug")
    .ok_or_else(|| ApiError::Internal("route has no {slug} segment".to_owned()))?;

  let MaybeSession(session) = MaybeSession::from_request_parts(parts, state).await?;

  access::resolve(
    &*state.store,
    session.map(|s| s.profile),
    slug,
    surface,
    Utc::now(),
  )
  .await
  .map_err(|e| ApiError::refused(e, surface, slug))
}

impl<S> FromRequestParts<AppState<S>> for Staff
where
  S: HubStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    resolve_surface(parts, state, Surface::Dashboard).await.map(Self)
  }
}

impl<S> FromRequestParts<AppState<S>> for Portal
where
  S: HubStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    resolve_surface(parts, state, Surface::Portal).await.map(Self)
  }
}
