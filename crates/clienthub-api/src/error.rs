//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use clienthub_core::{
  Error as DomainError,
  access::{DenyReason, Surface},
  store::BackendError,
};
use serde_json::json;
use thiserror::Error;

/// Where refused callers are sent when no surface-specific target applies.
pub const APP_LOGIN: &str = "/app/login";

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Domain(#[from] DomainError),

  /// An authentication or authorization refusal with the login route the
  /// caller should be sent to.
  #[error("{source}")]
  Refused {
    source:   DomainError,
    redirect: String,
  },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("internal error: {0}")]
  Internal(String),
}

impl ApiError {
  /// Split a backend error into a domain failure or a storage failure.
  pub fn store<E: BackendError>(e: E) -> Self {
    match e.into_domain() {
      Ok(domain) => Self::Domain(domain),
      Err(e) => Self::Store(Box::new(e)),
    }
  }

  /// Like [`ApiError::store`], but refusals carry the login route of
  /// `surface` with the refusal reason. Unknown organizations always point at
  /// the app login so the portal does not reveal which tenants exist.
  pub fn refused<E: BackendError>(e: E, surface: Surface, slug: &str) -> Self {
    match Self::store(e) {
      Self::Domain(source @ DomainError::AuthRequired) => {
        Self::Refused { redirect: surface.login_path(slug, None), source }
      }
      Self::Domain(source @ DomainError::NotAuthorized { reason }) => {
        let surface = match reason {
          DenyReason::UnknownOrganization => Surface::Dashboard,
          _ => surface,
        };
        Self::Refused { redirect: surface.login_path(slug, Some(reason)), source }
      }
      other => other,
    }
  }
}

fn redirect_response(status: StatusCode, body: serde_json::Value, to: &str) -> Response {
  let mut res = (status, Json(body)).into_response();
  if let Ok(location) = HeaderValue::from_str(to) {
    res.headers_mut().insert(header::LOCATION, location);
  }
  res
}

fn domain_response(e: &DomainError, redirect: &str) -> Response {
  let message = e.to_string();
  match e {
    DomainError::AuthRequired => redirect_response(
      StatusCode::UNAUTHORIZED,
      json!({ "error": message, "redirect": redirect }),
      redirect,
    ),
    DomainError::NotAuthorized { reason } => redirect_response(
      StatusCode::FORBIDDEN,
      json!({ "error": message, "reason": reason, "redirect": redirect }),
      redirect,
    ),
    DomainError::NotFound(_) => (StatusCode::NOT_FOUND, Json(json!({ "error": message })))
      .into_response(),
    DomainError::Validation(_) => (
      StatusCode::UNPROCESSABLE_ENTITY,
      Json(json!({ "error": message })),
    )
      .into_response(),
    DomainError::SlugTaken(_) | DomainError::EmailTaken(_) => {
      (StatusCode::CONFLICT, Json(json!({ "error": message }))).into_response()
    }
    DomainError::InvalidTransition { from, to, .. } => (
      StatusCode::CONFLICT,
      Json(json!({ "error": message, "from": from, "to": to })),
    )
      .into_response(),
    DomainError::VersionConflict => (
      StatusCode::PRECONDITION_FAILED,
      Json(json!({ "error": message })),
    )
      .into_response(),
    DomainError::SubscriptionBlocked(notice) => (
      StatusCode::PAYMENT_REQUIRED,
      Json(json!({ "error": message, "notice": notice })),
    )
      .into_response(),
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    match self {
      ApiError::Domain(e) => {
        tracing::debug!(error = %e, "request refused");
        domain_response(&e, APP_LOGIN)
      }
      ApiError::Refused { source, redirect } => {
        tracing::debug!(error = %source, %redirect, "access refused");
        domain_response(&source, &redirect)
      }
      ApiError::Store(e) => {
        tracing::error!(error = %e, "storage failure");
        internal()
      }
      ApiError::Internal(e) => {
        tracing::error!(error = %e, "internal failure");
        internal()
      }
    }
  }
}

fn internal() -> Response {
  (
    StatusCode::INTERNAL_SERVER_ERROR,
    Json(json!({ "error": "internal error" })),
  )
    .into_response()
}
