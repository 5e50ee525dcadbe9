//! Client portal handlers.
//!
//! Everything here runs under a client scope: the store only ever returns
//! the caller's own client, its requests and the non-internal comments on
//! them.
//!
//! The sign-in routes are the exception: they run without a session and
//! only ever issue links to client users of the organization in the path.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/org/{slug}/portal/login` | `?error=` reason of a refusal |
//! | `POST` | `/org/{slug}/portal/login` | Magic link; always acknowledged |
//! | `GET`  | `/org/{slug}/portal` | Home with counts |
//! | `POST` | `/org/{slug}/portal/requests` | Always `new`, `medium` |
//! | `GET`  | `/org/{slug}/portal/requests/{id}` | `ETag` |
//! | `POST` | `/org/{slug}/portal/requests/{id}/approve` | Honors `If-Match` |
//! | `POST` | `/org/{slug}/portal/requests/{id}/request-changes` | Comment required |
//! | `POST` | `/org/{slug}/portal/requests/{id}/comments` | |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::{HeaderMap, StatusCode},
  response::IntoResponse,
};
use chrono::NaiveDate;
use clienthub_core::{
  Entity, Error as DomainError,
  access::DenyReason,
  profile::{Membership, normalize_email},
  client::Client,
  comment::{Comment, CommentView, NewComment},
  lifecycle::{self, Actor, RequestStatus},
  organization::Organization,
  report::PortalCounts,
  request::{KNOWN_TYPES, NewRequest, Priority, Request, RequestFilter},
  store::HubStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  AppState,
  auth::{LoginPage, LoginParams, MagicLinkBody, MagicLinkSent, issue_magic_link},
  error::ApiError,
  etag::{etag_header, expected_version},
  tenant::{ItemPath, Portal},
};

// ─── Sign-in ─────────────────────────────────────────────────────────────────

/// `GET /org/{slug}/portal/login`
pub async fn login_page(
  Path(slug): Path<String>,
  Query(params): Query<LoginParams>,
) -> Json<LoginPage> {
  Json(LoginPage {
    error:      params.error,
    password:   None,
    magic_link: format!("/org/{slug}/portal/login"),
  })
}

/// `POST /org/{slug}/portal/login`
///
/// Answers the same whether or not the email belongs to a client user of
/// this organization.
pub async fn login<S: HubStore>(
  State(state): State<AppState<S>>,
  Path(slug): Path<String>,
  Json(body): Json<MagicLinkBody>,
) -> Result<Json<MagicLinkSent>, ApiError> {
  let link = match portal_member(&state, &slug, &body.email).await? {
    Some(profile_id) => issue_magic_link(&state, profile_id).await?,
    None => {
      tracing::debug!(slug, "portal sign-in requested for a non-member");
      None
    }
  };
  Ok(Json(MagicLinkSent { sent: true, link }))
}

/// The client user behind `email`, if it belongs to a client of the
/// organization at `slug`.
async fn portal_member<S: HubStore>(
  state: &AppState<S>,
  slug: &str,
  email: &str,
) -> Result<Option<Uuid>, ApiError> {
  let store = &state.store;
  let Some(organization) = store
    .organization_by_slug(slug)
    .await
    .map_err(ApiError::store)?
  else {
    return Ok(None);
  };
  let Some(credentials) = store
    .credentials_by_email(&normalize_email(email))
    .await
    .map_err(ApiError::store)?
  else {
    return Ok(None);
  };
  let Some(profile) = store
    .get_profile(credentials.profile_id)
    .await
    .map_err(ApiError::store)?
  else {
    return Ok(None);
  };
  let Membership::Client { client_id } = profile.membership() else {
    return Ok(None);
  };
  let owner = store.client_organization(client_id).await.map_err(ApiError::store)?;
  Ok((owner == Some(organization.id)).then_some(profile.id))
}

// ─── Home ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Home {
  pub organization:  Organization,
  pub client:        Client,
  pub counts:        PortalCounts,
  pub requests:      Vec<Request>,
  /// Suggested values for `type` when creating a request.
  pub request_types: &'static [&'static str],
}

/// `GET /org/{slug}/portal`
pub async fn home<S: HubStore>(
  State(state): State<AppState<S>>,
  Portal(ctx): Portal,
) -> Result<Json<Home>, ApiError> {
  let client_id = ctx
    .scope
    .client_id()
    .ok_or(DomainError::NotAuthorized { reason: DenyReason::NotClient })?;
  let client = state
    .store
    .get_client(ctx.scope, client_id)
    .await
    .map_err(ApiError::store)?
    .ok_or(DomainError::NotFound(Entity::Client))?;
  let requests = state
    .store
    .list_requests(ctx.scope, RequestFilter::default())
    .await
    .map_err(ApiError::store)?;

  Ok(Json(Home {
    counts: PortalCounts::tally(&requests),
    organization: ctx.organization,
    client,
    requests,
    request_types: KNOWN_TYPES,
  }))
}

// ─── Create ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub title:       String,
  pub description: Option<String>,
  #[serde(rename = "type", default)]
  pub kind:        String,
  pub due_date:    Option<NaiveDate>,
}

/// `POST /org/{slug}/portal/requests`
pub async fn create<S: HubStore>(
  State(state): State<AppState<S>>,
  Portal(ctx): Portal,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError> {
  let client_id = ctx
    .scope
    .client_id()
    .ok_or(DomainError::NotAuthorized { reason: DenyReason::NotClient })?;
  let request = state
    .store
    .create_request(ctx.scope, NewRequest {
      client_id,
      title: body.title,
      description: body.description,
      kind: body.kind,
      priority: Priority::Medium,
      due_date: body.due_date,
      assigned_to: None,
      created_by: ctx.profile_id(),
    })
    .await
    .map_err(ApiError::store)?;

  tracing::info!(request = %request.id, client = %client_id, "request created from portal");
  Ok((StatusCode::CREATED, etag_header(&request), Json(request)))
}

// ─── Detail ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Detail {
  pub request:       Request,
  pub comments:      Vec<CommentView>,
  pub next_statuses: Vec<RequestStatus>,
}

/// `GET /org/{slug}/portal/requests/{id}`
pub async fn detail<S: HubStore>(
  State(state): State<AppState<S>>,
  Portal(ctx): Portal,
  Path(ItemPath { id, .. }): Path<ItemPath>,
) -> Result<impl IntoResponse, ApiError> {
  let request = state
    .store
    .get_request(ctx.scope, id)
    .await
    .map_err(ApiError::store)?
    .ok_or(DomainError::NotFound(Entity::Request))?;
  let comments = state
    .store
    .list_comments(ctx.scope, id)
    .await
    .map_err(ApiError::store)?;

  Ok((
    etag_header(&request),
    Json(Detail {
      next_statuses: lifecycle::next_statuses(request.status, Actor::Client),
      request,
      comments,
    }),
  ))
}

// ─── Decisions ───────────────────────────────────────────────────────────────

/// `POST /org/{slug}/portal/requests/{id}/approve`
pub async fn approve<S: HubStore>(
  State(state): State<AppState<S>>,
  Portal(ctx): Portal,
  Path(ItemPath { id, .. }): Path<ItemPath>,
  headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
  let expected = expected_version(&*state.store, ctx.scope, id, &headers).await?;
  let request = state
    .store
    .transition_request(ctx.scope, id, RequestStatus::Approved, expected)
    .await
    .map_err(ApiError::store)?;

  tracing::info!(request = %id, profile = %ctx.profile_id(), "request approved");
  Ok((etag_header(&request), Json(request)))
}

#[derive(Debug, Deserialize)]
pub struct CommentBody {
  pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ChangesRequested {
  pub request: Request,
  pub comment: Comment,
}

/// `POST /org/{slug}/portal/requests/{id}/request-changes`
pub async fn request_changes<S: HubStore>(
  State(state): State<AppState<S>>,
  Portal(ctx): Portal,
  Path(ItemPath { id, .. }): Path<ItemPath>,
  Json(body): Json<CommentBody>,
) -> Result<impl IntoResponse, ApiError> {
  let (request, comment) = state
    .store
    .request_changes(ctx.scope, id, NewComment::new(ctx.profile_id(), body.content))
    .await
    .map_err(ApiError::store)?;

  tracing::info!(request = %id, profile = %ctx.profile_id(), "changes requested");
  Ok((etag_header(&request), Json(ChangesRequested { request, comment })))
}

/// `POST /org/{slug}/portal/requests/{id}/comments`
pub async fn comment<S: HubStore>(
  State(state): State<AppState<S>>,
  Portal(ctx): Portal,
  Path(ItemPath { id, .. }): Path<ItemPath>,
  Json(body): Json<CommentBody>,
) -> Result<impl IntoResponse, ApiError> {
  let comment = state
    .store
    .add_comment(ctx.scope, id, NewComment::new(ctx.profile_id(), body.content))
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(comment)))
}
