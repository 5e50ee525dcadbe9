//! Staff handlers for requests.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `GET`   | `/org/{slug}/dashboard/requests` | `?status=&open=&client_id=&due_from=&due_before=` |
//! | `POST`  | `/org/{slug}/dashboard/requests` | 201 + `ETag` |
//! | `GET`   | `/org/{slug}/dashboard/requests/{id}` | With comments, `ETag` |
//! | `PATCH` | `/org/{slug}/dashboard/requests/{id}` | Honors `If-Match` |
//! | `POST`  | `/org/{slug}/dashboard/requests/{id}/status` | Honors `If-Match` |
//! | `POST`  | `/org/{slug}/dashboard/requests/{id}/comments` | `internal` allowed |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::{HeaderMap, StatusCode},
  response::IntoResponse,
};
use chrono::NaiveDate;
use clienthub_core::{
  Entity, Error as DomainError,
  client::Client,
  comment::{CommentView, NewComment},
  lifecycle::{self, Actor, RequestStatus},
  request::{NewRequest, Priority, Request, RequestEdit, RequestFilter},
  store::HubStore,
};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::{
  AppState,
  error::ApiError,
  etag::{etag_header, expected_version},
  tenant::{ItemPath, Staff},
};

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`).
fn nullable<'de, D, T>(d: D) -> Result<Option<Option<T>>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  Option::<T>::deserialize(d).map(Some)
}

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  pub status:     Option<RequestStatus>,
  /// Only requests that are not closed.
  #[serde(default)]
  pub open:       bool,
  pub client_id:  Option<Uuid>,
  pub due_from:   Option<NaiveDate>,
  pub due_before: Option<NaiveDate>,
}

/// `GET /org/{slug}/dashboard/requests`
pub async fn list<S: HubStore>(
  State(state): State<AppState<S>>,
  Staff(ctx): Staff,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Request>>, ApiError> {
  let requests = state
    .store
    .list_requests(ctx.scope, RequestFilter {
      status:     params.status,
      open_only:  params.open,
      client_id:  params.client_id,
      due_from:   params.due_from,
      due_before: params.due_before,
    })
    .await
    .map_err(ApiError::store)?;
  Ok(Json(requests))
}

// ─── Create ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub client_id:   Uuid,
  pub title:       String,
  pub description: Option<String>,
  #[serde(rename = "type", default)]
  pub kind:        String,
  #[serde(default)]
  pub priority:    Priority,
  pub due_date:    Option<NaiveDate>,
  pub assigned_to: Option<Uuid>,
}

/// `POST /org/{slug}/dashboard/requests`
pub async fn create<S: HubStore>(
  State(state): State<AppState<S>>,
  Staff(ctx): Staff,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError> {
  let request = state
    .store
    .create_request(ctx.scope, NewRequest {
      client_id:   body.client_id,
      title:       body.title,
      description: body.description,
      kind:        body.kind,
      priority:    body.priority,
      due_date:    body.due_date,
      assigned_to: body.assigned_to,
      created_by:  ctx.profile_id(),
    })
    .await
    .map_err(ApiError::store)?;

  tracing::info!(request = %request.id, client = %request.client_id, "request created by staff");
  Ok((StatusCode::CREATED, etag_header(&request), Json(request)))
}

// ─── Detail ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Detail {
  pub request:       Request,
  pub client:        Option<Client>,
  pub comments:      Vec<CommentView>,
  pub next_statuses: Vec<RequestStatus>,
}

/// `GET /org/{slug}/dashboard/requests/{id}`
pub async fn detail<S: HubStore>(
  State(state): State<AppState<S>>,
  Staff(ctx): Staff,
  Path(ItemPath { id, .. }): Path<ItemPath>,
) -> Result<impl IntoResponse, ApiError> {
  let request = state
    .store
    .get_request(ctx.scope, id)
    .await
    .map_err(ApiError::store)?
    .ok_or(DomainError::NotFound(Entity::Request))?;
  let client = state
    .store
    .get_client(ctx.scope, request.client_id)
    .await
    .map_err(ApiError::store)?;
  let comments = state
    .store
    .list_comments(ctx.scope, id)
    .await
    .map_err(ApiError::store)?;

  Ok((
    etag_header(&request),
    Json(Detail {
      next_statuses: lifecycle::next_statuses(request.status, Actor::Staff),
      request,
      client,
      comments,
    }),
  ))
}

// ─── Edit ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct EditBody {
  pub title:       Option<String>,
  #[serde(default, deserialize_with = "nullable")]
  pub description: Option<Option<String>>,
  #[serde(rename = "type")]
  pub kind:        Option<String>,
  pub priority:    Option<Priority>,
  #[serde(default, deserialize_with = "nullable")]
  pub due_date:    Option<Option<NaiveDate>>,
  #[serde(default, deserialize_with = "nullable")]
  pub assigned_to: Option<Option<Uuid>>,
}

impl From<EditBody> for RequestEdit {
  fn from(b: EditBody) -> Self {
    Self {
      title:       b.title,
      description: b.description,
      kind:        b.kind,
      priority:    b.priority,
      due_date:    b.due_date,
      assigned_to: b.assigned_to,
    }
  }
}

/// `PATCH /org/{slug}/dashboard/requests/{id}`
pub async fn edit<S: HubStore>(
  State(state): State<AppState<S>>,
  Staff(ctx): Staff,
  Path(ItemPath { id, .. }): Path<ItemPath>,
  headers: HeaderMap,
  Json(body): Json<EditBody>,
) -> Result<impl IntoResponse, ApiError> {
  let expected = expected_version(&*state.store, ctx.scope, id, &headers).await?;
  let request = state
    .store
    .edit_request(ctx.scope, id, body.into(), expected)
    .await
    .map_err(ApiError::store)?;
  Ok((etag_header(&request), Json(request)))
}

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StatusBody {
  pub status: RequestStatus,
}

/// `POST /org/{slug}/dashboard/requests/{id}/status`
pub async fn set_status<S: HubStore>(
  State(state): State<AppState<S>>,
  Staff(ctx): Staff,
  Path(ItemPath { id, .. }): Path<ItemPath>,
  headers: HeaderMap,
  Json(body): Json<StatusBody>,
) -> Result<impl IntoResponse, ApiError> {
  let expected = expected_version(&*state.store, ctx.scope, id, &headers).await?;
  let request = state
    .store
    .transition_request(ctx.scope, id, body.status, expected)
    .await
    .map_err(|e| {
      let e = ApiError::store(e);
      if let ApiError::Domain(DomainError::InvalidTransition { from, to, .. }) = &e {
        tracing::info!(request = %id, %from, %to, "staff transition rejected");
      }
      e
    })?;

  tracing::info!(request = %id, status = %request.status, "request status changed");
  Ok((etag_header(&request), Json(request)))
}

// ─── Comments ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CommentBody {
  pub content:  String,
  /// Hidden from the client when set.
  #[serde(default)]
  pub internal: bool,
}

/// `POST /org/{slug}/dashboard/requests/{id}/comments`
pub async fn comment<S: HubStore>(
  State(state): State<AppState<S>>,
  Staff(ctx): Staff,
  Path(ItemPath { id, .. }): Path<ItemPath>,
  Json(body): Json<CommentBody>,
) -> Result<impl IntoResponse, ApiError> {
  let mut new = NewComment::new(ctx.profile_id(), body.content);
  if body.internal {
    new = new.internal();
  }
  let comment = state
    .store
    .add_comment(ctx.scope, id, new)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(comment)))
}
