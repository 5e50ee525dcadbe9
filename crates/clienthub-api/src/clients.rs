//! Staff handlers for clients.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/org/{slug}/dashboard/clients` | Ordered by name |
//! | `POST` | `/org/{slug}/dashboard/clients` | |
//! | `GET`  | `/org/{slug}/dashboard/clients/{id}` | With its requests |
//! | `POST` | `/org/{slug}/dashboard/clients/{id}/invite` | Client user + magic link; repeats re-send |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use clienthub_core::{
  Entity, Error as DomainError,
  client::{Client, NewClient},
  profile::{Invitation, NewClientUser, Profile},
  request::{Request, RequestFilter},
  store::HubStore,
};
use serde::{Deserialize, Serialize};

use crate::{
  AppState,
  auth::issue_magic_link,
  error::ApiError,
  tenant::{ItemPath, Staff},
};

/// `GET /org/{slug}/dashboard/clients`
pub async fn list<S: HubStore>(
  State(state): State<AppState<S>>,
  Staff(ctx): Staff,
) -> Result<Json<Vec<Client>>, ApiError> {
  let clients = state
    .store
    .list_clients(ctx.scope)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(clients))
}

/// `POST /org/{slug}/dashboard/clients`
pub async fn create<S: HubStore>(
  State(state): State<AppState<S>>,
  Staff(ctx): Staff,
  Json(body): Json<NewClient>,
) -> Result<impl IntoResponse, ApiError> {
  let client = state
    .store
    .create_client(ctx.scope, body)
    .await
    .map_err(ApiError::store)?;
  tracing::info!(client = %client.id, organization = %client.organization_id, "client created");
  Ok((StatusCode::CREATED, Json(client)))
}

#[derive(Debug, Serialize)]
pub struct ClientDetail {
  pub client:   Client,
  pub requests: Vec<Request>,
}

/// `GET /org/{slug}/dashboard/clients/{id}`
pub async fn detail<S: HubStore>(
  State(state): State<AppState<S>>,
  Staff(ctx): Staff,
  Path(ItemPath { id, .. }): Path<ItemPath>,
) -> Result<Json<ClientDetail>, ApiError> {
  let client = state
    .store
    .get_client(ctx.scope, id)
    .await
    .map_err(ApiError::store)?
    .ok_or(DomainError::NotFound(Entity::Client))?;
  let requests = state
    .store
    .list_requests(ctx.scope, RequestFilter { client_id: Some(id), ..Default::default() })
    .await
    .map_err(ApiError::store)?;
  Ok(Json(ClientDetail { client, requests }))
}

#[derive(Debug, Deserialize)]
pub struct InviteBody {
  pub email:     String,
  pub full_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Invited {
  pub profile:    Profile,
  /// Present only when links are delivered in responses.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub magic_link: Option<String>,
}

/// `POST /org/{slug}/dashboard/clients/{id}/invite`
///
/// `201` for a new client user. Inviting an existing user of the same client
/// again answers `200` with a fresh link.
pub async fn invite<S: HubStore>(
  State(state): State<AppState<S>>,
  Staff(ctx): Staff,
  Path(ItemPath { id, .. }): Path<ItemPath>,
  Json(body): Json<InviteBody>,
) -> Result<impl IntoResponse, ApiError> {
  let Invitation { profile, created } = state
    .store
    .invite_client_user(ctx.scope, NewClientUser {
      client_id: id,
      email:     body.email,
      full_name: body.full_name,
    })
    .await
    .map_err(ApiError::store)?;
  tracing::info!(profile = %profile.id, client = %id, created, "client user invited");

  let magic_link = issue_magic_link(&state, profile.id).await?;
  let status = if created { StatusCode::CREATED } else { StatusCode::OK };
  Ok((status, Json(Invited { profile, magic_link })))
}
