//! Staff dashboard read models and settings.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `GET`   | `/org/{slug}/dashboard` | Overview |
//! | `GET`   | `/org/{slug}/dashboard/reports` | |
//! | `GET`   | `/org/{slug}/dashboard/calendar` | `?month=YYYY-MM` |
//! | `PATCH` | `/org/{slug}/dashboard/settings/organization` | Admin only |
//! | `PATCH` | `/org/{slug}/dashboard/settings/profile` | Own name |

use axum::{
  Json,
  extract::{Query, State},
};
use chrono::Utc;
use clienthub_core::{
  Error as DomainError,
  organization::Organization,
  profile::Profile,
  report::{self, Month, Report, StatusCounts},
  request::{Request, RequestFilter},
  store::HubStore,
};
use serde::{Deserialize, Serialize};

use crate::{AppState, error::ApiError, tenant::Staff};

// ─── Overview ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Overview {
  pub organization:    Organization,
  pub profile:         Profile,
  pub stats:           StatusCounts,
  pub trial_days_left: Option<i64>,
  pub needs_attention: Vec<Request>,
  pub overdue:         Vec<Request>,
  pub requests:        Vec<Request>,
}

/// `GET /org/{slug}/dashboard`
pub async fn overview<S: HubStore>(
  State(state): State<AppState<S>>,
  Staff(ctx): Staff,
) -> Result<Json<Overview>, ApiError> {
  let requests = state
    .store
    .list_requests(ctx.scope, RequestFilter::default())
    .await
    .map_err(ApiError::store)?;

  let now = Utc::now();
  Ok(Json(Overview {
    stats: StatusCounts::tally(&requests),
    trial_days_left: ctx.organization.trial_days_left(now),
    needs_attention: report::needs_attention(&requests),
    overdue: report::overdue(&requests, now.date_naive()),
    organization: ctx.organization,
    profile: ctx.profile,
    requests,
  }))
}

// ─── Reports ─────────────────────────────────────────────────────────────────

/// `GET /org/{slug}/dashboard/reports`
pub async fn reports<S: HubStore>(
  State(state): State<AppState<S>>,
  Staff(ctx): Staff,
) -> Result<Json<Report>, ApiError> {
  let requests = state
    .store
    .list_requests(ctx.scope, RequestFilter::default())
    .await
    .map_err(ApiError::store)?;
  let clients = state
    .store
    .list_clients(ctx.scope)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(Report::build(&requests, &clients, Utc::now())))
}

// ─── Calendar ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CalendarParams {
  pub month: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Calendar {
  pub month:    String,
  pub requests: Vec<Request>,
}

/// `GET /org/{slug}/dashboard/calendar[?month=YYYY-MM]`
pub async fn calendar<S: HubStore>(
  State(state): State<AppState<S>>,
  Staff(ctx): Staff,
  Query(params): Query<CalendarParams>,
) -> Result<Json<Calendar>, ApiError> {
  let month = match params.month.as_deref() {
    Some(m) => Month::parse(m)
      .ok_or_else(|| DomainError::Validation(format!("month must be YYYY-MM, got {m:?}")))?,
    None => Month::containing(Utc::now().date_naive()),
  };

  let mut requests = state
    .store
    .list_requests(ctx.scope, RequestFilter {
      due_from: Some(month.first),
      due_before: Some(month.next_first()),
      ..Default::default()
    })
    .await
    .map_err(ApiError::store)?;
  requests.sort_by_key(|r| r.due_date);

  Ok(Json(Calendar { month: month.to_string(), requests }))
}

// ─── Settings ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RenameBody {
  pub name: String,
}

/// `PATCH /org/{slug}/dashboard/settings/organization`
pub async fn rename_organization<S: HubStore>(
  State(state): State<AppState<S>>,
  Staff(ctx): Staff,
  Json(body): Json<RenameBody>,
) -> Result<Json<Organization>, ApiError> {
  ctx.require_admin()?;
  let organization = state
    .store
    .rename_organization(ctx.scope, body.name)
    .await
    .map_err(ApiError::store)?;
  tracing::info!(organization = %organization.id, name = %organization.name, "organization renamed");
  Ok(Json(organization))
}

#[derive(Debug, Deserialize)]
pub struct ProfileBody {
  pub full_name: Option<String>,
}

/// `PATCH /org/{slug}/dashboard/settings/profile`
pub async fn update_profile<S: HubStore>(
  State(state): State<AppState<S>>,
  Staff(ctx): Staff,
  Json(body): Json<ProfileBody>,
) -> Result<Json<Profile>, ApiError> {
  let profile = state
    .store
    .update_profile_name(ctx.profile_id(), body.full_name)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(profile))
}
