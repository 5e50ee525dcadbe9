//! Requests, the unit of work tracked through the lifecycle.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, client::blank_to_none, lifecycle::RequestStatus};

/// Category used when the caller gives none.
pub const DEFAULT_TYPE: &str = "other";

/// Categories the product offers. `type` stays free-form; these are hints.
pub const KNOWN_TYPES: &[&str] = &[
  "design", "social", "email", "landing", "video", "branding", "ads", "other",
];

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
  Low,
  #[default]
  Medium,
  High,
  Urgent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
  pub id:              Uuid,
  pub organization_id: Uuid,
  pub client_id:       Uuid,
  pub title:           String,
  pub description:     Option<String>,
  #[serde(rename = "type")]
  pub kind:            String,
  pub status:          RequestStatus,
  pub priority:        Priority,
  pub due_date:        Option<NaiveDate>,
  pub created_by:      Uuid,
  pub assigned_to:     Option<Uuid>,
  /// Bumped on every write; the basis for optimistic concurrency.
  pub version:         i64,
  pub created_at:      DateTime<Utc>,
  pub updated_at:      DateTime<Utc>,
}

impl Request {
  /// Past its due date and not yet closed.
  pub fn is_overdue(&self, today: NaiveDate) -> bool {
    !self.status.is_closed() && self.due_date.is_some_and(|d| d < today)
  }
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Input to [`crate::store::HubStore::create_request`].
///
/// `status` always starts at `new`. For client-scoped callers the store
/// overrides `client_id` with the scope's client and `priority` with the
/// default.
#[derive(Debug, Clone)]
pub struct NewRequest {
  pub client_id:   Uuid,
  pub title:       String,
  pub description: Option<String>,
  pub kind:        String,
  pub priority:    Priority,
  pub due_date:    Option<NaiveDate>,
  pub assigned_to: Option<Uuid>,
  pub created_by:  Uuid,
}

impl NewRequest {
  pub fn normalized(mut self) -> Result<Self> {
    self.title = normalize_title(&self.title)?;
    self.description = blank_to_none(self.description);
    self.kind = normalize_kind(&self.kind);
    Ok(self)
  }
}

/// Staff edits to an existing request. `None` keeps the current value; the
/// double options clear a field when set to `Some(None)`.
#[derive(Debug, Clone, Default)]
pub struct RequestEdit {
  pub title:       Option<String>,
  pub description: Option<Option<String>>,
  pub kind:        Option<String>,
  pub priority:    Option<Priority>,
  pub due_date:    Option<Option<NaiveDate>>,
  pub assigned_to: Option<Option<Uuid>>,
}

impl RequestEdit {
  pub fn normalized(mut self) -> Result<Self> {
    if let Some(t) = self.title.as_deref() {
      self.title = Some(normalize_title(t)?);
    }
    if let Some(d) = self.description.take() {
      self.description = Some(blank_to_none(d));
    }
    if let Some(k) = self.kind.as_deref() {
      self.kind = Some(normalize_kind(k));
    }
    Ok(self)
  }

  pub fn is_empty(&self) -> bool {
    self.title.is_none()
      && self.description.is_none()
      && self.kind.is_none()
      && self.priority.is_none()
      && self.due_date.is_none()
      && self.assigned_to.is_none()
  }

  /// Apply the edit to `request` in memory.
  pub fn apply(&self, request: &mut Request) {
    if let Some(t) = &self.title {
      request.title = t.clone();
    }
    if let Some(d) = &self.description {
      request.description = d.clone();
    }
    if let Some(k) = &self.kind {
      request.kind = k.clone();
    }
    if let Some(p) = self.priority {
      request.priority = p;
    }
    if let Some(d) = self.due_date {
      request.due_date = d;
    }
    if let Some(a) = self.assigned_to {
      request.assigned_to = a;
    }
  }
}

/// Filters for [`crate::store::HubStore::list_requests`]. Tenant scoping is
/// not a filter; it always applies.
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
  pub status:     Option<RequestStatus>,
  /// Only requests that are not `approved`/`completed`.
  pub open_only:  bool,
  pub client_id:  Option<Uuid>,
  pub due_from:   Option<NaiveDate>,
  /// Exclusive.
  pub due_before: Option<NaiveDate>,
}

fn normalize_title(title: &str) -> Result<String> {
  let t = title.trim();
  if t.is_empty() {
    return Err(Error::validation("title must not be empty"));
  }
  Ok(t.to_owned())
}

fn normalize_kind(kind: &str) -> String {
  let k = kind.trim().to_lowercase();
  if k.is_empty() { DEFAULT_TYPE.to_owned() } else { k }
}
