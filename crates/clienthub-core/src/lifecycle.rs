//! The request lifecycle.
//!
//! A request's status moves along a fixed set of edges. Every status write
//! goes through [`check_transition`], which is the single place the edge
//! table lives. Storage backends call it inside the write transaction so the
//! check and the write cannot be separated by another writer.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Status ──────────────────────────────────────────────────────────────────

/// Where a request stands in its lifecycle.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
  strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RequestStatus {
  New,
  InProgress,
  Review,
  ChangesRequested,
  /// Accepted by the client from `review`. Kept distinct from `completed`
  /// but counted as closed everywhere.
  Approved,
  Completed,
}

impl RequestStatus {
  /// Closed requests are excluded from overdue detection and count as
  /// finished in statistics.
  pub fn is_closed(self) -> bool { matches!(self, Self::Approved | Self::Completed) }

  /// Statuses that call for staff action.
  pub fn needs_attention(self) -> bool {
    matches!(self, Self::New | Self::ChangesRequested)
  }
}

// ─── Actor ───────────────────────────────────────────────────────────────────

/// Which side of the tenant is driving a transition.
///
/// Derived from the caller's [`TenantScope`](crate::access::TenantScope),
/// never from request input.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Actor {
  Staff,
  Client,
}

// ─── Transition table ────────────────────────────────────────────────────────

/// The allowed edges, excluding the `any → completed` staff edge which is
/// handled separately.
const EDGES: &[(RequestStatus, RequestStatus, Actor)] = {
  use RequestStatus::*;
  &[
    (New, InProgress, Actor::Staff),
    (InProgress, Review, Actor::Staff),
    (Review, Approved, Actor::Client),
    (Review, ChangesRequested, Actor::Client),
    (ChangesRequested, InProgress, Actor::Staff),
    (ChangesRequested, New, Actor::Staff),
  ]
};

/// Whether `actor` may move a request from `from` to `to`.
pub fn is_allowed(from: RequestStatus, to: RequestStatus, actor: Actor) -> bool {
  if to == RequestStatus::Completed {
    return actor == Actor::Staff && from != RequestStatus::Completed;
  }
  EDGES.iter().any(|&(f, t, a)| f == from && t == to && a == actor)
}

/// Reject any transition outside the edge table.
pub fn check_transition(
  from: RequestStatus,
  to: RequestStatus,
  actor: Actor,
) -> Result<()> {
  if is_allowed(from, to, actor) {
    Ok(())
  } else {
    Err(Error::InvalidTransition { from, to, actor })
  }
}

/// The statuses `actor` may move a request to from `from`, in lifecycle
/// order. Used to tell clients of the API which actions are on offer.
pub fn next_statuses(from: RequestStatus, actor: Actor) -> Vec<RequestStatus> {
  use strum::IntoEnumIterator as _;
  RequestStatus::iter()
    .filter(|&to| is_allowed(from, to, actor))
    .collect()
}
