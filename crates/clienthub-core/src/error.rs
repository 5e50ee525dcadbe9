//! Error types for `clienthub-core`.

use thiserror::Error;

use crate::{
  access::DenyReason,
  lifecycle::{Actor, RequestStatus},
  organization::BlockNotice,
};

/// The kind of record a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Entity {
  Organization,
  Profile,
  Client,
  Request,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("authentication required")]
  AuthRequired,

  #[error("not authorized: {reason}")]
  NotAuthorized { reason: DenyReason },

  #[error("{0} not found")]
  NotFound(Entity),

  #[error("validation failed: {0}")]
  Validation(String),

  #[error("slug {0:?} is already taken")]
  SlugTaken(String),

  #[error("email {0:?} is already registered")]
  EmailTaken(String),

  #[error("transition rejected: {actor} cannot move a request from {from} to {to}")]
  InvalidTransition {
    from:  RequestStatus,
    to:    RequestStatus,
    actor: Actor,
  },

  #[error("the request was modified by someone else")]
  VersionConflict,

  #[error("subscription for {} is no longer active", .0.organization_name)]
  SubscriptionBlocked(BlockNotice),
}

impl Error {
  pub fn validation(msg: impl Into<String>) -> Self { Self::Validation(msg.into()) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
