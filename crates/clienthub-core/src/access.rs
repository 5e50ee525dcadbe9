//! Tenant and access resolution.
//!
//! Every tenant-facing operation starts here: the caller's profile and the
//! organization slug from the URL are turned into a [`SessionContext`], or
//! the request fails closed. The context carries the [`TenantScope`] that all
//! store reads and writes are filtered by.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  lifecycle::Actor,
  organization::Organization,
  profile::{Membership, Profile, Role},
  store::HubStore,
};

// ─── Surfaces ────────────────────────────────────────────────────────────────

/// The two front-ends over one organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
  /// Staff view of the whole organization.
  Dashboard,
  /// A client user's view of their own requests.
  Portal,
}

impl Surface {
  /// Where a caller is sent when access is refused, with the reason as an
  /// `error` query parameter when there is one.
  pub fn login_path(self, slug: &str, reason: Option<DenyReason>) -> String {
    let path = match self {
      Self::Dashboard => "/app/login".to_owned(),
      Self::Portal => format!("/org/{slug}/portal/login"),
    };
    match reason {
      Some(reason) => format!("{path}?error={reason}"),
      None => path,
    }
  }

  /// The landing page of this surface.
  pub fn home_path(self, slug: &str) -> String {
    match self {
      Self::Dashboard => format!("/org/{slug}/dashboard"),
      Self::Portal => format!("/org/{slug}/portal"),
    }
  }
}

/// Why an authenticated caller was turned away.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DenyReason {
  UnknownOrganization,
  NotStaff,
  NotClient,
  WrongOrg,
  InvalidProfile,
  /// Staff action reserved for admins.
  NotAdmin,
}

// ─── Scope ───────────────────────────────────────────────────────────────────

/// The tenant filter every store query runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantScope {
  /// Staff: all clients and requests of one organization.
  Organization { organization_id: Uuid },
  /// Portal: one client of one organization.
  Client { organization_id: Uuid, client_id: Uuid },
}

impl TenantScope {
  pub fn organization_id(&self) -> Uuid {
    match *self {
      Self::Organization { organization_id } | Self::Client { organization_id, .. } => {
        organization_id
      }
    }
  }

  pub fn client_id(&self) -> Option<Uuid> {
    match *self {
      Self::Organization { .. } => None,
      Self::Client { client_id, .. } => Some(client_id),
    }
  }

  /// The organization id, for operations reserved to staff.
  pub fn require_staff(&self) -> Result<Uuid> {
    match *self {
      Self::Organization { organization_id } => Ok(organization_id),
      Self::Client { .. } => Err(Error::NotAuthorized { reason: DenyReason::NotStaff }),
    }
  }

  /// Who a lifecycle transition made under this scope is attributed to.
  pub fn actor(&self) -> Actor {
    match self {
      Self::Organization { .. } => Actor::Staff,
      Self::Client { .. } => Actor::Client,
    }
  }
}

// ─── Context ─────────────────────────────────────────────────────────────────

/// Who is calling and within which tenant. Built once per request and passed
/// down by parameter.
#[derive(Debug, Clone)]
pub struct SessionContext {
  pub profile:      Profile,
  pub organization: Organization,
  pub scope:        TenantScope,
}

impl SessionContext {
  pub fn profile_id(&self) -> Uuid { self.profile.id }

  pub fn require_admin(&self) -> Result<()> {
    if self.profile.role == Role::Admin {
      Ok(())
    } else {
      Err(Error::NotAuthorized { reason: DenyReason::NotAdmin })
    }
  }
}

/// Decide whether `profile` may use `surface` of `organization`.
///
/// `client_organization_id` is the organization owning the profile's client,
/// when the profile is a client user; the caller looks it up.
pub fn authorize(
  profile: &Profile,
  organization: &Organization,
  client_organization_id: Option<Uuid>,
  surface: Surface,
  now: DateTime<Utc>,
) -> Result<TenantScope> {
  let deny = |reason| Err(Error::NotAuthorized { reason });

  let scope = match (profile.membership(), surface) {
    (Membership::Invalid, _) => return deny(DenyReason::InvalidProfile),
    (Membership::Staff { .. }, Surface::Portal) => return deny(DenyReason::NotClient),
    (Membership::Client { .. }, Surface::Dashboard) => return deny(DenyReason::NotStaff),
    (Membership::Staff { organization_id }, Surface::Dashboard) => {
      if organization_id != organization.id {
        return deny(DenyReason::WrongOrg);
      }
      TenantScope::Organization { organization_id }
    }
    (Membership::Client { client_id }, Surface::Portal) => {
      if client_organization_id != Some(organization.id) {
        return deny(DenyReason::WrongOrg);
      }
      TenantScope::Client { organization_id: organization.id, client_id }
    }
  };

  // Clients keep portal access when the agency's subscription lapses.
  if surface == Surface::Dashboard && organization.access_blocked(now) {
    return Err(Error::SubscriptionBlocked(organization.block_notice()));
  }

  Ok(scope)
}

/// Resolve the full [`SessionContext`] for a request against `store`.
///
/// `profile` is the signed-in profile, or `None` when no valid session was
/// presented.
pub async fn resolve<S: HubStore>(
  store: &S,
  profile: Option<Profile>,
  slug: &str,
  surface: Surface,
  now: DateTime<Utc>,
) -> Result<SessionContext, S::Error> {
  let profile = profile.ok_or(Error::AuthRequired)?;

  let organization = store
    .organization_by_slug(slug)
    .await?
    .ok_or(Error::NotAuthorized { reason: DenyReason::UnknownOrganization })?;

  let client_organization_id = match profile.membership() {
    Membership::Client { client_id } => store.client_organization(client_id).await?,
    _ => None,
  };

  let scope = authorize(&profile, &organization, client_organization_id, surface, now)
    .inspect_err(|e| {
      tracing::debug!(profile = %profile.id, slug, error = %e, "tenant access refused");
    })?;

  Ok(SessionContext { profile, organization, scope })
}

/// Where `profile` lands after signing in: the home of its surface in the
/// organization it belongs to. `None` when the profile belongs nowhere.
pub async fn home_path<S: HubStore>(
  store: &S,
  profile: &Profile,
) -> Result<Option<String>, S::Error> {
  let (surface, organization_id) = match profile.membership() {
    Membership::Staff { organization_id } => (Surface::Dashboard, Some(organization_id)),
    Membership::Client { client_id } => {
      (Surface::Portal, store.client_organization(client_id).await?)
    }
    Membership::Invalid => return Ok(None),
  };
  let organization = match organization_id {
    Some(id) => store.get_organization(id).await?,
    None => None,
  };
  Ok(organization.map(|o| surface.home_path(&o.slug)))
}
