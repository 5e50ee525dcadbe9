//! Profiles: authenticated identities and their tenant membership.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
  Admin,
  Team,
  Client,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
  pub id:              Uuid,
  pub email:           String,
  pub full_name:       Option<String>,
  pub role:            Role,
  /// Set for `admin` and `team`.
  pub organization_id: Option<Uuid>,
  /// Set for `client`.
  pub client_id:       Option<Uuid>,
  pub created_at:      DateTime<Utc>,
  pub updated_at:      DateTime<Utc>,
}

/// What a profile is a member of, once its role and foreign keys have been
/// checked against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
  Staff { organization_id: Uuid },
  Client { client_id: Uuid },
  /// Role and foreign keys disagree; such a profile authorizes nothing.
  Invalid,
}

impl Profile {
  pub fn membership(&self) -> Membership {
    match (self.role, self.organization_id, self.client_id) {
      (Role::Admin | Role::Team, Some(organization_id), None) => {
        Membership::Staff { organization_id }
      }
      (Role::Client, None, Some(client_id)) => Membership::Client { client_id },
      _ => Membership::Invalid,
    }
  }
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Everything [`crate::store::HubStore::register_organization`] writes in one
/// transaction: the admin's credentials and profile plus the organization.
#[derive(Debug, Clone)]
pub struct NewRegistration {
  pub email:             String,
  /// argon2 PHC string; hashing happens before the store is involved.
  pub password_hash:     String,
  pub full_name:         String,
  pub organization_name: String,
  pub slug:              String,
  pub trial_ends_at:     DateTime<Utc>,
}

/// A client-role login created by staff for one of their clients.
#[derive(Debug, Clone)]
pub struct NewClientUser {
  pub client_id: Uuid,
  pub email:     String,
  pub full_name: Option<String>,
}

/// The outcome of inviting a client user.
#[derive(Debug, Clone)]
pub struct Invitation {
  pub profile: Profile,
  /// `false` when the email already belonged to a user of the same client.
  pub created: bool,
}

/// Stored sign-in material for one profile.
#[derive(Debug, Clone)]
pub struct Credentials {
  pub profile_id:    Uuid,
  /// `None` for users who only sign in through magic links.
  pub password_hash: Option<String>,
}

/// Normalise an email for storage and lookup.
pub fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }
