//! Clients, the customers of an organization.
//!
//! Not to be confused with a profile whose role is `client`; such a profile
//! points at one of these records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Colour assigned when none is given.
pub const DEFAULT_COLOR: &str = "#10b981";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
  pub id:              Uuid,
  pub organization_id: Uuid,
  pub name:            String,
  /// `#rrggbb` badge colour.
  pub color:           String,
  pub contact_name:    Option<String>,
  pub contact_email:   Option<String>,
  pub contact_phone:   Option<String>,
  pub logo_url:        Option<String>,
  pub created_at:      DateTime<Utc>,
  pub updated_at:      DateTime<Utc>,
}

/// Input to [`crate::store::HubStore::create_client`]. The organization comes
/// from the caller's scope, never from here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewClient {
  pub name:          String,
  pub color:         Option<String>,
  pub contact_name:  Option<String>,
  pub contact_email: Option<String>,
  pub contact_phone: Option<String>,
}

impl NewClient {
  /// Trim every field, drop blank optionals and check what is left.
  pub fn normalized(self) -> Result<Self> {
    let name = self.name.trim().to_owned();
    if name.is_empty() {
      return Err(Error::validation("client name must not be empty"));
    }
    let color = match blank_to_none(self.color) {
      Some(c) if is_hex_color(&c) => Some(c.to_lowercase()),
      Some(c) => return Err(Error::Validation(format!("invalid colour {c:?}"))),
      None => None,
    };
    Ok(Self {
      name,
      color,
      contact_name: blank_to_none(self.contact_name),
      contact_email: blank_to_none(self.contact_email),
      contact_phone: blank_to_none(self.contact_phone),
    })
  }
}

pub(crate) fn blank_to_none(s: Option<String>) -> Option<String> {
  s.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty())
}

fn is_hex_color(s: &str) -> bool {
  s.len() == 7
    && s.starts_with('#')
    && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}
