//! Organizations, the tenants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Billing plan.
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
pub enum Plan {
  #[default]
  Freelance,
  Business,
  Agency,
}

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
pub enum SubscriptionStatus {
  #[default]
  Trial,
  Active,
  Expired,
  Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
  pub id:                  Uuid,
  pub name:                String,
  /// Globally unique; never changes after creation.
  pub slug:                String,
  pub plan:                Plan,
  pub subscription_status: SubscriptionStatus,
  pub trial_ends_at:       Option<DateTime<Utc>>,
  pub logo_url:            Option<String>,
  pub created_at:          DateTime<Utc>,
  pub updated_at:          DateTime<Utc>,
}

impl Organization {
  /// True when the trial has run out without the status having moved on.
  pub fn trial_expired(&self, now: DateTime<Utc>) -> bool {
    self.subscription_status == SubscriptionStatus::Trial
      && self.trial_ends_at.is_some_and(|end| end < now)
  }

  /// Whether staff access to this tenant is blocked.
  ///
  /// `cancelled` is not blocked: it only stops renewal.
  pub fn access_blocked(&self, now: DateTime<Utc>) -> bool {
    self.subscription_status == SubscriptionStatus::Expired || self.trial_expired(now)
  }

  /// Whole days left in the trial, rounded up. `None` outside a trial or
  /// once it has run out.
  pub fn trial_days_left(&self, now: DateTime<Utc>) -> Option<i64> {
    if self.subscription_status != SubscriptionStatus::Trial {
      return None;
    }
    let remaining = self.trial_ends_at? - now;
    let secs = remaining.num_seconds();
    if secs <= 0 {
      return None;
    }
    Some((secs + 86_399) / 86_400)
  }

  pub fn block_notice(&self) -> BlockNotice {
    BlockNotice {
      organization_name:   self.name.clone(),
      slug:                self.slug.clone(),
      plan:                self.plan,
      subscription_status: self.subscription_status,
      trial_ends_at:       self.trial_ends_at,
    }
  }
}

/// Shown to staff in place of dashboard content when access is blocked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockNotice {
  pub organization_name:   String,
  pub slug:                String,
  pub plan:                Plan,
  pub subscription_status: SubscriptionStatus,
  pub trial_ends_at:       Option<DateTime<Utc>>,
}

/// Changes to billing state. Fields left `None` are kept.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionUpdate {
  pub plan:                Option<Plan>,
  pub subscription_status: Option<SubscriptionStatus>,
  pub trial_ends_at:       Option<Option<DateTime<Utc>>>,
}

/// Trim an organization name and reject blank ones.
pub fn normalize_name(name: &str) -> Result<String> {
  let name = name.trim();
  if name.is_empty() {
    return Err(Error::validation("organization name must not be empty"));
  }
  Ok(name.to_owned())
}
