//! Tenant filtering.
//!
//! Every tenant-filtered query binds the scope as its first two positional
//! parameters and uses the fragments below against fixed table aliases
//! (`r` for requests, `c` for clients, `m` for comments). No other code in
//! the crate writes a tenant condition.

use clienthub_core::access::TenantScope;

use crate::encode::encode_uuid;

/// Requests visible to the scope.
pub const REQUESTS: &str = "r.organization_id = ?1 AND (?2 IS NULL OR r.client_id = ?2)";

/// Clients visible to the scope.
pub const CLIENTS: &str = "c.organization_id = ?1 AND (?2 IS NULL OR c.id = ?2)";

/// Internal comments are only visible without a client restriction.
pub const COMMENTS: &str = "(?2 IS NULL OR m.is_internal = 0)";

/// The values bound to `?1` and `?2`.
#[derive(Debug, Clone)]
pub struct ScopeParams {
  pub organization_id: String,
  pub client_id:       Option<String>,
}

impl From<TenantScope> for ScopeParams {
  fn from(scope: TenantScope) -> Self {
    Self {
      organization_id: encode_uuid(scope.organization_id()),
      client_id:       scope.client_id().map(encode_uuid),
    }
  }
}
