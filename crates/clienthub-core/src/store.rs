//! The `HubStore` trait.
//!
//! The trait is implemented by storage backends (e.g.
//! `clienthub-store-sqlite`). Higher layers depend on this abstraction, not
//! on any concrete backend.
//!
//! Every method that touches tenant data takes a [`TenantScope`]. Backends
//! derive all tenant filtering from it, so a caller holding a scope for one
//! organization cannot reach rows of another, and a client-scoped caller
//! cannot reach other clients' requests or internal comments.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  Error,
  access::TenantScope,
  client::{Client, NewClient},
  comment::{Comment, CommentView, NewComment},
  lifecycle::RequestStatus,
  organization::{Organization, SubscriptionUpdate},
  profile::{Credentials, Invitation, NewClientUser, NewRegistration, Profile},
  request::{NewRequest, Request, RequestEdit, RequestFilter},
};

/// Implemented by backend error types so callers can tell domain failures
/// (not found, slug taken, rejected transition, ...) apart from storage
/// failures without knowing the backend.
pub trait BackendError: std::error::Error + Send + Sync + 'static {
  /// The domain failure carried by this error, or the error itself when it
  /// is a storage failure.
  fn into_domain(self) -> Result<Error, Self>
  where
    Self: Sized;
}

/// Abstraction over a ClientHub storage backend.
///
/// Multi-step writes (registration, transitions, requesting changes) are
/// atomic: they either apply completely or not at all.
pub trait HubStore: Send + Sync {
  type Error: BackendError + From<Error>;

  // ── Identity ──────────────────────────────────────────────────────────

  /// Create the admin profile, its credentials and the organization in one
  /// transaction. Fails with [`Error::SlugTaken`] or [`Error::EmailTaken`]
  /// when a uniqueness constraint rejects the insert.
  fn register_organization(
    &self,
    input: NewRegistration,
  ) -> impl Future<Output = Result<(Organization, Profile), Self::Error>> + Send + '_;

  /// Advisory availability check. The UNIQUE constraint applied by
  /// [`HubStore::register_organization`] remains the authority.
  fn slug_available<'a>(
    &'a self,
    slug: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  fn credentials_by_email<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<Credentials>, Self::Error>> + Send + 'a;

  fn get_profile(
    &self,
    profile_id: Uuid,
  ) -> impl Future<Output = Result<Option<Profile>, Self::Error>> + Send + '_;

  fn update_profile_name(
    &self,
    profile_id: Uuid,
    full_name: Option<String>,
  ) -> impl Future<Output = Result<Profile, Self::Error>> + Send + '_;

  /// Persist a session. Only the token's hash is ever stored.
  fn create_session(
    &self,
    profile_id: Uuid,
    token_hash: String,
    expires_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The profile owning an unexpired session, if any.
  fn profile_for_session(
    &self,
    token_hash: String,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Profile>, Self::Error>> + Send + '_;

  fn revoke_session(
    &self,
    token_hash: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn create_magic_link(
    &self,
    profile_id: Uuid,
    token_hash: String,
    expires_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Mark a magic link used and return its profile. A link can be consumed
  /// once; expired or already-used links yield `None`.
  fn consume_magic_link(
    &self,
    token_hash: String,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Uuid>, Self::Error>> + Send + '_;

  // ── Organizations ─────────────────────────────────────────────────────

  fn organization_by_slug<'a>(
    &'a self,
    slug: &'a str,
  ) -> impl Future<Output = Result<Option<Organization>, Self::Error>> + Send + 'a;

  fn get_organization(
    &self,
    organization_id: Uuid,
  ) -> impl Future<Output = Result<Option<Organization>, Self::Error>> + Send + '_;

  /// The organization owning `client_id`. Used while resolving access,
  /// before any scope exists.
  fn client_organization(
    &self,
    client_id: Uuid,
  ) -> impl Future<Output = Result<Option<Uuid>, Self::Error>> + Send + '_;

  /// Rename the scope's organization. Staff scope only.
  fn rename_organization(
    &self,
    scope: TenantScope,
    name: String,
  ) -> impl Future<Output = Result<Organization, Self::Error>> + Send + '_;

  /// Operator-level billing change, addressed by organization id.
  fn update_subscription(
    &self,
    organization_id: Uuid,
    update: SubscriptionUpdate,
  ) -> impl Future<Output = Result<Organization, Self::Error>> + Send + '_;

  // ── Clients ───────────────────────────────────────────────────────────

  /// Staff scope only.
  fn create_client(
    &self,
    scope: TenantScope,
    input: NewClient,
  ) -> impl Future<Output = Result<Client, Self::Error>> + Send + '_;

  /// Clients visible to `scope`, ordered by name.
  fn list_clients(
    &self,
    scope: TenantScope,
  ) -> impl Future<Output = Result<Vec<Client>, Self::Error>> + Send + '_;

  fn get_client(
    &self,
    scope: TenantScope,
    client_id: Uuid,
  ) -> impl Future<Output = Result<Option<Client>, Self::Error>> + Send + '_;

  /// Create a client-role profile (no password) for a client of the
  /// scope's organization. Staff scope only. Inviting an email that already
  /// belongs to a user of the same client returns that profile; any other
  /// owner of the email fails with [`Error::EmailTaken`].
  fn invite_client_user(
    &self,
    scope: TenantScope,
    input: NewClientUser,
  ) -> impl Future<Output = Result<Invitation, Self::Error>> + Send + '_;

  // ── Requests ──────────────────────────────────────────────────────────

  /// Create a request in status `new`. The client must belong to the
  /// scope's organization; the request inherits that organization.
  fn create_request(
    &self,
    scope: TenantScope,
    input: NewRequest,
  ) -> impl Future<Output = Result<Request, Self::Error>> + Send + '_;

  /// Requests visible to `scope`, newest first.
  fn list_requests(
    &self,
    scope: TenantScope,
    filter: RequestFilter,
  ) -> impl Future<Output = Result<Vec<Request>, Self::Error>> + Send + '_;

  fn get_request(
    &self,
    scope: TenantScope,
    request_id: Uuid,
  ) -> impl Future<Output = Result<Option<Request>, Self::Error>> + Send + '_;

  /// Apply a staff edit. With `expected_version` set, fails with
  /// [`Error::VersionConflict`] if the request has moved on.
  fn edit_request(
    &self,
    scope: TenantScope,
    request_id: Uuid,
    edit: RequestEdit,
    expected_version: Option<i64>,
  ) -> impl Future<Output = Result<Request, Self::Error>> + Send + '_;

  /// Move a request to `to`, checked against the lifecycle edge table with
  /// the actor implied by `scope`.
  fn transition_request(
    &self,
    scope: TenantScope,
    request_id: Uuid,
    to: RequestStatus,
    expected_version: Option<i64>,
  ) -> impl Future<Output = Result<Request, Self::Error>> + Send + '_;

  /// `review → changes_requested` together with the comment explaining it,
  /// atomically.
  fn request_changes(
    &self,
    scope: TenantScope,
    request_id: Uuid,
    comment: NewComment,
  ) -> impl Future<Output = Result<(Request, Comment), Self::Error>> + Send + '_;

  // ── Comments ──────────────────────────────────────────────────────────

  /// Append a comment. Client-scoped callers cannot post internal comments.
  fn add_comment(
    &self,
    scope: TenantScope,
    request_id: Uuid,
    comment: NewComment,
  ) -> impl Future<Output = Result<Comment, Self::Error>> + Send + '_;

  /// The conversation on a request in creation order. Internal comments are
  /// excluded for client-scoped callers.
  fn list_comments(
    &self,
    scope: TenantScope,
    request_id: Uuid,
  ) -> impl Future<Output = Result<Vec<CommentView>, Self::Error>> + Send + '_;
}
