//! [`SqliteStore`]: the SQLite implementation of [`HubStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use clienthub_core::{
  Entity, Error as CoreError,
  access::TenantScope,
  client::{Client, DEFAULT_COLOR, NewClient},
  comment::{Comment, CommentView, NewComment},
  lifecycle::{self, RequestStatus},
  organization::{self, Organization, Plan, SubscriptionStatus, SubscriptionUpdate},
  profile::{
    Credentials, Invitation, NewClientUser, NewRegistration, Profile, Role, normalize_email,
  },
  request::{NewRequest, Priority, Request, RequestEdit, RequestFilter},
  slug::validate_slug,
  store::HubStore,
};
use rusqlite::{Connection, OptionalExtension as _, Transaction, params};
use uuid::Uuid;

use crate::{
  Result,
  encode::{
    CLIENT_COLUMNS, COMMENT_VIEW_COLUMNS, ORGANIZATION_COLUMNS, PROFILE_COLUMNS,
    REQUEST_COLUMNS, RawClient, RawCommentView, RawOrganization, RawProfile, RawRequest,
    decode_uuid, encode_date, encode_dt, encode_uuid, now,
  },
  error::Error,
  schema::SCHEMA,
  scope::{self, ScopeParams},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A ClientHub store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` on the connection thread.
  async fn read<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }

  /// Run `f` inside one transaction on the connection thread. Any error
  /// returned by `f` rolls the whole transaction back.
  async fn write<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        match f(&tx) {
          Ok(value) => {
            tx.commit()?;
            Ok(Ok(value))
          }
          // Dropping `tx` rolls back.
          Err(e) => Ok(Err(e)),
        }
      })
      .await?
  }
}

#[cfg(test)]
impl SqliteStore {
  /// Run raw SQL against the database, for tests that need to reach past the
  /// store API (e.g. to install failing triggers).
  pub(crate) async fn execute_batch(&self, sql: &'static str) -> Result<()> {
    self.read(move |conn| Ok(conn.execute_batch(sql)?)).await
  }
}

// ─── Row helpers ─────────────────────────────────────────────────────────────

/// Map a UNIQUE violation on `column` (as `table.column`) to a domain error;
/// pass anything else through.
fn on_unique(
  e: rusqlite::Error,
  column: &str,
  domain: impl FnOnce() -> CoreError,
) -> Error {
  match &e {
    rusqlite::Error::SqliteFailure(f, Some(msg))
      if f.code == rusqlite::ErrorCode::ConstraintViolation
        && msg.starts_with("UNIQUE")
        && msg.contains(column) =>
    {
      domain().into()
    }
    _ => e.into(),
  }
}

fn organization_by_id(conn: &Connection, id: &str) -> Result<Option<RawOrganization>> {
  Ok(
    conn
      .query_row(
        &format!("SELECT {ORGANIZATION_COLUMNS} FROM organizations o WHERE o.id = ?1"),
        params![id],
        RawOrganization::from_row,
      )
      .optional()?,
  )
}

fn profile_by_id(conn: &Connection, id: &str) -> Result<Option<RawProfile>> {
  Ok(
    conn
      .query_row(
        &format!("SELECT {PROFILE_COLUMNS} FROM profiles p WHERE p.id = ?1"),
        params![id],
        RawProfile::from_row,
      )
      .optional()?,
  )
}

fn profile_by_email(conn: &Connection, email: &str) -> Result<Option<RawProfile>> {
  Ok(
    conn
      .query_row(
        &format!("SELECT {PROFILE_COLUMNS} FROM profiles p WHERE p.email = ?1"),
        params![email],
        RawProfile::from_row,
      )
      .optional()?,
  )
}

fn scoped_client(conn: &Connection, scope: &ScopeParams, id: &str) -> Result<Option<RawClient>> {
  let sql = format!(
    "SELECT {CLIENT_COLUMNS} FROM clients c WHERE {} AND c.id = ?3",
    scope::CLIENTS
  );
  Ok(
    conn
      .query_row(
        &sql,
        params![scope.organization_id, scope.client_id, id],
        RawClient::from_row,
      )
      .optional()?,
  )
}

fn scoped_request(conn: &Connection, scope: &ScopeParams, id: &str) -> Result<Option<RawRequest>> {
  let sql = format!(
    "SELECT {REQUEST_COLUMNS} FROM requests r WHERE {} AND r.id = ?3",
    scope::REQUESTS
  );
  Ok(
    conn
      .query_row(
        &sql,
        params![scope.organization_id, scope.client_id, id],
        RawRequest::from_row,
      )
      .optional()?,
  )
}

/// Load a request for writing: it must be visible to `scope` and, when a
/// version is expected, still at that version.
fn request_for_write(
  conn: &Connection,
  scope: &ScopeParams,
  id: &str,
  expected_version: Option<i64>,
) -> Result<Request> {
  let raw = scoped_request(conn, scope, id)?.ok_or(CoreError::NotFound(Entity::Request))?;
  if expected_version.is_some_and(|v| v != raw.version) {
    return Err(CoreError::VersionConflict.into());
  }
  raw.into_request()
}

/// Assignees must be staff of the request's organization.
fn check_assignee(conn: &Connection, organization_id: &str, assignee: Uuid) -> Result<()> {
  let found = conn
    .query_row(
      "SELECT 1 FROM profiles
       WHERE id = ?1 AND organization_id = ?2 AND role IN ('admin', 'team')",
      params![encode_uuid(assignee), organization_id],
      |_| Ok(()),
    )
    .optional()?;
  match found {
    Some(()) => Ok(()),
    None => Err(
      CoreError::validation("assignee must be a staff member of the organization").into(),
    ),
  }
}

fn write_status(conn: &Connection, request: &Request) -> Result<()> {
  conn.execute(
    "UPDATE requests SET status = ?2, version = ?3, updated_at = ?4 WHERE id = ?1",
    params![
      encode_uuid(request.id),
      request.status.as_ref(),
      request.version,
      encode_dt(request.updated_at),
    ],
  )?;
  Ok(())
}

fn insert_comment(
  conn: &Connection,
  request_id: Uuid,
  input: NewComment,
  at: DateTime<Utc>,
) -> Result<Comment> {
  let comment = Comment {
    id: Uuid::new_v4(),
    request_id,
    author_id: input.author_id,
    content: input.content,
    is_internal: input.is_internal,
    created_at: at,
  };
  conn.execute(
    "INSERT INTO comments (id, request_id, author_id, content, is_internal, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    params![
      encode_uuid(comment.id),
      encode_uuid(comment.request_id),
      encode_uuid(comment.author_id),
      comment.content,
      comment.is_internal,
      encode_dt(comment.created_at),
    ],
  )?;
  Ok(comment)
}

// ─── HubStore impl ───────────────────────────────────────────────────────────

impl HubStore for SqliteStore {
  type Error = Error;

  // ── Identity ──────────────────────────────────────────────────────────────

  async fn register_organization(
    &self,
    input: NewRegistration,
  ) -> Result<(Organization, Profile)> {
    validate_slug(&input.slug)?;
    let name = organization::normalize_name(&input.organization_name)?;
    let email = normalize_email(&input.email);
    let full_name = Some(input.full_name.trim().to_owned()).filter(|n| !n.is_empty());
    let slug = input.slug;
    let password_hash = input.password_hash;
    let trial_ends_at = encode_dt(input.trial_ends_at);
    let org_id = encode_uuid(Uuid::new_v4());
    let profile_id = encode_uuid(Uuid::new_v4());
    let at = encode_dt(now());

    let (org, profile) = self
      .write(move |tx| {
        tx.execute(
          "INSERT INTO organizations
             (id, name, slug, plan, subscription_status, trial_ends_at, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
          params![
            org_id,
            name,
            slug,
            Plan::Freelance.as_ref(),
            SubscriptionStatus::Trial.as_ref(),
            trial_ends_at,
            at,
          ],
        )
        .map_err(|e| on_unique(e, "organizations.slug", || CoreError::SlugTaken(slug.clone())))?;

        tx.execute(
          "INSERT INTO profiles
             (id, email, full_name, role, organization_id, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
          params![profile_id, email, full_name, Role::Admin.as_ref(), org_id, at],
        )
        .map_err(|e| on_unique(e, "profiles.email", || CoreError::EmailTaken(email.clone())))?;

        tx.execute(
          "INSERT INTO credentials (profile_id, password_hash) VALUES (?1, ?2)",
          params![profile_id, password_hash],
        )?;

        let org = organization_by_id(tx, &org_id)?
          .ok_or(CoreError::NotFound(Entity::Organization))?;
        let profile =
          profile_by_id(tx, &profile_id)?.ok_or(CoreError::NotFound(Entity::Profile))?;
        Ok((org, profile))
      })
      .await?;

    Ok((org.into_organization()?, profile.into_profile()?))
  }

  async fn slug_available(&self, slug: &str) -> Result<bool> {
    let slug = slug.to_owned();
    self
      .read(move |conn| {
        let taken = conn
          .query_row("SELECT 1 FROM organizations WHERE slug = ?1", params![slug], |_| {
            Ok(())
          })
          .optional()?;
        Ok(taken.is_none())
      })
      .await
  }

  async fn credentials_by_email(&self, email: &str) -> Result<Option<Credentials>> {
    let email = normalize_email(email);
    let raw: Option<(String, Option<String>)> = self
      .read(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT c.profile_id, c.password_hash
               FROM credentials c JOIN profiles p ON p.id = c.profile_id
               WHERE p.email = ?1",
              params![email],
              |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?,
        )
      })
      .await?;

    raw
      .map(|(id, password_hash)| {
        Ok(Credentials { profile_id: decode_uuid(&id)?, password_hash })
      })
      .transpose()
  }

  async fn get_profile(&self, profile_id: Uuid) -> Result<Option<Profile>> {
    let id = encode_uuid(profile_id);
    let raw = self.read(move |conn| profile_by_id(conn, &id)).await?;
    raw.map(RawProfile::into_profile).transpose()
  }

  async fn update_profile_name(
    &self,
    profile_id: Uuid,
    full_name: Option<String>,
  ) -> Result<Profile> {
    let id = encode_uuid(profile_id);
    let full_name = full_name.map(|n| n.trim().to_owned()).filter(|n| !n.is_empty());
    let at = encode_dt(now());

    let raw = self
      .write(move |tx| {
        let changed = tx.execute(
          "UPDATE profiles SET full_name = ?2, updated_at = ?3 WHERE id = ?1",
          params![id, full_name, at],
        )?;
        if changed == 0 {
          return Err(CoreError::NotFound(Entity::Profile).into());
        }
        Ok(profile_by_id(tx, &id)?.ok_or(CoreError::NotFound(Entity::Profile))?)
      })
      .await?;

    raw.into_profile()
  }

  async fn create_session(
    &self,
    profile_id: Uuid,
    token_hash: String,
    expires_at: DateTime<Utc>,
  ) -> Result<()> {
    let id = encode_uuid(profile_id);
    let at = encode_dt(now());
    let expires = encode_dt(expires_at);
    self
      .read(move |conn| {
        conn.execute(
          "INSERT INTO sessions (token_hash, profile_id, created_at, expires_at)
           VALUES (?1, ?2, ?3, ?4)",
          params![token_hash, id, at, expires],
        )?;
        Ok(())
      })
      .await
  }

  async fn profile_for_session(
    &self,
    token_hash: String,
    now: DateTime<Utc>,
  ) -> Result<Option<Profile>> {
    let now = encode_dt(now);
    let raw = self
      .read(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {PROFILE_COLUMNS}
                 FROM sessions s JOIN profiles p ON p.id = s.profile_id
                 WHERE s.token_hash = ?1 AND s.expires_at > ?2"
              ),
              params![token_hash, now],
              RawProfile::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawProfile::into_profile).transpose()
  }

  async fn revoke_session(&self, token_hash: String) -> Result<()> {
    self
      .read(move |conn| {
        conn.execute("DELETE FROM sessions WHERE token_hash = ?1", params![token_hash])?;
        Ok(())
      })
      .await
  }

  async fn create_magic_link(
    &self,
    profile_id: Uuid,
    token_hash: String,
    expires_at: DateTime<Utc>,
  ) -> Result<()> {
    let id = encode_uuid(profile_id);
    let at = encode_dt(now());
    let expires = encode_dt(expires_at);
    self
      .read(move |conn| {
        conn.execute(
          "INSERT INTO magic_links (token_hash, profile_id, created_at, expires_at)
           VALUES (?1, ?2, ?3, ?4)",
          params![token_hash, id, at, expires],
        )?;
        Ok(())
      })
      .await
  }

  async fn consume_magic_link(
    &self,
    token_hash: String,
    now: DateTime<Utc>,
  ) -> Result<Option<Uuid>> {
    let now = encode_dt(now);
    // A single UPDATE both checks and marks the link, so two concurrent
    // verifications cannot both succeed.
    let id: Option<String> = self
      .read(move |conn| {
        Ok(
          conn
            .query_row(
              "UPDATE magic_links SET consumed_at = ?2
               WHERE token_hash = ?1 AND consumed_at IS NULL AND expires_at > ?2
               RETURNING profile_id",
              params![token_hash, now],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    id.as_deref().map(decode_uuid).transpose()
  }

  // ── Organizations ─────────────────────────────────────────────────────────

  async fn organization_by_slug(&self, slug: &str) -> Result<Option<Organization>> {
    let slug = slug.to_owned();
    let raw = self
      .read(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {ORGANIZATION_COLUMNS} FROM organizations o WHERE o.slug = ?1"),
              params![slug],
              RawOrganization::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawOrganization::into_organization).transpose()
  }

  async fn get_organization(&self, organization_id: Uuid) -> Result<Option<Organization>> {
    let id = encode_uuid(organization_id);
    let raw = self.read(move |conn| organization_by_id(conn, &id)).await?;
    raw.map(RawOrganization::into_organization).transpose()
  }

  async fn client_organization(&self, client_id: Uuid) -> Result<Option<Uuid>> {
    let id = encode_uuid(client_id);
    let org: Option<String> = self
      .read(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT organization_id FROM clients WHERE id = ?1",
              params![id],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    org.as_deref().map(decode_uuid).transpose()
  }

  async fn rename_organization(&self, scope: TenantScope, name: String) -> Result<Organization> {
    let id = encode_uuid(scope.require_staff()?);
    let name = organization::normalize_name(&name)?;
    let at = encode_dt(now());

    let raw = self
      .write(move |tx| {
        tx.execute(
          "UPDATE organizations SET name = ?2, updated_at = ?3 WHERE id = ?1",
          params![id, name, at],
        )?;
        Ok(organization_by_id(tx, &id)?.ok_or(CoreError::NotFound(Entity::Organization))?)
      })
      .await?;

    raw.into_organization()
  }

  async fn update_subscription(
    &self,
    organization_id: Uuid,
    update: SubscriptionUpdate,
  ) -> Result<Organization> {
    let id = encode_uuid(organization_id);
    let plan = update.plan.map(|p| p.as_ref().to_owned());
    let status = update.subscription_status.map(|s| s.as_ref().to_owned());
    let (set_trial, trial_ends_at) = match update.trial_ends_at {
      Some(t) => (true, t.map(encode_dt)),
      None => (false, None),
    };
    let at = encode_dt(now());

    let raw = self
      .write(move |tx| {
        tx.execute(
          "UPDATE organizations SET
             plan                = COALESCE(?2, plan),
             subscription_status = COALESCE(?3, subscription_status),
             trial_ends_at       = CASE WHEN ?4 THEN ?5 ELSE trial_ends_at END,
             updated_at          = ?6
           WHERE id = ?1",
          params![id, plan, status, set_trial, trial_ends_at, at],
        )?;
        Ok(organization_by_id(tx, &id)?.ok_or(CoreError::NotFound(Entity::Organization))?)
      })
      .await?;

    raw.into_organization()
  }

  // ── Clients ───────────────────────────────────────────────────────────────

  async fn create_client(&self, scope: TenantScope, input: NewClient) -> Result<Client> {
    let organization_id = scope.require_staff()?;
    let input = input.normalized()?;
    let at = now();

    let client = Client {
      id: Uuid::new_v4(),
      organization_id,
      name: input.name,
      color: input.color.unwrap_or_else(|| DEFAULT_COLOR.to_owned()),
      contact_name: input.contact_name,
      contact_email: input.contact_email,
      contact_phone: input.contact_phone,
      logo_url: None,
      created_at: at,
      updated_at: at,
    };

    let row = client.clone();
    self
      .read(move |conn| {
        conn.execute(
          "INSERT INTO clients
             (id, organization_id, name, color, contact_name, contact_email,
              contact_phone, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
          params![
            encode_uuid(row.id),
            encode_uuid(row.organization_id),
            row.name,
            row.color,
            row.contact_name,
            row.contact_email,
            row.contact_phone,
            encode_dt(row.created_at),
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(client)
  }

  async fn list_clients(&self, scope: TenantScope) -> Result<Vec<Client>> {
    let scope = ScopeParams::from(scope);
    let raws: Vec<RawClient> = self
      .read(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {CLIENT_COLUMNS} FROM clients c WHERE {}
           ORDER BY c.name COLLATE NOCASE, c.created_at",
          scope::CLIENTS
        ))?;
        let rows = stmt
          .query_map(params![scope.organization_id, scope.client_id], RawClient::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawClient::into_client).collect()
  }

  async fn get_client(&self, scope: TenantScope, client_id: Uuid) -> Result<Option<Client>> {
    let scope = ScopeParams::from(scope);
    let id = encode_uuid(client_id);
    let raw = self.read(move |conn| scoped_client(conn, &scope, &id)).await?;
    raw.map(RawClient::into_client).transpose()
  }

  async fn invite_client_user(
    &self,
    scope: TenantScope,
    input: NewClientUser,
  ) -> Result<Invitation> {
    let organization_id = scope.require_staff()?;
    let email = normalize_email(&input.email);
    if !email.contains('@') {
      return Err(CoreError::validation("a valid email is required").into());
    }
    let at = now();
    let profile = Profile {
      id: Uuid::new_v4(),
      email,
      full_name: input.full_name.map(|n| n.trim().to_owned()).filter(|n| !n.is_empty()),
      role: Role::Client,
      organization_id: None,
      client_id: Some(input.client_id),
      created_at: at,
      updated_at: at,
    };

    let scope = ScopeParams::from(TenantScope::Organization { organization_id });
    let row = profile.clone();
    let existing = self
      .write(move |tx| {
        let client_id = encode_uuid(input.client_id);
        scoped_client(tx, &scope, &client_id)?.ok_or(CoreError::NotFound(Entity::Client))?;

        let id = encode_uuid(row.id);
        let inserted = tx.execute(
          "INSERT INTO profiles (id, email, full_name, role, client_id, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
          params![
            id,
            row.email,
            row.full_name,
            Role::Client.as_ref(),
            client_id,
            encode_dt(row.created_at),
          ],
        );
        if let Err(e) = inserted {
          let e = on_unique(e, "profiles.email", || CoreError::EmailTaken(row.email.clone()));
          if !matches!(e, Error::Core(CoreError::EmailTaken(_))) {
            return Err(e);
          }
          // Re-inviting a user of the same client hands back that profile.
          return match profile_by_email(tx, &row.email)? {
            Some(p)
              if p.role == Role::Client.as_ref()
                && p.client_id.as_deref() == Some(client_id.as_str()) =>
            {
              Ok(Some(p))
            }
            _ => Err(e),
          };
        }
        tx.execute(
          "INSERT INTO credentials (profile_id, password_hash) VALUES (?1, NULL)",
          params![id],
        )?;
        Ok(None)
      })
      .await?;

    match existing {
      Some(raw) => Ok(Invitation { profile: raw.into_profile()?, created: false }),
      None => Ok(Invitation { profile, created: true }),
    }
  }

  // ── Requests ──────────────────────────────────────────────────────────────

  async fn create_request(&self, scope: TenantScope, input: NewRequest) -> Result<Request> {
    let mut input = input.normalized()?;
    if let TenantScope::Client { client_id, .. } = scope {
      input.client_id = client_id;
      input.priority = Priority::default();
      input.assigned_to = None;
    }

    let at = now();
    let request = Request {
      id:              Uuid::new_v4(),
      organization_id: scope.organization_id(),
      client_id:       input.client_id,
      title:           input.title,
      description:     input.description,
      kind:            input.kind,
      status:          RequestStatus::New,
      priority:        input.priority,
      due_date:        input.due_date,
      created_by:      input.created_by,
      assigned_to:     input.assigned_to,
      version:         1,
      created_at:      at,
      updated_at:      at,
    };

    let scope = ScopeParams::from(scope);
    let row = request.clone();
    self
      .write(move |tx| {
        // The client must be visible to the scope; the request takes the
        // scope's organization, which is therefore the client's.
        let client_id = encode_uuid(row.client_id);
        scoped_client(tx, &scope, &client_id)?.ok_or(CoreError::NotFound(Entity::Client))?;
        if let Some(assignee) = row.assigned_to {
          check_assignee(tx, &scope.organization_id, assignee)?;
        }

        tx.execute(
          "INSERT INTO requests
             (id, organization_id, client_id, title, description, type, status,
              priority, due_date, created_by, assigned_to, version, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
          params![
            encode_uuid(row.id),
            scope.organization_id,
            client_id,
            row.title,
            row.description,
            row.kind,
            row.status.as_ref(),
            row.priority.as_ref(),
            row.due_date.map(encode_date),
            encode_uuid(row.created_by),
            row.assigned_to.map(encode_uuid),
            row.version,
            encode_dt(row.created_at),
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(request)
  }

  async fn list_requests(
    &self,
    scope: TenantScope,
    filter: RequestFilter,
  ) -> Result<Vec<Request>> {
    let scope = ScopeParams::from(scope);
    let status = filter.status.map(|s| s.as_ref().to_owned());
    let client_id = filter.client_id.map(encode_uuid);
    let due_from = filter.due_from.map(encode_date);
    let due_before = filter.due_before.map(encode_date);
    let open_only = filter.open_only;

    let raws: Vec<RawRequest> = self
      .read(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {REQUEST_COLUMNS} FROM requests r
           WHERE {}
             AND (?3 IS NULL OR r.status = ?3)
             AND (?4 = 0 OR r.status NOT IN (?8, ?9))
             AND (?5 IS NULL OR r.client_id = ?5)
             AND (?6 IS NULL OR r.due_date >= ?6)
             AND (?7 IS NULL OR r.due_date < ?7)
           ORDER BY r.created_at DESC, r.rowid DESC",
          scope::REQUESTS
        ))?;
        let rows = stmt
          .query_map(
            params![
              scope.organization_id,
              scope.client_id,
              status,
              open_only,
              client_id,
              due_from,
              due_before,
              RequestStatus::Approved.as_ref(),
              RequestStatus::Completed.as_ref(),
            ],
            RawRequest::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRequest::into_request).collect()
  }

  async fn get_request(&self, scope: TenantScope, request_id: Uuid) -> Result<Option<Request>> {
    let scope = ScopeParams::from(scope);
    let id = encode_uuid(request_id);
    let raw = self.read(move |conn| scoped_request(conn, &scope, &id)).await?;
    raw.map(RawRequest::into_request).transpose()
  }

  async fn edit_request(
    &self,
    scope: TenantScope,
    request_id: Uuid,
    edit: RequestEdit,
    expected_version: Option<i64>,
  ) -> Result<Request> {
    scope.require_staff()?;
    let edit = edit.normalized()?;
    if edit.is_empty() {
      return Err(CoreError::validation("nothing to change").into());
    }

    let scope = ScopeParams::from(scope);
    let id = encode_uuid(request_id);
    self
      .write(move |tx| {
        let mut request = request_for_write(tx, &scope, &id, expected_version)?;
        if let Some(Some(assignee)) = edit.assigned_to {
          check_assignee(tx, &scope.organization_id, assignee)?;
        }
        edit.apply(&mut request);
        request.version += 1;
        request.updated_at = now();

        tx.execute(
          "UPDATE requests SET
             title = ?2, description = ?3, type = ?4, priority = ?5, due_date = ?6,
             assigned_to = ?7, version = ?8, updated_at = ?9
           WHERE id = ?1",
          params![
            id,
            request.title,
            request.description,
            request.kind,
            request.priority.as_ref(),
            request.due_date.map(encode_date),
            request.assigned_to.map(encode_uuid),
            request.version,
            encode_dt(request.updated_at),
          ],
        )?;
        Ok(request)
      })
      .await
  }

  async fn transition_request(
    &self,
    scope: TenantScope,
    request_id: Uuid,
    to: RequestStatus,
    expected_version: Option<i64>,
  ) -> Result<Request> {
    if to == RequestStatus::ChangesRequested {
      return Err(
        CoreError::validation("changes can only be requested together with a comment").into(),
      );
    }

    let actor = scope.actor();
    let scope = ScopeParams::from(scope);
    let id = encode_uuid(request_id);
    self
      .write(move |tx| {
        let mut request = request_for_write(tx, &scope, &id, expected_version)?;
        lifecycle::check_transition(request.status, to, actor)?;
        request.status = to;
        request.version += 1;
        request.updated_at = now();
        write_status(tx, &request)?;
        Ok(request)
      })
      .await
  }

  async fn request_changes(
    &self,
    scope: TenantScope,
    request_id: Uuid,
    comment: NewComment,
  ) -> Result<(Request, Comment)> {
    let mut comment = comment.normalized()?;
    comment.is_internal = false;

    let actor = scope.actor();
    let scope = ScopeParams::from(scope);
    let id = encode_uuid(request_id);
    self
      .write(move |tx| {
        let mut request = request_for_write(tx, &scope, &id, None)?;
        lifecycle::check_transition(request.status, RequestStatus::ChangesRequested, actor)?;
        request.status = RequestStatus::ChangesRequested;
        request.version += 1;
        request.updated_at = now();
        write_status(tx, &request)?;

        let comment = insert_comment(tx, request.id, comment, request.updated_at)?;
        Ok((request, comment))
      })
      .await
  }

  // ── Comments ──────────────────────────────────────────────────────────────

  async fn add_comment(
    &self,
    scope: TenantScope,
    request_id: Uuid,
    comment: NewComment,
  ) -> Result<Comment> {
    let comment = comment.normalized()?;
    if comment.is_internal && scope.client_id().is_some() {
      return Err(CoreError::validation("clients cannot post internal comments").into());
    }

    let scope = ScopeParams::from(scope);
    let id = encode_uuid(request_id);
    self
      .write(move |tx| {
        scoped_request(tx, &scope, &id)?.ok_or(CoreError::NotFound(Entity::Request))?;
        insert_comment(tx, request_id, comment, now())
      })
      .await
  }

  async fn list_comments(
    &self,
    scope: TenantScope,
    request_id: Uuid,
  ) -> Result<Vec<CommentView>> {
    let scope = ScopeParams::from(scope);
    let id = encode_uuid(request_id);

    let raws: Vec<RawCommentView> = self
      .read(move |conn| {
        scoped_request(conn, &scope, &id)?.ok_or(CoreError::NotFound(Entity::Request))?;

        let mut stmt = conn.prepare(&format!(
          "SELECT {COMMENT_VIEW_COLUMNS}
           FROM comments m
           JOIN requests r ON r.id = m.request_id
           JOIN profiles p ON p.id = m.author_id
           WHERE {} AND {} AND m.request_id = ?3
           ORDER BY m.seq",
          scope::REQUESTS,
          scope::COMMENTS
        ))?;
        let rows = stmt
          .query_map(
            params![scope.organization_id, scope.client_id, id],
            RawCommentView::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCommentView::into_view).collect()
  }
}
