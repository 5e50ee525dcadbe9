//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 UTC strings with a fixed microsecond
//! precision so that text comparison orders them correctly. Dates are stored
//! as `YYYY-MM-DD`. UUIDs are stored as hyphenated lowercase strings. Enums
//! are stored in their snake_case string form.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, SubsecRound as _, Utc};
use clienthub_core::{
  client::Client,
  comment::{Comment, CommentView},
  organization::Organization,
  profile::Profile,
  request::Request,
};
use rusqlite::Row;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// The current time at storage precision, so values written and read back
/// compare equal.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn decode_enum<T: FromStr>(column: &'static str, s: &str) -> Result<T> {
  s.parse().map_err(|_| Error::Decode { column, value: s.to_owned() })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawOrganization::from_row`], table alias `o`.
pub const ORGANIZATION_COLUMNS: &str = "o.id, o.name, o.slug, o.plan, \
   o.subscription_status, o.trial_ends_at, o.logo_url, o.created_at, o.updated_at";

/// Raw strings read directly from an `organizations` row.
pub struct RawOrganization {
  pub id:                  String,
  pub name:                String,
  pub slug:                String,
  pub plan:                String,
  pub subscription_status: String,
  pub trial_ends_at:       Option<String>,
  pub logo_url:            Option<String>,
  pub created_at:          String,
  pub updated_at:          String,
}

impl RawOrganization {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                  row.get(0)?,
      name:                row.get(1)?,
      slug:                row.get(2)?,
      plan:                row.get(3)?,
      subscription_status: row.get(4)?,
      trial_ends_at:       row.get(5)?,
      logo_url:            row.get(6)?,
      created_at:          row.get(7)?,
      updated_at:          row.get(8)?,
    })
  }

  pub fn into_organization(self) -> Result<Organization> {
    Ok(Organization {
      id:                  decode_uuid(&self.id)?,
      name:                self.name,
      slug:                self.slug,
      plan:                decode_enum("plan", &self.plan)?,
      subscription_status: decode_enum("subscription_status", &self.subscription_status)?,
      trial_ends_at:       decode_opt_dt(self.trial_ends_at)?,
      logo_url:            self.logo_url,
      created_at:          decode_dt(&self.created_at)?,
      updated_at:          decode_dt(&self.updated_at)?,
    })
  }
}

/// Column list matching [`RawProfile::from_row`], table alias `p`.
pub const PROFILE_COLUMNS: &str = "p.id, p.email, p.full_name, p.role, \
   p.organization_id, p.client_id, p.created_at, p.updated_at";

/// Raw strings read directly from a `profiles` row.
pub struct RawProfile {
  pub id:              String,
  pub email:           String,
  pub full_name:       Option<String>,
  pub role:            String,
  pub organization_id: Option<String>,
  pub client_id:       Option<String>,
  pub created_at:      String,
  pub updated_at:      String,
}

impl RawProfile {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:              row.get(0)?,
      email:           row.get(1)?,
      full_name:       row.get(2)?,
      role:            row.get(3)?,
      organization_id: row.get(4)?,
      client_id:       row.get(5)?,
      created_at:      row.get(6)?,
      updated_at:      row.get(7)?,
    })
  }

  pub fn into_profile(self) -> Result<Profile> {
    Ok(Profile {
      id:              decode_uuid(&self.id)?,
      email:           self.email,
      full_name:       self.full_name,
      role:            decode_enum("role", &self.role)?,
      organization_id: decode_opt_uuid(self.organization_id)?,
      client_id:       decode_opt_uuid(self.client_id)?,
      created_at:      decode_dt(&self.created_at)?,
      updated_at:      decode_dt(&self.updated_at)?,
    })
  }
}

/// Column list matching [`RawClient::from_row`], table alias `c`.
pub const CLIENT_COLUMNS: &str = "c.id, c.organization_id, c.name, c.color, \
   c.contact_name, c.contact_email, c.contact_phone, c.logo_url, c.created_at, \
   c.updated_at";

/// Raw strings read directly from a `clients` row.
pub struct RawClient {
  pub id:              String,
  pub organization_id: String,
  pub name:            String,
  pub color:           String,
  pub contact_name:    Option<String>,
  pub contact_email:   Option<String>,
  pub contact_phone:   Option<String>,
  pub logo_url:        Option<String>,
  pub created_at:      String,
  pub updated_at:      String,
}

impl RawClient {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:              row.get(0)?,
      organization_id: row.get(1)?,
      name:            row.get(2)?,
      color:           row.get(3)?,
      contact_name:    row.get(4)?,
      contact_email:   row.get(5)?,
      contact_phone:   row.get(6)?,
      logo_url:        row.get(7)?,
      created_at:      row.get(8)?,
      updated_at:      row.get(9)?,
    })
  }

  pub fn into_client(self) -> Result<Client> {
    Ok(Client {
      id:              decode_uuid(&self.id)?,
      organization_id: decode_uuid(&self.organization_id)?,
      name:            self.name,
      color:           self.color,
      contact_name:    self.contact_name,
      contact_email:   self.contact_email,
      contact_phone:   self.contact_phone,
      logo_url:        self.logo_url,
      created_at:      decode_dt(&self.created_at)?,
      updated_at:      decode_dt(&self.updated_at)?,
    })
  }
}

/// Column list matching [`RawRequest::from_row`], table alias `r`.
pub const REQUEST_COLUMNS: &str = "r.id, r.organization_id, r.client_id, \
   r.title, r.description, r.type, r.status, r.priority, r.due_date, \
   r.created_by, r.assigned_to, r.version, r.created_at, r.updated_at";

/// Raw strings read directly from a `requests` row.
pub struct RawRequest {
  pub id:              String,
  pub organization_id: String,
  pub client_id:       String,
  pub title:           String,
  pub description:     Option<String>,
  pub kind:            String,
  pub status:          String,
  pub priority:        String,
  pub due_date:        Option<String>,
  pub created_by:      String,
  pub assigned_to:     Option<String>,
  pub version:         i64,
  pub created_at:      String,
  pub updated_at:      String,
}

impl RawRequest {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:              row.get(0)?,
      organization_id: row.get(1)?,
      client_id:       row.get(2)?,
      title:           row.get(3)?,
      description:     row.get(4)?,
      kind:            row.get(5)?,
      status:          row.get(6)?,
      priority:        row.get(7)?,
      due_date:        row.get(8)?,
      created_by:      row.get(9)?,
      assigned_to:     row.get(10)?,
      version:         row.get(11)?,
      created_at:      row.get(12)?,
      updated_at:      row.get(13)?,
    })
  }

  pub fn into_request(self) -> Result<Request> {
    Ok(Request {
      id:              decode_uuid(&self.id)?,
      organization_id: decode_uuid(&self.organization_id)?,
      client_id:       decode_uuid(&self.client_id)?,
      title:           self.title,
      description:     self.description,
      kind:            self.kind,
      status:          decode_enum("status", &self.status)?,
      priority:        decode_enum("priority", &self.priority)?,
      due_date:        self.due_date.as_deref().map(decode_date).transpose()?,
      created_by:      decode_uuid(&self.created_by)?,
      assigned_to:     decode_opt_uuid(self.assigned_to)?,
      version:         self.version,
      created_at:      decode_dt(&self.created_at)?,
      updated_at:      decode_dt(&self.updated_at)?,
    })
  }
}

/// Column list matching [`RawCommentView::from_row`]: comment alias `m`
/// joined with its author as `p`.
pub const COMMENT_VIEW_COLUMNS: &str = "m.id, m.request_id, m.author_id, \
   m.content, m.is_internal, m.created_at, COALESCE(p.full_name, p.email), p.role";

/// Raw strings read from a `comments` row joined with its author.
pub struct RawCommentView {
  pub id:          String,
  pub request_id:  String,
  pub author_id:   String,
  pub content:     String,
  pub is_internal: bool,
  pub created_at:  String,
  pub author_name: String,
  pub author_role: String,
}

impl RawCommentView {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:          row.get(0)?,
      request_id:  row.get(1)?,
      author_id:   row.get(2)?,
      content:     row.get(3)?,
      is_internal: row.get(4)?,
      created_at:  row.get(5)?,
      author_name: row.get(6)?,
      author_role: row.get(7)?,
    })
  }

  pub fn into_view(self) -> Result<CommentView> {
    Ok(CommentView {
      comment:     Comment {
        id:          decode_uuid(&self.id)?,
        request_id:  decode_uuid(&self.request_id)?,
        author_id:   decode_uuid(&self.author_id)?,
        content:     self.content,
        is_internal: self.is_internal,
        created_at:  decode_dt(&self.created_at)?,
      },
      author_name: self.author_name,
      author_role: decode_enum("role", &self.author_role)?,
    })
  }
}
