//! Comments, the append-only conversation on a request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, profile::Role};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
  pub id:          Uuid,
  pub request_id:  Uuid,
  pub author_id:   Uuid,
  pub content:     String,
  /// Staff-only. Never returned to client-scoped callers.
  pub is_internal: bool,
  pub created_at:  DateTime<Utc>,
}

/// A comment together with what the conversation view shows of its author.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentView {
  #[serde(flatten)]
  pub comment:     Comment,
  pub author_name: String,
  pub author_role: Role,
}

#[derive(Debug, Clone)]
pub struct NewComment {
  pub author_id:   Uuid,
  pub content:     String,
  pub is_internal: bool,
}

impl NewComment {
  pub fn new(author_id: Uuid, content: impl Into<String>) -> Self {
    Self { author_id, content: content.into(), is_internal: false }
  }

  pub fn internal(mut self) -> Self {
    self.is_internal = true;
    self
  }

  pub fn normalized(mut self) -> Result<Self> {
    let content = self.content.trim();
    if content.is_empty() {
      return Err(Error::validation("comment must not be empty"));
    }
    self.content = content.to_owned();
    Ok(self)
  }
}
