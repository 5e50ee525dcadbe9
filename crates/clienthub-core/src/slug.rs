//! Organization slugs.
//!
//! A slug is derived from the organization name at registration and is the
//! tenant key in every URL. Uniqueness is enforced by the store; the checks
//! here are about shape only.

use unicode_normalization::{UnicodeNormalization as _, char::is_combining_mark};

use crate::{Error, Result};

pub const MIN_LEN: usize = 3;

/// Derive a URL-safe slug from free text.
///
/// Lowercases, strips diacritics, replaces every run of characters outside
/// `[a-z0-9]` with a single hyphen and trims hyphens from both ends.
pub fn slugify(name: &str) -> String {
  let mut out = String::with_capacity(name.len());
  let mut pending_hyphen = false;
  let lowered = name.to_lowercase();

  for c in lowered.as_str().nfd().filter(|c| !is_combining_mark(*c)) {
    if c.is_ascii_lowercase() || c.is_ascii_digit() {
      if pending_hyphen && !out.is_empty() {
        out.push('-');
      }
      pending_hyphen = false;
      out.push(c);
    } else {
      pending_hyphen = true;
    }
  }

  out
}

/// Check that `slug` is canonical and long enough.
pub fn validate_slug(slug: &str) -> Result<()> {
  if slug.len() < MIN_LEN {
    return Err(Error::Validation(format!(
      "slug must be at least {MIN_LEN} characters"
    )));
  }
  if slugify(slug) != slug {
    return Err(Error::validation(
      "slug may only contain lowercase letters, digits and single inner hyphens",
    ));
  }
  Ok(())
}
