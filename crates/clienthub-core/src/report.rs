//! Read-model maths for the dashboard and portal.
//!
//! Everything here is computed from request lists already filtered by tenant
//! scope; nothing in this module touches storage.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{client::Client, lifecycle::RequestStatus, request::Request};

/// Headline counts. `completed` includes `approved`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
  pub total:       usize,
  pub new:         usize,
  pub in_progress: usize,
  pub review:      usize,
  pub completed:   usize,
}

impl StatusCounts {
  pub fn tally<'a>(requests: impl IntoIterator<Item = &'a Request>) -> Self {
    let mut counts = Self::default();
    for r in requests {
      counts.total += 1;
      match r.status {
        RequestStatus::New => counts.new += 1,
        RequestStatus::InProgress => counts.in_progress += 1,
        RequestStatus::Review => counts.review += 1,
        s if s.is_closed() => counts.completed += 1,
        _ => {}
      }
    }
    counts
  }
}

/// Requests that call for staff action, in the order given.
pub fn needs_attention(requests: &[Request]) -> Vec<Request> {
  requests
    .iter()
    .filter(|r| r.status.needs_attention())
    .cloned()
    .collect()
}

/// Open requests past their due date, in the order given.
pub fn overdue(requests: &[Request], today: NaiveDate) -> Vec<Request> {
  requests.iter().filter(|r| r.is_overdue(today)).cloned().collect()
}

/// Rounded percentage of closed requests; zero for an empty list.
pub fn completion_rate(counts: &StatusCounts) -> u32 {
  if counts.total == 0 {
    return 0;
  }
  ((counts.completed as f64 / counts.total as f64) * 100.0).round() as u32
}

// ─── Reports ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeCount {
  #[serde(rename = "type")]
  pub kind:  String,
  pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientCount {
  pub client_id: Uuid,
  pub name:      String,
  pub color:     String,
  pub requests:  usize,
  pub completed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonthCounts {
  pub created:   usize,
  pub completed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
  pub totals:          StatusCounts,
  pub completion_rate: u32,
  pub overdue:         usize,
  pub by_type:         Vec<TypeCount>,
  pub by_client:       Vec<ClientCount>,
  pub this_month:      MonthCounts,
}

impl Report {
  pub fn build(requests: &[Request], clients: &[Client], now: DateTime<Utc>) -> Self {
    let today = now.date_naive();
    let totals = StatusCounts::tally(requests);

    let mut types: BTreeMap<&str, usize> = BTreeMap::new();
    for r in requests {
      *types.entry(r.kind.as_str()).or_default() += 1;
    }
    let mut by_type: Vec<TypeCount> = types
      .into_iter()
      .map(|(kind, count)| TypeCount { kind: kind.to_owned(), count })
      .collect();
    // Stable sort keeps the alphabetical order among equal counts.
    by_type.sort_by(|a, b| b.count.cmp(&a.count));

    let mut by_client: Vec<ClientCount> = clients
      .iter()
      .map(|c| {
        let own = requests.iter().filter(|r| r.client_id == c.id);
        let (n, done) = own.fold((0, 0), |(n, done), r| {
          (n + 1, done + usize::from(r.status.is_closed()))
        });
        ClientCount {
          client_id: c.id,
          name:      c.name.clone(),
          color:     c.color.clone(),
          requests:  n,
          completed: done,
        }
      })
      .collect();
    by_client.sort_by(|a, b| b.requests.cmp(&a.requests));

    let month_start = NaiveDate::from_ymd_opt(today.year(), today.month(), 1);
    let this_month = requests
      .iter()
      .filter(|r| month_start.is_some_and(|start| r.created_at.date_naive() >= start))
      .fold(MonthCounts::default(), |mut m, r| {
        m.created += 1;
        m.completed += usize::from(r.status.is_closed());
        m
      });

    Self {
      completion_rate: completion_rate(&totals),
      overdue: requests.iter().filter(|r| r.is_overdue(today)).count(),
      totals,
      by_type,
      by_client,
      this_month,
    }
  }
}

// ─── Calendar ────────────────────────────────────────────────────────────────

/// A calendar month, parsed from `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Month {
  pub first: NaiveDate,
}

impl Month {
  pub fn containing(date: NaiveDate) -> Self {
    // Day 1 exists in every month.
    Self { first: date.with_day(1).unwrap_or(date) }
  }

  pub fn parse(s: &str) -> Option<Self> {
    let (y, m) = s.split_once('-')?;
    if y.len() != 4 || m.len() != 2 {
      return None;
    }
    let first = NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, 1)?;
    Some(Self { first })
  }

  /// First day of the following month; the exclusive upper bound.
  pub fn next_first(&self) -> NaiveDate {
    let (y, m) = if self.first.month() == 12 {
      (self.first.year() + 1, 1)
    } else {
      (self.first.year(), self.first.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1).unwrap_or(NaiveDate::MAX)
  }
}

impl std::fmt::Display for Month {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.first.format("%Y-%m"))
  }
}

// ─── Portal ──────────────────────────────────────────────────────────────────

/// Counts shown on the portal home.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PortalCounts {
  /// Waiting on the client's decision.
  pub pending: usize,
  pub active:  usize,
}

impl PortalCounts {
  pub fn tally(requests: &[Request]) -> Self {
    Self {
      pending: requests.iter().filter(|r| r.status == RequestStatus::Review).count(),
      active:  requests.iter().filter(|r| !r.status.is_closed()).count(),
    }
  }
}
