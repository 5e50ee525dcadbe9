//! JSON HTTP API for ClientHub.
//!
//! Exposes an axum [`Router`] backed by any [`clienthub_core::store::HubStore`].
//! Every tenant route resolves its `{slug}` and the caller's session through
//! the [`tenant`] extractors before the handler runs.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = clienthub_api::router(AppState { store, config });
//! axum::serve(listener, app).await?;
//! ```

pub mod auth;
pub mod clients;
pub mod dashboard;
pub mod error;
pub mod etag;
pub mod portal;
pub mod requests;
pub mod session;
pub mod tenant;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, patch, post},
};
use chrono::Duration;
use clienthub_core::store::HubStore;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

// ─── Configuration ───────────────────────────────────────────────────────────

/// How magic links reach their recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MagicLinkDelivery {
  /// Emit the link through `tracing`.
  #[default]
  Log,
  /// Return the link in the response body. Development only.
  Response,
}

/// Runtime settings used by the handlers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub session_ttl_hours:      i64,
  pub magic_link_ttl_minutes: i64,
  pub magic_link_delivery:    MagicLinkDelivery,
  pub trial_days:             i64,
  /// Prefix of links sent out of band, e.g. `https://hub.example.com`.
  pub public_base_url:        String,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      session_ttl_hours:      24 * 7,
      magic_link_ttl_minutes: 15,
      magic_link_delivery:    MagicLinkDelivery::Log,
      trial_days:             14,
      public_base_url:        "http://localhost:8080".to_owned(),
    }
  }
}

impl ApiConfig {
  pub fn session_ttl(&self) -> Duration { Duration::hours(self.session_ttl_hours) }

  pub fn magic_link_ttl(&self) -> Duration { Duration::minutes(self.magic_link_ttl_minutes) }
}

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState<S: HubStore> {
  pub store:  Arc<S>,
  pub config: Arc<ApiConfig>,
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the full API router for `state`.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: HubStore + Clone + 'static,
{
  Router::new()
    // Identity
    .route("/app/register", post(auth::register::<S>))
    .route("/app/slug-availability", get(auth::slug_availability::<S>))
    .route("/app/login", get(auth::login_page).post(auth::login::<S>))
    .route("/app/magic-link", post(auth::request_magic_link::<S>))
    .route(
      "/app/magic-link/verify",
      get(auth::open_magic_link::<S>).post(auth::verify_magic_link::<S>),
    )
    .route("/app/logout", post(auth::logout::<S>))
    // Dashboard
    .route("/org/{slug}/dashboard", get(dashboard::overview::<S>))
    .route(
      "/org/{slug}/dashboard/requests",
      get(requests::list::<S>).post(requests::create::<S>),
    )
    .route(
      "/org/{slug}/dashboard/requests/{id}",
      get(requests::detail::<S>).patch(requests::edit::<S>),
    )
    .route("/org/{slug}/dashboard/requests/{id}/status", post(requests::set_status::<S>))
    .route("/org/{slug}/dashboard/requests/{id}/comments", post(requests::comment::<S>))
    .route(
      "/org/{slug}/dashboard/clients",
      get(clients::list::<S>).post(clients::create::<S>),
    )
    .route("/org/{slug}/dashboard/clients/{id}", get(clients::detail::<S>))
    .route("/org/{slug}/dashboard/clients/{id}/invite", post(clients::invite::<S>))
    .route("/org/{slug}/dashboard/reports", get(dashboard::reports::<S>))
    .route("/org/{slug}/dashboard/calendar", get(dashboard::calendar::<S>))
    .route(
      "/org/{slug}/dashboard/settings/organization",
      patch(dashboard::rename_organization::<S>),
    )
    .route("/org/{slug}/dashboard/settings/profile", patch(dashboard::update_profile::<S>))
    // Portal
    .route("/org/{slug}/portal/login", get(portal::login_page).post(portal::login::<S>))
    .route("/org/{slug}/portal", get(portal::home::<S>))
    .route("/org/{slug}/portal/requests", post(portal::create::<S>))
    .route("/org/{slug}/portal/requests/{id}", get(portal::detail::<S>))
    .route("/org/{slug}/portal/requests/{id}/approve", post(portal::approve::<S>))
    .route(
      "/org/{slug}/portal/requests/{id}/request-changes",
      post(portal::request_changes::<S>),
    )
    .route("/org/{slug}/portal/requests/{id}/comments", post(portal::comment::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

#[cfg(test)]
mod tests {
  use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode, header},
  };
  use chrono::Utc;
  use clienthub_core::organization::SubscriptionUpdate;
  use clienthub_store_sqlite::SqliteStore;
  use serde_json::{Value, json};
  use tower::ServiceExt as _;
  use uuid::Uuid;

  use super::*;

  struct Harness {
    app:   Router,
    store: Arc<SqliteStore>,
  }

  async fn harness() -> Harness {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let config = ApiConfig {
      magic_link_delivery: MagicLinkDelivery::Response,
      ..Default::default()
    };
    let app = router(AppState { store: store.clone(), config: Arc::new(config) });
    Harness { app, store }
  }

  fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
      builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    match body {
      Some(v) => builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&v).unwrap()))
        .unwrap(),
      None => builder.body(Body::empty()).unwrap(),
    }
  }

  async fn send(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
      Value::Null
    } else {
      serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, body)
  }

  async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
  ) -> (StatusCode, Value) {
    let (status, _, body) = send(app, request(method, uri, token, body)).await;
    (status, body)
  }

  /// The path of an issued link, relative to the configured base URL.
  fn link_path(link: &str) -> &str {
    link.strip_prefix("http://localhost:8080").unwrap()
  }

  /// The session token set by a response.
  fn session_of(headers: &HeaderMap) -> String {
    let cookie = headers[header::SET_COOKIE].to_str().unwrap();
    let (_, rest) = cookie.split_once("clienthub_session=").unwrap();
    rest.split(';').next().unwrap().to_owned()
  }

  /// An agency with one client and a signed-in client user.
  struct Agency {
    slug:         String,
    organization: Uuid,
    staff:        String,
    client:       Uuid,
    portal:       String,
  }

  async fn register(app: &Router, email: &str, name: &str) -> Value {
    let (status, body) = call(
      app,
      Method::POST,
      "/app/register",
      None,
      Some(json!({
        "email": email,
        "password": "secret123",
        "full_name": "Juan Pérez",
        "organization_name": name,
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
  }

  async fn agency(app: &Router, email: &str, name: &str) -> Agency {
    let reg = register(app, email, name).await;
    let slug = reg["organization"]["slug"].as_str().unwrap().to_owned();
    let organization = reg["organization"]["id"].as_str().unwrap().parse().unwrap();
    let staff = reg["token"].as_str().unwrap().to_owned();

    let (status, client) = call(
      app,
      Method::POST,
      &format!("/org/{slug}/dashboard/clients"),
      Some(&staff),
      Some(json!({ "name": "TechStore", "color": "#3b82f6" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{client}");
    let client: Uuid = client["id"].as_str().unwrap().parse().unwrap();

    let (status, invited) = call(
      app,
      Method::POST,
      &format!("/org/{slug}/dashboard/clients/{client}/invite"),
      Some(&staff),
      Some(json!({ "email": format!("laura@{slug}.example"), "full_name": "Laura" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{invited}");
    let link = invited["magic_link"].as_str().unwrap();

    let (status, headers, _) = send(app, request(Method::GET, link_path(link), None, None)).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(headers[header::LOCATION], format!("/org/{slug}/portal"));
    let portal = session_of(&headers);

    Agency { slug, organization, staff, client, portal }
  }

  async fn portal_request(app: &Router, a: &Agency, title: &str) -> String {
    let (status, body) = call(
      app,
      Method::POST,
      &format!("/org/{}/portal/requests", a.slug),
      Some(&a.portal),
      Some(json!({ "title": title, "type": "design", "due_date": "2026-11-30" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["status"], "new");
    assert_eq!(body["priority"], "medium");
    assert_eq!(body["client_id"], a.client.to_string());
    body["id"].as_str().unwrap().to_owned()
  }

  async fn staff_status(app: &Router, a: &Agency, id: &str, status: &str) -> (StatusCode, Value) {
    call(
      app,
      Method::POST,
      &format!("/org/{}/dashboard/requests/{id}/status", a.slug),
      Some(&a.staff),
      Some(json!({ "status": status })),
    )
    .await
  }

  async fn into_review(app: &Router, a: &Agency, id: &str) {
    for s in ["in_progress", "review"] {
      let (status, body) = staff_status(app, a, id, s).await;
      assert_eq!(status, StatusCode::OK, "{body}");
      assert_eq!(body["status"], s);
    }
  }

  #[tokio::test]
  async fn registration_signs_in_and_derives_the_slug() {
    let h = harness().await;
    let (status, headers, body) = send(
      &h.app,
      request(
        Method::POST,
        "/app/register",
        None,
        Some(json!({
          "email": "Juan@Agencia.com",
          "password": "secret123",
          "full_name": "Juan",
          "organization_name": "Café Roma",
        })),
      ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["organization"]["slug"], "cafe-roma");
    assert_eq!(body["organization"]["subscription_status"], "trial");
    assert_eq!(body["profile"]["role"], "admin");
    assert_eq!(body["profile"]["email"], "juan@agencia.com");
    assert_eq!(body["redirect"], "/org/cafe-roma/dashboard");
    let cookie = headers[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("clienthub_session="));
    assert!(cookie.contains("HttpOnly"));

    let (status, body) =
      call(&h.app, Method::GET, "/app/slug-availability?slug=cafe-roma", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["available"], false);

    let (status, _) = call(
      &h.app,
      Method::POST,
      "/app/login",
      None,
      Some(json!({ "email": "juan@agencia.com", "password": "secret123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
  }

  #[tokio::test]
  async fn duplicate_slug_and_short_password_are_rejected() {
    let h = harness().await;
    register(&h.app, "a@one.example", "Café Roma").await;

    let (status, _) = call(
      &h.app,
      Method::POST,
      "/app/register",
      None,
      Some(json!({
        "email": "b@two.example",
        "password": "secret123",
        "full_name": "B",
        "organization_name": "Cafe Roma",
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(
      &h.app,
      Method::POST,
      "/app/register",
      None,
      Some(json!({
        "email": "c@three.example",
        "password": "12345",
        "full_name": "C",
        "organization_name": "Other",
      })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  }

  #[tokio::test]
  async fn wrong_password_and_unknown_email_fail_alike() {
    let h = harness().await;
    register(&h.app, "juan@agencia.com", "Café Roma").await;

    for (email, password) in [("juan@agencia.com", "wrong-pass"), ("nobody@x.example", "secret123")] {
      let (status, body) = call(
        &h.app,
        Method::POST,
        "/app/login",
        None,
        Some(json!({ "email": email, "password": password })),
      )
      .await;
      assert_eq!(status, StatusCode::UNAUTHORIZED);
      assert_eq!(body["error"], "authentication required");
    }
  }

  /// Formatted log output, shared with the test.
  #[derive(Clone, Default)]
  struct LogCapture(Arc<std::sync::Mutex<Vec<u8>>>);

  impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
      self.0.lock().unwrap().extend_from_slice(buf);
      Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> { Ok(()) }
  }

  #[tokio::test]
  async fn failed_sign_ins_keep_emails_out_of_logs() {
    let logs = LogCapture::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
      .with_writer(move || writer.clone())
      .with_ansi(false)
      .with_max_level(tracing::Level::DEBUG)
      .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let h = harness().await;
    register(&h.app, "juan@agencia.com", "Café Roma").await;
    for (email, password) in [("juan@agencia.com", "wrong-pass"), ("nobody@x.example", "secret123")] {
      let (status, _) = call(
        &h.app,
        Method::POST,
        "/app/login",
        None,
        Some(json!({ "email": email, "password": password })),
      )
      .await;
      assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let out = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    assert!(out.contains("sign-in failed"), "{out}");
    assert!(!out.contains("juan@agencia.com"), "{out}");
    assert!(!out.contains("nobody@x.example"), "{out}");
  }

  #[tokio::test]
  async fn cafe_roma_approval() {
    let h = harness().await;
    let a = agency(&h.app, "juan@agencia.com", "Café Roma").await;
    let id = portal_request(&h.app, &a, "Logo redesign").await;

    // Staff see it as needing attention.
    let (status, overview) =
      call(&h.app, Method::GET, &format!("/org/{}/dashboard", a.slug), Some(&a.staff), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(overview["stats"]["total"], 1);
    assert_eq!(overview["needs_attention"][0]["id"], id);

    into_review(&h.app, &a, &id).await;

    let (status, headers, detail) = send(
      &h.app,
      request(
        Method::GET,
        &format!("/org/{}/portal/requests/{id}", a.slug),
        Some(&a.portal),
        None,
      ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["next_statuses"], json!(["changes_requested", "approved"]));
    let etag = headers[header::ETAG].clone();

    let mut approve = request(
      Method::POST,
      &format!("/org/{}/portal/requests/{id}/approve", a.slug),
      Some(&a.portal),
      None,
    );
    approve.headers_mut().insert(header::IF_MATCH, etag);
    let (status, _, body) = send(&h.app, approve).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "approved");

    let (_, overview) =
      call(&h.app, Method::GET, &format!("/org/{}/dashboard", a.slug), Some(&a.staff), None).await;
    assert_eq!(overview["stats"]["completed"], 1);

    let (_, reports) = call(
      &h.app,
      Method::GET,
      &format!("/org/{}/dashboard/reports", a.slug),
      Some(&a.staff),
      None,
    )
    .await;
    assert_eq!(reports["completion_rate"], 100);
    assert_eq!(reports["by_type"][0]["type"], "design");
    assert_eq!(reports["by_client"][0]["completed"], 1);
  }

  #[tokio::test]
  async fn request_changes_round_trip() {
    let h = harness().await;
    let a = agency(&h.app, "juan@agencia.com", "Café Roma").await;
    let id = portal_request(&h.app, &a, "Landing page").await;
    into_review(&h.app, &a, &id).await;

    let (status, body) = call(
      &h.app,
      Method::POST,
      &format!("/org/{}/portal/requests/{id}/request-changes", a.slug),
      Some(&a.portal),
      Some(json!({ "content": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");

    let (status, body) = call(
      &h.app,
      Method::POST,
      &format!("/org/{}/portal/requests/{id}/request-changes", a.slug),
      Some(&a.portal),
      Some(json!({ "content": "Make the logo bigger" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["request"]["status"], "changes_requested");
    assert_eq!(body["comment"]["is_internal"], false);

    let (status, detail) = call(
      &h.app,
      Method::GET,
      &format!("/org/{}/dashboard/requests/{id}", a.slug),
      Some(&a.staff),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["comments"].as_array().unwrap().len(), 1);
    assert_eq!(detail["comments"][0]["author_role"], "client");
    assert_eq!(detail["comments"][0]["author_name"], "Laura");
    assert_eq!(detail["client"]["name"], "TechStore");

    let (status, body) = staff_status(&h.app, &a, &id, "in_progress").await;
    assert_eq!(status, StatusCode::OK, "{body}");
  }

  #[tokio::test]
  async fn rejected_transitions_are_conflicts() {
    let h = harness().await;
    let a = agency(&h.app, "juan@agencia.com", "Café Roma").await;
    let id = portal_request(&h.app, &a, "Video").await;
    into_review(&h.app, &a, &id).await;

    let (status, body) = staff_status(&h.app, &a, &id, "new").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["from"], "review");
    assert_eq!(body["to"], "new");
  }

  #[tokio::test]
  async fn internal_comments_stay_internal() {
    let h = harness().await;
    let a = agency(&h.app, "juan@agencia.com", "Café Roma").await;
    let id = portal_request(&h.app, &a, "Ads").await;

    for (content, internal) in [("Client is slow to reply", true), ("On it!", false)] {
      let (status, _) = call(
        &h.app,
        Method::POST,
        &format!("/org/{}/dashboard/requests/{id}/comments", a.slug),
        Some(&a.staff),
        Some(json!({ "content": content, "internal": internal })),
      )
      .await;
      assert_eq!(status, StatusCode::CREATED);
    }

    let (_, detail) = call(
      &h.app,
      Method::GET,
      &format!("/org/{}/portal/requests/{id}", a.slug),
      Some(&a.portal),
      None,
    )
    .await;
    let comments = detail["comments"].as_array().unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["content"], "On it!");
  }

  #[tokio::test]
  async fn expired_trial_blocks_the_dashboard_only() {
    let h = harness().await;
    let a = agency(&h.app, "juan@agencia.com", "Café Roma").await;
    h.store
      .update_subscription(a.organization, SubscriptionUpdate {
        trial_ends_at: Some(Some(Utc::now() - chrono::Duration::days(1))),
        ..Default::default()
      })
      .await
      .unwrap();

    let (status, body) =
      call(&h.app, Method::GET, &format!("/org/{}/dashboard", a.slug), Some(&a.staff), None).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["notice"]["slug"], a.slug);
    assert_eq!(body["notice"]["plan"], "freelance");

    let (status, home) =
      call(&h.app, Method::GET, &format!("/org/{}/portal", a.slug), Some(&a.portal), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(home["client"]["name"], "TechStore");
    assert!(home["request_types"].as_array().unwrap().contains(&json!("design")));
  }

  #[tokio::test]
  async fn stale_if_match_is_refused_without_writing() {
    let h = harness().await;
    let a = agency(&h.app, "juan@agencia.com", "Café Roma").await;
    let id = portal_request(&h.app, &a, "Newsletter").await;
    let detail_uri = format!("/org/{}/dashboard/requests/{id}", a.slug);

    let (_, headers, _) =
      send(&h.app, request(Method::GET, &detail_uri, Some(&a.staff), None)).await;
    let stale = headers[header::ETAG].clone();

    let (status, body) = call(
      &h.app,
      Method::PATCH,
      &detail_uri,
      Some(&a.staff),
      Some(json!({ "priority": "urgent" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["version"], 2);

    let mut change = request(
      Method::POST,
      &format!("{detail_uri}/status"),
      Some(&a.staff),
      Some(json!({ "status": "in_progress" })),
    );
    change.headers_mut().insert(header::IF_MATCH, stale);
    let (status, _, _) = send(&h.app, change).await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);

    let (_, detail) = call(&h.app, Method::GET, &detail_uri, Some(&a.staff), None).await;
    assert_eq!(detail["request"]["status"], "new");
    assert_eq!(detail["request"]["priority"], "urgent");
  }

  #[tokio::test]
  async fn tenants_cannot_cross() {
    let h = harness().await;
    let roma = agency(&h.app, "juan@agencia.com", "Café Roma").await;
    let norte = agency(&h.app, "ana@norte.example", "Estudio Norte").await;
    let id = portal_request(&h.app, &roma, "Logo").await;

    let (status, headers, body) = send(
      &h.app,
      request(Method::GET, &format!("/org/{}/dashboard", roma.slug), Some(&norte.staff), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["reason"], "wrong_org");
    assert_eq!(headers[header::LOCATION], "/app/login?error=wrong_org");

    let (status, headers, body) = send(
      &h.app,
      request(Method::GET, &format!("/org/{}/portal", norte.slug), Some(&roma.portal), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["reason"], "wrong_org");
    assert_eq!(headers[header::LOCATION], "/org/estudio-norte/portal/login?error=wrong_org");

    // Norte's staff cannot reach Roma's request through their own slug.
    let (status, _) = call(
      &h.app,
      Method::GET,
      &format!("/org/{}/dashboard/requests/{id}", norte.slug),
      Some(&norte.staff),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Nor create requests for Roma's client.
    let (status, _) = call(
      &h.app,
      Method::POST,
      &format!("/org/{}/dashboard/requests", norte.slug),
      Some(&norte.staff),
      Some(json!({ "client_id": roma.client, "title": "Sneaky" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) =
      call(&h.app, Method::GET, &format!("/org/{}/portal", roma.slug), Some(&roma.staff), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["reason"], "not_client");

    let (status, body) =
      call(&h.app, Method::GET, &format!("/org/{}/dashboard", roma.slug), Some(&roma.portal), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["reason"], "not_staff");
  }

  #[tokio::test]
  async fn refusals_point_at_the_right_login() {
    let h = harness().await;
    let a = agency(&h.app, "juan@agencia.com", "Café Roma").await;

    let (status, headers, _) =
      send(&h.app, request(Method::GET, &format!("/org/{}/portal", a.slug), None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(headers[header::LOCATION], "/org/cafe-roma/portal/login");

    let (status, headers, _) =
      send(&h.app, request(Method::GET, &format!("/org/{}/dashboard", a.slug), None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(headers[header::LOCATION], "/app/login");

    let (status, headers, body) =
      send(&h.app, request(Method::GET, "/org/no-such-agency/portal", Some(&a.portal), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["reason"], "unknown_organization");
    assert_eq!(headers[header::LOCATION], "/app/login?error=unknown_organization");

    // Staff on the portal are sent to its login with the reason.
    let (status, headers, _) = send(
      &h.app,
      request(Method::GET, &format!("/org/{}/portal", a.slug), Some(&a.staff), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let location = headers[header::LOCATION].to_str().unwrap().to_owned();
    assert_eq!(location, "/org/cafe-roma/portal/login?error=not_client");

    // Every redirect target answers.
    let (status, body) = call(&h.app, Method::GET, &location, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "not_client");
    assert_eq!(body["magic_link"], "/org/cafe-roma/portal/login");
    let (status, body) =
      call(&h.app, Method::GET, "/app/login?error=unknown_organization", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "unknown_organization");
    assert_eq!(body["password"], "/app/login");
    let (status, _) = call(&h.app, Method::GET, "/org/cafe-roma/portal/login", None, None).await;
    assert_eq!(status, StatusCode::OK);

    // Cookie sessions work the same as bearer tokens.
    let mut req = request(Method::GET, &format!("/org/{}/portal", a.slug), None, None);
    req.headers_mut().insert(
      header::COOKIE,
      HeaderValue::from_str(&format!("clienthub_session={}", a.portal)).unwrap(),
    );
    let (status, _, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);
  }

  #[tokio::test]
  async fn magic_links_are_single_use_and_logout_revokes() {
    let h = harness().await;
    register(&h.app, "juan@agencia.com", "Café Roma").await;

    let (status, body) = call(
      &h.app,
      Method::POST,
      "/app/magic-link",
      None,
      Some(json!({ "email": "JUAN@agencia.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let link = body["link"].as_str().unwrap();
    assert!(link.starts_with("http://localhost:8080/app/magic-link/verify?token="));
    let token = link.split_once("token=").unwrap().1.to_owned();

    let verify = json!({ "token": token });
    let (status, body) =
      call(&h.app, Method::POST, "/app/magic-link/verify", None, Some(verify.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let session = body["token"].as_str().unwrap().to_owned();
    let (status, _) =
      call(&h.app, Method::POST, "/app/magic-link/verify", None, Some(verify)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Unknown emails get the same acknowledgement, without a link.
    let (status, body) = call(
      &h.app,
      Method::POST,
      "/app/magic-link",
      None,
      Some(json!({ "email": "nobody@x.example" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "sent": true }));

    let (status, _) =
      call(&h.app, Method::GET, "/org/cafe-roma/dashboard", Some(&session), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&h.app, Method::POST, "/app/logout", Some(&session), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) =
      call(&h.app, Method::GET, "/org/cafe-roma/dashboard", Some(&session), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn emailed_links_sign_in_and_land_home() {
    let h = harness().await;
    register(&h.app, "juan@agencia.com", "Café Roma").await;

    let (_, body) = call(
      &h.app,
      Method::POST,
      "/app/magic-link",
      None,
      Some(json!({ "email": "juan@agencia.com" })),
    )
    .await;
    let link = body["link"].as_str().unwrap().to_owned();

    let (status, headers, _) =
      send(&h.app, request(Method::GET, link_path(&link), None, None)).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(headers[header::LOCATION], "/org/cafe-roma/dashboard");
    let session = session_of(&headers);
    let (status, _) =
      call(&h.app, Method::GET, "/org/cafe-roma/dashboard", Some(&session), None).await;
    assert_eq!(status, StatusCode::OK);

    // Opening it again does nothing.
    let (status, headers, _) =
      send(&h.app, request(Method::GET, link_path(&link), None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(headers.get(header::SET_COOKIE).is_none());
  }

  #[tokio::test]
  async fn portal_login_only_serves_its_own_client_users() {
    let h = harness().await;
    let roma = agency(&h.app, "juan@agencia.com", "Café Roma").await;
    agency(&h.app, "ana@norte.example", "Estudio Norte").await;

    let portal_login = |slug: &str, email: &str| {
      request(
        Method::POST,
        &format!("/org/{slug}/portal/login"),
        None,
        Some(json!({ "email": email })),
      )
    };

    let (status, _, body) =
      send(&h.app, portal_login(&roma.slug, "Laura@Cafe-Roma.example")).await;
    assert_eq!(status, StatusCode::OK);
    let link = body["link"].as_str().unwrap().to_owned();
    let (status, headers, _) =
      send(&h.app, request(Method::GET, link_path(&link), None, None)).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(headers[header::LOCATION], "/org/cafe-roma/portal");

    // Staff, another agency's client users and unknown slugs get the same
    // acknowledgement without a link.
    for (slug, email) in [
      ("cafe-roma", "juan@agencia.com"),
      ("cafe-roma", "laura@estudio-norte.example"),
      ("no-such-agency", "laura@cafe-roma.example"),
    ] {
      let (status, _, body) = send(&h.app, portal_login(slug, email)).await;
      assert_eq!(status, StatusCode::OK);
      assert_eq!(body, json!({ "sent": true }), "{slug} {email}");
    }
  }

  #[tokio::test]
  async fn reinviting_a_client_user_sends_a_fresh_link() {
    let h = harness().await;
    let a = agency(&h.app, "juan@agencia.com", "Café Roma").await;

    let (status, body) = call(
      &h.app,
      Method::POST,
      &format!("/org/{}/dashboard/clients/{}/invite", a.slug, a.client),
      Some(&a.staff),
      Some(json!({ "email": "laura@cafe-roma.example" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["profile"]["full_name"], "Laura");
    let link = body["magic_link"].as_str().unwrap().to_owned();
    let (status, _, _) = send(&h.app, request(Method::GET, link_path(&link), None, None)).await;
    assert_eq!(status, StatusCode::SEE_OTHER);

    // A staff email cannot be turned into a client user.
    let (status, _) = call(
      &h.app,
      Method::POST,
      &format!("/org/{}/dashboard/clients/{}/invite", a.slug, a.client),
      Some(&a.staff),
      Some(json!({ "email": "juan@agencia.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
  }

  #[tokio::test]
  async fn calendar_and_settings() {
    let h = harness().await;
    let a = agency(&h.app, "juan@agencia.com", "Café Roma").await;
    portal_request(&h.app, &a, "November post").await;

    let (status, cal) = call(
      &h.app,
      Method::GET,
      &format!("/org/{}/dashboard/calendar?month=2026-11", a.slug),
      Some(&a.staff),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cal["month"], "2026-11");
    assert_eq!(cal["requests"].as_array().unwrap().len(), 1);

    let (_, cal) = call(
      &h.app,
      Method::GET,
      &format!("/org/{}/dashboard/calendar?month=2026-12", a.slug),
      Some(&a.staff),
      None,
    )
    .await;
    assert_eq!(cal["requests"].as_array().unwrap().len(), 0);

    let (status, _) = call(
      &h.app,
      Method::GET,
      &format!("/org/{}/dashboard/calendar?month=November", a.slug),
      Some(&a.staff),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, org) = call(
      &h.app,
      Method::PATCH,
      &format!("/org/{}/dashboard/settings/organization", a.slug),
      Some(&a.staff),
      Some(json!({ "name": "Café Roma Studio" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(org["name"], "Café Roma Studio");
    assert_eq!(org["slug"], "cafe-roma");

    let (status, profile) = call(
      &h.app,
      Method::PATCH,
      &format!("/org/{}/dashboard/settings/profile", a.slug),
      Some(&a.staff),
      Some(json!({ "full_name": "Juan P." })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["full_name"], "Juan P.");
  }
}
