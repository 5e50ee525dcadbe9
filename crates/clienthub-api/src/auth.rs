//! Handlers under `/app`: registration, sign-in and sign-out.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/app/register` | Creates organization + admin, signs in |
//! | `GET`  | `/app/slug-availability` | `?slug=`; advisory only |
//! | `GET`  | `/app/login` | `?error=` reason of a refusal |
//! | `POST` | `/app/login` | Email + password |
//! | `POST` | `/app/magic-link` | Always acknowledged |
//! | `GET`  | `/app/magic-link/verify` | `?token=`; the emailed link, redirects home |
//! | `POST` | `/app/magic-link/verify` | Single use |
//! | `POST` | `/app/logout` | Revokes the presented session |

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use axum::{
  Json,
  extract::{Query, State},
  http::{StatusCode, header},
  response::{IntoResponse, Redirect, Response},
};
use chrono::{Duration, Utc};
use clienthub_core::{
  Error as DomainError,
  access::{self, DenyReason},
  organization::Organization,
  profile::{NewRegistration, Profile, normalize_email},
  slug::{slugify, validate_slug},
  store::HubStore,
};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  AppState, MagicLinkDelivery,
  error::{APP_LOGIN, ApiError},
  session::{Session, cleared_cookie, generate_token, hash_token, session_cookie, start_session},
};

pub const MIN_PASSWORD_LEN: usize = 6;

// ─── Passwords ───────────────────────────────────────────────────────────────

/// Argon2 PHC string for `password`.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|h| h.to_string())
    .map_err(|e| ApiError::Internal(format!("argon2 error: {e}")))
}

pub fn verify_password(password: &str, phc: &str) -> bool {
  PasswordHash::new(phc)
    .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
    .unwrap_or(false)
}

/// Attach the session cookie to `res`.
fn with_session(mut res: Response, token: &str, ttl: Duration) -> Response {
  if let Some(cookie) = session_cookie(token, ttl) {
    res.headers_mut().insert(header::SET_COOKIE, cookie);
  }
  res
}

/// JSON response that also sets the session cookie.
fn signed_in<T: Serialize>(
  status: StatusCode,
  token: &str,
  ttl: Duration,
  body: T,
) -> Response {
  with_session((status, Json(body)).into_response(), token, ttl)
}

// ─── Register ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
  pub email:             String,
  pub password:          String,
  pub full_name:         String,
  pub organization_name: String,
  /// Derived from the organization name when absent.
  pub slug:              Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Registered {
  pub token:        String,
  pub organization: Organization,
  pub profile:      Profile,
  pub redirect:     String,
}

/// `POST /app/register`
pub async fn register<S: HubStore>(
  State(state): State<AppState<S>>,
  Json(body): Json<RegisterBody>,
) -> Result<Response, ApiError> {
  if body.password.chars().count() < MIN_PASSWORD_LEN {
    return Err(
      DomainError::Validation(format!(
        "password must be at least {MIN_PASSWORD_LEN} characters"
      ))
      .into(),
    );
  }
  let email = normalize_email(&body.email);
  if !email.contains('@') {
    return Err(DomainError::validation("a valid email is required").into());
  }
  let slug = body
    .slug
    .map(|s| s.trim().to_owned())
    .filter(|s| !s.is_empty())
    .unwrap_or_else(|| slugify(&body.organization_name));

  let (organization, profile) = state
    .store
    .register_organization(NewRegistration {
      email,
      password_hash: hash_password(&body.password)?,
      full_name: body.full_name,
      organization_name: body.organization_name,
      slug,
      trial_ends_at: Utc::now() + Duration::days(state.config.trial_days),
    })
    .await
    .map_err(ApiError::store)?;

  tracing::info!(
    organization = %organization.id,
    slug = %organization.slug,
    profile = %profile.id,
    "organization registered"
  );

  let token = start_session(&state, profile.id).await?;
  let redirect = format!("/org/{}/dashboard", organization.slug);
  Ok(signed_in(
    StatusCode::CREATED,
    &token,
    state.config.session_ttl(),
    Registered { token: token.clone(), organization, profile, redirect },
  ))
}

// ─── Slug availability ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SlugParams {
  pub slug: String,
}

#[derive(Debug, Serialize)]
pub struct SlugAvailability {
  pub slug:      String,
  pub valid:     bool,
  pub available: bool,
  /// The canonical form of the input, offered when it differs.
  pub suggested: String,
}

/// `GET /app/slug-availability?slug=`
pub async fn slug_availability<S: HubStore>(
  State(state): State<AppState<S>>,
  Query(params): Query<SlugParams>,
) -> Result<Json<SlugAvailability>, ApiError> {
  let slug = params.slug.trim().to_owned();
  let valid = validate_slug(&slug).is_ok();
  let available = valid
    && state
      .store
      .slug_available(&slug)
      .await
      .map_err(ApiError::store)?;
  Ok(Json(SlugAvailability { suggested: slugify(&slug), slug, valid, available }))
}

// ─── Login ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginParams {
  pub error: Option<DenyReason>,
}

/// What a login screen needs: why the caller was sent there and where to
/// post credentials.
#[derive(Debug, Serialize)]
pub struct LoginPage {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error:      Option<DenyReason>,
  /// Password sign-in; absent where only magic links are offered.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub password:   Option<String>,
  pub magic_link: String,
}

/// `GET /app/login`
pub async fn login_page(Query(params): Query<LoginParams>) -> Json<LoginPage> {
  Json(LoginPage {
    error:      params.error,
    password:   Some(APP_LOGIN.to_owned()),
    magic_link: "/app/magic-link".to_owned(),
  })
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
  pub email:    String,
  pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SignedIn {
  pub token:      String,
  pub profile_id: Uuid,
}

/// `POST /app/login`
///
/// Unknown emails, invited users without a password and wrong passwords all
/// fail the same way.
pub async fn login<S: HubStore>(
  State(state): State<AppState<S>>,
  Json(body): Json<LoginBody>,
) -> Result<Response, ApiError> {
  let credentials = state
    .store
    .credentials_by_email(&body.email)
    .await
    .map_err(ApiError::store)?;

  let profile_id = match credentials {
    Some(c) if c.password_hash.as_deref().is_some_and(|h| verify_password(&body.password, h)) => {
      c.profile_id
    }
    Some(c) => {
      tracing::info!(profile = %c.profile_id, "sign-in failed");
      return Err(DomainError::AuthRequired.into());
    }
    None => {
      tracing::info!("sign-in failed for an unknown email");
      return Err(DomainError::AuthRequired.into());
    }
  };

  let token = start_session(&state, profile_id).await?;
  Ok(signed_in(
    StatusCode::OK,
    &token,
    state.config.session_ttl(),
    SignedIn { token: token.clone(), profile_id },
  ))
}

// ─── Magic links ─────────────────────────────────────────────────────────────

/// Store a new magic link for `profile_id` and deliver it. Returns the link
/// when delivery is [`MagicLinkDelivery::Response`].
pub async fn issue_magic_link<S: HubStore>(
  state: &AppState<S>,
  profile_id: Uuid,
) -> Result<Option<String>, ApiError> {
  let token = generate_token();
  state
    .store
    .create_magic_link(
      profile_id,
      hash_token(&token),
      Utc::now() + state.config.magic_link_ttl(),
    )
    .await
    .map_err(ApiError::store)?;

  let link = format!(
    "{}/app/magic-link/verify?token={token}",
    state.config.public_base_url.trim_end_matches('/')
  );
  match state.config.magic_link_delivery {
    MagicLinkDelivery::Log => {
      tracing::info!(profile = %profile_id, %link, "magic link issued");
      Ok(None)
    }
    MagicLinkDelivery::Response => {
      tracing::info!(profile = %profile_id, "magic link issued");
      Ok(Some(link))
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct MagicLinkBody {
  pub email: String,
}

#[derive(Debug, Serialize)]
pub struct MagicLinkSent {
  pub sent: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub link: Option<String>,
}

/// `POST /app/magic-link`
pub async fn request_magic_link<S: HubStore>(
  State(state): State<AppState<S>>,
  Json(body): Json<MagicLinkBody>,
) -> Result<Json<MagicLinkSent>, ApiError> {
  let credentials = state
    .store
    .credentials_by_email(&body.email)
    .await
    .map_err(ApiError::store)?;

  let link = match credentials {
    Some(c) => issue_magic_link(&state, c.profile_id).await?,
    None => {
      tracing::debug!("magic link requested for unknown email");
      None
    }
  };
  Ok(Json(MagicLinkSent { sent: true, link }))
}

#[derive(Debug, Deserialize)]
pub struct VerifyBody {
  pub token: String,
}

/// Use up a magic link, returning the profile it signs in.
async fn consume_magic_link<S: HubStore>(
  state: &AppState<S>,
  token: &str,
) -> Result<Uuid, ApiError> {
  state
    .store
    .consume_magic_link(hash_token(token.trim()), Utc::now())
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| {
      tracing::info!("magic link rejected");
      ApiError::Domain(DomainError::AuthRequired)
    })
}

/// `GET /app/magic-link/verify?token=`
///
/// The link as delivered. Signs in and redirects to the dashboard or portal
/// the profile belongs to.
pub async fn open_magic_link<S: HubStore>(
  State(state): State<AppState<S>>,
  Query(params): Query<VerifyBody>,
) -> Result<Response, ApiError> {
  let profile_id = consume_magic_link(&state, &params.token).await?;
  let profile = state
    .store
    .get_profile(profile_id)
    .await
    .map_err(ApiError::store)?
    .ok_or(DomainError::AuthRequired)?;
  let home = access::home_path(&*state.store, &profile)
    .await
    .map_err(ApiError::store)?
    .unwrap_or_else(|| APP_LOGIN.to_owned());

  let token = start_session(&state, profile_id).await?;
  tracing::info!(profile = %profile_id, %home, "signed in by magic link");
  Ok(with_session(Redirect::to(&home).into_response(), &token, state.config.session_ttl()))
}

/// `POST /app/magic-link/verify`
pub async fn verify_magic_link<S: HubStore>(
  State(state): State<AppState<S>>,
  Json(body): Json<VerifyBody>,
) -> Result<Response, ApiError> {
  let profile_id = consume_magic_link(&state, &body.token).await?;
  let token = start_session(&state, profile_id).await?;
  Ok(signed_in(
    StatusCode::OK,
    &token,
    state.config.session_ttl(),
    SignedIn { token: token.clone(), profile_id },
  ))
}

// ─── Logout ──────────────────────────────────────────────────────────────────

/// `POST /app/logout`
pub async fn logout<S: HubStore>(
  State(state): State<AppState<S>>,
  session: Session,
) -> Result<impl IntoResponse, ApiError> {
  state
    .store
    .revoke_session(session.token_hash)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, cleared_cookie())]))
}
