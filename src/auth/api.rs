//! Auth HTTP controllers (spec §6 Auth row).
//!
//! Thin handlers: deserialize, call into `authz`/`invite`/`db::user_repo`,
//! map `AppError` via its `IntoResponse` impl — generalizes the teacher's
//! `auth/api.rs` login/me endpoints, stripped of Privy/token-gating.

use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    Json,
};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::models::{
    Claims, LoginRequest, LoginResponse, RefreshRequest, RegisterRequest, TokenPair,
    UpdateProfileRequest,
};
use crate::authz;
use crate::db::user_repo;
use crate::domain::invite::ConsumeInviteInput;
use crate::domain::user::{KycStatus, PaymentInstruments, Role, User, UserResponse, UserStatus};
use crate::error::{AppError, AppResult};
use crate::invite;
use crate::observability::{self, Domain, EventCategory, EventContext};
use crate::state::AppState;

fn issue_tokens(state: &AppState, user: &User) -> AppResult<TokenPair> {
    let (access_token, expires_in) = state
        .jwt
        .generate_access_token(user)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let (refresh_token, _) = state
        .jwt
        .generate_refresh_token(user)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(TokenPair { access_token, refresh_token, expires_in })
}

fn generate_code(prefix: &str) -> String {
    format!("{prefix}{}", Uuid::new_v4().simple())
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let pool = state.pool.clone();
    tokio::task::spawn_blocking(move || -> AppResult<LoginResponse> {
        let conn = pool.get()?;

        let used_username = body.username.is_some();
        let user = if let Some(username) = &body.username {
            user_repo::get_user_by_username(&conn, username)?
        } else if let Some(mobile) = &body.mobile {
            user_repo::get_user_by_mobile(&conn, mobile)?
        } else {
            return Err(AppError::InvalidCredentials);
        };
        let user = user.ok_or(AppError::InvalidCredentials)?;

        authz::validate_login_identifier(user.role, used_username)?;

        match authz::check_lockout(&user) {
            Err(AppError::AccountLocked) => {
                observability::brute_force_detected(user.id, None);
                return Err(AppError::AccountLocked);
            }
            Err(e) => return Err(e),
            Ok(already_throttled) => {
                if already_throttled {
                    observability::brute_force_detected(user.id, None);
                }
            }
        }

        if !user.is_active() {
            return Err(AppError::UserNotActive);
        }

        if !verify(&body.password, &user.password_hash).unwrap_or(false) {
            authz::record_failed_login(&conn, &user)?;
            return Err(AppError::InvalidCredentials);
        }

        authz::clear_login_failures(&conn, user.id)?;
        let tokens = issue_tokens(&state, &user)?;

        observability::emit(
            tracing::Level::INFO,
            Domain::Auth,
            EventCategory::Authentication,
            "LOGIN_SUCCESS",
            &EventContext { user_id: Some(user.id), role: Some(user.role.as_str()), ..Default::default() },
            None,
        );

        Ok(LoginResponse { user: UserResponse::from(&user), tokens })
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?
    .map(Json)
}

/// Self-service signup behind an invite code — role is whatever the
/// invite was issued for (buyer, mediator, or agency).
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<Json<LoginResponse>> {
    let pool = state.pool.clone();
    tokio::task::spawn_blocking(move || -> AppResult<LoginResponse> {
        let conn = pool.get()?;

        let role = invite_role_hint(&conn, &body.invite_code)?;
        let now = Utc::now();
        let user_id = Uuid::new_v4();
        let invite = invite::consume_invite(
            &conn,
            ConsumeInviteInput {
                code: body.invite_code.clone(),
                role,
                used_by_user_id: user_id,
                require_active_issuer: true,
            },
        )?;

        let mediator_code = match role {
            Role::Mediator | Role::Agency => Some(generate_code("m")),
            _ => None,
        };
        let user = User {
            id: user_id,
            role,
            roles: [role].into_iter().collect(),
            status: UserStatus::Active,
            mobile: body.mobile.clone(),
            username: body.username.clone(),
            password_hash: hash(&body.password, DEFAULT_COST).map_err(|e| AppError::Internal(e.to_string()))?,
            name: body.name.clone(),
            mediator_code,
            parent_code: invite.parent_code.clone(),
            brand_code: None,
            connected_agencies: Default::default(),
            kyc: KycStatus::default(),
            payment_instruments: PaymentInstruments::default(),
            failed_login_attempts: 0,
            lockout_until: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        user_repo::insert_user(&conn, &user)?;

        let tokens = issue_tokens(&state, &user)?;
        Ok(LoginResponse { user: UserResponse::from(&user), tokens })
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?
    .map(Json)
}

fn invite_role_hint(conn: &rusqlite::Connection, code: &str) -> AppResult<Role> {
    crate::db::invite_repo::get_invite_by_code(conn, code)?
        .map(|i| i.role)
        .ok_or(AppError::InvalidInvite)
}

#[derive(serde::Deserialize)]
pub struct RegisterOpsRequest {
    pub mobile: String,
    pub username: String,
    pub password: String,
    pub name: Option<String>,
}

/// Privileged-only: provisions a new ops account with no invite
/// (admin/ops accounts are bootstrapped by other admins, spec §4.9).
pub async fn register_ops(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<RegisterOpsRequest>,
) -> AppResult<Json<UserResponse>> {
    create_privileged_account(state, claims, body.mobile, body.username, body.password, body.name, Role::Ops, None).await
}

#[derive(serde::Deserialize)]
pub struct RegisterBrandRequest {
    pub mobile: String,
    pub username: String,
    pub password: String,
    pub name: Option<String>,
    pub brand_code: String,
}

pub async fn register_brand(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<RegisterBrandRequest>,
) -> AppResult<Json<UserResponse>> {
    create_privileged_account(
        state,
        claims,
        body.mobile,
        body.username,
        body.password,
        body.name,
        Role::Brand,
        Some(body.brand_code),
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn create_privileged_account(
    state: AppState,
    claims: Claims,
    mobile: String,
    username: String,
    password: String,
    name: Option<String>,
    role: Role,
    brand_code: Option<String>,
) -> AppResult<Json<UserResponse>> {
    let pool = state.pool.clone();
    tokio::task::spawn_blocking(move || -> AppResult<UserResponse> {
        let conn = pool.get()?;
        let requester_id = claims.user_id().ok_or(AppError::Unauthenticated)?;
        let requester = authz::get_requester(&conn, requester_id)?;
        authz::require_privileged(&requester)?;

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            role,
            roles: [role].into_iter().collect(),
            status: UserStatus::Active,
            mobile,
            username: Some(username),
            password_hash: hash(&password, DEFAULT_COST).map_err(|e| AppError::Internal(e.to_string()))?,
            name,
            mediator_code: None,
            parent_code: None,
            brand_code,
            connected_agencies: Default::default(),
            kyc: KycStatus::default(),
            payment_instruments: PaymentInstruments::default(),
            failed_login_attempts: 0,
            lockout_until: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        user_repo::insert_user(&conn, &user)?;
        Ok(UserResponse::from(&user))
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?
    .map(Json)
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<TokenPair>> {
    let claims = state
        .jwt
        .validate_refresh_token(&body.refresh_token)
        .map_err(|_| AppError::Unauthenticated)?;
    let user_id = claims.user_id().ok_or(AppError::Unauthenticated)?;

    let pool = state.pool.clone();
    let user = tokio::task::spawn_blocking(move || -> AppResult<User> {
        let conn = pool.get()?;
        user_repo::get_user_by_id(&conn, user_id)?.ok_or(AppError::Unauthenticated)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    if !user.is_active() {
        return Err(AppError::UserNotActive);
    }
    Ok(Json(issue_tokens(&state, &user)?))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<UserResponse>> {
    let user_id = claims.user_id().ok_or(AppError::Unauthenticated)?;
    let pool = state.pool.clone();
    let user = tokio::task::spawn_blocking(move || -> AppResult<User> {
        let conn = pool.get()?;
        user_repo::get_user_by_id(&conn, user_id)?.ok_or(AppError::Unauthenticated)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(UserResponse::from(&user)))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<UpdateProfileRequest>,
) -> AppResult<Json<UserResponse>> {
    let user_id = claims.user_id().ok_or(AppError::Unauthenticated)?;
    let pool = state.pool.clone();
    let user = tokio::task::spawn_blocking(move || -> AppResult<User> {
        let conn = pool.get()?;
        let mut user = user_repo::get_user_by_id(&conn, user_id)?.ok_or(AppError::Unauthenticated)?;
        if let Some(name) = body.name {
            user.name = Some(name);
        }
        user.updated_at = Utc::now();
        conn.execute(
            "UPDATE users SET name = ?2, updated_at = ?3 WHERE id = ?1",
            rusqlite::params![user.id.to_string(), user.name, user.updated_at.to_rfc3339()],
        )?;
        Ok(user)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(UserResponse::from(&user)))
}

/// Shared auth-scoped axum state wrapper, kept for router construction
/// parity with the teacher's `AuthState` (here it's just `AppState`
/// cloned, since there is no separate auth-only store).
pub type AuthState = AppState;

pub fn jwt_handler(state: &AppState) -> Arc<crate::auth::JwtHandler> {
    state.jwt.clone()
}
