//! Authentication wire types.
//!
//! JWT claims and the login/refresh request/response bodies. Mirrors the
//! teacher's `Claims`/`LoginRequest`/`LoginResponse` shapes, adapted to
//! carry a user id + role set instead of a single flat username/role pair.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::user::{Role, UserResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT claims payload. `roles` rides along so the auth middleware can
/// authorize without a store round-trip, but every privileged operation
/// still re-reads the user row via `authz::get_requester` (spec §4.9) —
/// claims are a cache, never the source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub roles: HashSet<Role>,
    pub token_type: TokenType,
    pub exp: usize,
}

impl Claims {
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub mobile: Option<String>,
    pub username: Option<String>,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: usize,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserResponse,
    pub tokens: TokenPair,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub invite_code: String,
    pub mobile: String,
    pub username: Option<String>,
    pub password: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
}
