use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// A single actor role. A `User` carries exactly one primary `role` plus a
/// multi-role `roles` set containing at least that role (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Buyer,
    Mediator,
    Agency,
    Brand,
    Admin,
    Ops,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Buyer => "buyer",
            Role::Mediator => "mediator",
            Role::Agency => "agency",
            Role::Brand => "brand",
            Role::Admin => "admin",
            Role::Ops => "ops",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "buyer" => Some(Role::Buyer),
            "mediator" => Some(Role::Mediator),
            "agency" => Some(Role::Agency),
            "brand" => Some(Role::Brand),
            "admin" => Some(Role::Admin),
            "ops" => Some(Role::Ops),
            _ => None,
        }
    }

    /// §4.9: `isPrivileged(roles)` iff roles intersect {admin, ops}.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Admin | Role::Ops)
    }

    /// §4.9: admin/ops must authenticate by username, never mobile.
    pub fn requires_username_login(&self) -> bool {
        matches!(self, Role::Admin | Role::Ops)
    }
}

pub fn any_privileged(roles: &HashSet<Role>) -> bool {
    roles.iter().any(Role::is_privileged)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Suspended,
    Pending,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Suspended => "suspended",
            UserStatus::Pending => "pending",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(UserStatus::Active),
            "suspended" => Some(UserStatus::Suspended),
            "pending" => Some(UserStatus::Pending),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentInstruments {
    pub upi: Option<String>,
    pub bank_account_number: Option<String>,
    pub bank_ifsc: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KycStatus {
    pub verified: bool,
    pub document_ref: Option<String>,
}

/// An actor record (spec §3 `User`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub role: Role,
    pub roles: HashSet<Role>,
    pub status: UserStatus,
    pub mobile: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: Option<String>,
    pub mediator_code: Option<String>,
    pub parent_code: Option<String>,
    pub brand_code: Option<String>,
    pub connected_agencies: HashSet<String>,
    pub kyc: KycStatus,
    pub payment_instruments: PaymentInstruments,
    pub failed_login_attempts: u32,
    pub lockout_until: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none() && self.status == UserStatus::Active
    }

    pub fn is_locked_out(&self, now: DateTime<Utc>) -> bool {
        matches!(self.lockout_until, Some(until) if until > now)
    }
}

/// Sanitized user shape for API responses (never includes password_hash).
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub role: Role,
    pub status: UserStatus,
    pub mobile: String,
    pub username: Option<String>,
    pub name: Option<String>,
    pub mediator_code: Option<String>,
    pub parent_code: Option<String>,
    pub brand_code: Option<String>,
}

impl From<&User> for UserResponse {
    fn from(u: &User) -> Self {
        Self {
            id: u.id.to_string(),
            role: u.role,
            status: u.status,
            mobile: u.mobile.clone(),
            username: u.username.clone(),
            name: u.name.clone(),
            mediator_code: u.mediator_code.clone(),
            parent_code: u.parent_code.clone(),
            brand_code: u.brand_code.clone(),
        }
    }
}
