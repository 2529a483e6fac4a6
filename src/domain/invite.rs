use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::user::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    Active,
    Used,
    Revoked,
    Expired,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Active => "active",
            InviteStatus::Used => "used",
            InviteStatus::Revoked => "revoked",
            InviteStatus::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "active" => InviteStatus::Active,
            "used" => InviteStatus::Used,
            "revoked" => InviteStatus::Revoked,
            "expired" => InviteStatus::Expired,
            _ => return None,
        })
    }
}

/// A single use of an invite, appended to `Invite::uses` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteUse {
    pub used_by: Uuid,
    pub used_at: DateTime<Utc>,
}

/// An activation token (spec §3 `Invite`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invite {
    pub id: Uuid,
    pub code: String,
    pub role: Role,
    pub parent_code: Option<String>,
    pub parent_user_id: Option<Uuid>,
    pub created_by: Uuid,
    pub status: InviteStatus,
    pub max_uses: i64,
    pub use_count: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub uses: Vec<InviteUse>,
}

/// Input to `consume_invite` (spec §4.4).
#[derive(Debug, Clone)]
pub struct ConsumeInviteInput {
    pub code: String,
    pub role: Role,
    pub used_by_user_id: Uuid,
    pub require_active_issuer: bool,
}
