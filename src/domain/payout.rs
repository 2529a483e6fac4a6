use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Requested,
    Processing,
    Paid,
    Failed,
    Canceled,
    Recorded,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Requested => "requested",
            PayoutStatus::Processing => "processing",
            PayoutStatus::Paid => "paid",
            PayoutStatus::Failed => "failed",
            PayoutStatus::Canceled => "canceled",
            PayoutStatus::Recorded => "recorded",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "requested" => PayoutStatus::Requested,
            "processing" => PayoutStatus::Processing,
            "paid" => PayoutStatus::Paid,
            "failed" => PayoutStatus::Failed,
            "canceled" => PayoutStatus::Canceled,
            "recorded" => PayoutStatus::Recorded,
            _ => return None,
        })
    }
}

/// A beneficiary disbursement (spec §3 `Payout`). Unique on
/// (provider, provider_ref) when both are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount_paise: i64,
    pub status: PayoutStatus,
    pub provider: Option<String>,
    pub provider_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
