use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Active => "active",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "draft" => CampaignStatus::Draft,
            "active" => CampaignStatus::Active,
            "paused" => CampaignStatus::Paused,
            "completed" => CampaignStatus::Completed,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealType {
    Discount,
    Review,
    Rating,
}

impl DealType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealType::Discount => "discount",
            DealType::Review => "review",
            DealType::Rating => "rating",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "discount" => DealType::Discount,
            "review" => DealType::Review,
            "rating" => DealType::Rating,
            _ => return None,
        })
    }
}

/// Per-partner allocation of a campaign's slots (spec glossary: Assignment).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Assignment {
    Limit(i64),
    Detailed {
        limit: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        payout_paise: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        commission_paise: Option<i64>,
    },
}

impl Assignment {
    pub fn limit(&self) -> i64 {
        match self {
            Assignment::Limit(l) => *l,
            Assignment::Detailed { limit, .. } => *limit,
        }
    }

    pub fn commission_paise(&self) -> Option<i64> {
        match self {
            Assignment::Limit(_) => None,
            Assignment::Detailed { commission_paise, .. } => *commission_paise,
        }
    }

    pub fn payout_paise(&self) -> Option<i64> {
        match self {
            Assignment::Limit(_) => None,
            Assignment::Detailed { payout_paise, .. } => *payout_paise,
        }
    }
}

/// Purchasable inventory (spec §3 `Campaign`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub title: String,
    pub brand_user_id: Uuid,
    pub original_price_paise: i64,
    pub price_paise: i64,
    pub payout_paise: i64,
    pub return_window_days: i32,
    pub deal_type: Option<DealType>,
    pub total_slots: i64,
    pub used_slots: i64,
    pub status: CampaignStatus,
    pub allowed_agency_codes: HashSet<String>,
    pub assignments: HashMap<String, Assignment>,
    pub locked: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    pub fn has_capacity(&self) -> bool {
        self.used_slots < self.total_slots
    }
}

/// A mediator-published view on a campaign (spec §3 `Deal`), unique on
/// (campaign_id, mediator_code).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub mediator_code: String,
    pub price_paise: i64,
    pub original_price_paise: i64,
    pub payout_paise: i64,
    pub commission_paise: i64,
    pub category: Option<String>,
    pub rating: Option<f64>,
    pub active: bool,
}
