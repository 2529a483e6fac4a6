use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::campaign::DealType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Created,
    Redirected,
    Ordered,
    ProofSubmitted,
    UnderReview,
    Approved,
    Rejected,
    RewardPending,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Created => "CREATED",
            WorkflowStatus::Redirected => "REDIRECTED",
            WorkflowStatus::Ordered => "ORDERED",
            WorkflowStatus::ProofSubmitted => "PROOF_SUBMITTED",
            WorkflowStatus::UnderReview => "UNDER_REVIEW",
            WorkflowStatus::Approved => "APPROVED",
            WorkflowStatus::Rejected => "REJECTED",
            WorkflowStatus::RewardPending => "REWARD_PENDING",
            WorkflowStatus::Completed => "COMPLETED",
            WorkflowStatus::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "CREATED" => WorkflowStatus::Created,
            "REDIRECTED" => WorkflowStatus::Redirected,
            "ORDERED" => WorkflowStatus::Ordered,
            "PROOF_SUBMITTED" => WorkflowStatus::ProofSubmitted,
            "UNDER_REVIEW" => WorkflowStatus::UnderReview,
            "APPROVED" => WorkflowStatus::Approved,
            "REJECTED" => WorkflowStatus::Rejected,
            "REWARD_PENDING" => WorkflowStatus::RewardPending,
            "COMPLETED" => WorkflowStatus::Completed,
            "FAILED" => WorkflowStatus::Failed,
            _ => return None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Rejected
        )
    }

    /// Legal direct successors per the state graph in spec §4.6.
    pub fn legal_next(&self) -> &'static [WorkflowStatus] {
        use WorkflowStatus::*;
        match self {
            Created => &[Redirected, Ordered, Failed],
            Redirected => &[Ordered, Failed],
            Ordered => &[ProofSubmitted, Failed],
            ProofSubmitted => &[UnderReview, Failed],
            UnderReview => &[Approved, Rejected, Failed],
            Approved => &[RewardPending, Failed],
            RewardPending => &[Completed, Failed],
            Rejected | Completed | Failed => &[],
        }
    }

    pub fn can_transition_to(&self, to: WorkflowStatus) -> bool {
        self.legal_next().contains(&to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum OrderStatus {
    Ordered,
    Shipped,
    Delivered,
    Cancelled,
    Returned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AffiliateStatus {
    Unchecked,
    #[serde(rename = "Pending_Cooling")]
    PendingCooling,
    #[serde(rename = "Approved_Settled")]
    ApprovedSettled,
    Rejected,
    #[serde(rename = "Fraud_Alert")]
    FraudAlert,
    #[serde(rename = "Cap_Exceeded")]
    CapExceeded,
    #[serde(rename = "Frozen_Disputed")]
    FrozenDisputed,
}

impl AffiliateStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AffiliateStatus::ApprovedSettled
                | AffiliateStatus::Rejected
                | AffiliateStatus::FraudAlert
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementMode {
    Wallet,
    External,
}

/// One of the four proof steps gating workflow progression (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProofType {
    Order,
    Review,
    Rating,
    ReturnWindow,
}

impl ProofType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProofType::Order => "order",
            ProofType::Review => "review",
            ProofType::Rating => "rating",
            ProofType::ReturnWindow => "returnWindow",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "order" => ProofType::Order,
            "review" => ProofType::Review,
            "rating" => ProofType::Rating,
            "returnWindow" | "returnwindow" => ProofType::ReturnWindow,
            _ => return None,
        })
    }
}

/// Who verified a proof step: a real user, or the AI oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VerifiedBy {
    User(Uuid),
    SystemAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepVerification {
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<VerifiedBy>,
    pub auto_verified: bool,
    pub ai_confidence_score: Option<u8>,
}

impl Default for StepVerification {
    fn default() -> Self {
        Self {
            verified_at: None,
            verified_by: None,
            auto_verified: false,
            ai_confidence_score: None,
        }
    }
}

impl StepVerification {
    pub fn is_verified(&self) -> bool {
        self.verified_at.is_some()
    }
}

/// The full per-order verification record (spec §3, JSON column).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Verification {
    pub order: StepVerification,
    pub review: StepVerification,
    pub rating: StepVerification,
    pub return_window: StepVerification,
}

impl Verification {
    pub fn get(&self, t: ProofType) -> &StepVerification {
        match t {
            ProofType::Order => &self.order,
            ProofType::Review => &self.review,
            ProofType::Rating => &self.rating,
            ProofType::ReturnWindow => &self.return_window,
        }
    }

    pub fn get_mut(&mut self, t: ProofType) -> &mut StepVerification {
        match t {
            ProofType::Order => &mut self.order,
            ProofType::Review => &mut self.review,
            ProofType::Rating => &mut self.rating,
            ProofType::ReturnWindow => &mut self.return_window,
        }
    }
}

/// An append-only domain event on an order (spec §3 `events[]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub at: DateTime<Utc>,
    pub actor_user_id: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rejection {
    pub kind: String,
    pub reason: String,
    pub actor_user_id: Option<Uuid>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    pub title: String,
    pub image: Option<String>,
    pub price_at_purchase_paise: i64,
    pub commission_paise: i64,
    pub campaign_id: Uuid,
    pub quantity: i64,
    pub deal_type: Option<DealType>,
    pub platform: Option<String>,
    pub brand_name: Option<String>,
}

/// A buyer's purchase attempt (spec §3 `Order`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub brand_user_id: Uuid,
    pub items: Vec<OrderItem>,
    pub total_paise: i64,
    pub workflow_status: WorkflowStatus,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub affiliate_status: AffiliateStatus,
    pub frozen: bool,
    pub frozen_at: Option<DateTime<Utc>>,
    pub frozen_reason: Option<String>,
    pub reactivated_at: Option<DateTime<Utc>>,
    pub external_order_id: Option<String>,
    pub review_link: Option<String>,
    pub verification: Verification,
    pub rejection: Option<Rejection>,
    pub missing_proof_requests: Vec<String>,
    pub events: Vec<OrderEvent>,
    pub manager_name: Option<String>,
    pub agency_name: Option<String>,
    pub buyer_name: Option<String>,
    pub buyer_mobile: Option<String>,
    pub reviewer_name: Option<String>,
    pub brand_name: Option<String>,
    pub settlement_mode: Option<SettlementMode>,
    pub settlement_ref: Option<String>,
    pub expected_settlement_date: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Which proof types this order's deal composition actually requires
    /// (spec §4.6: "a proof type may only be submitted if the order's deal
    /// types require it").
    pub fn required_proof_types(&self) -> Vec<ProofType> {
        let mut required = vec![ProofType::Order];
        let has_rating_deal = self
            .items
            .iter()
            .any(|i| i.deal_type == Some(DealType::Rating));
        let has_review_deal = self
            .items
            .iter()
            .any(|i| i.deal_type == Some(DealType::Review));
        let has_non_discount_deal = self
            .items
            .iter()
            .any(|i| i.deal_type != Some(DealType::Discount));

        if has_rating_deal {
            required.push(ProofType::Rating);
        }
        if has_review_deal {
            required.push(ProofType::Review);
        }
        if has_non_discount_deal {
            required.push(ProofType::ReturnWindow);
        }
        required
    }

    pub fn all_required_steps_verified(&self) -> bool {
        self.required_proof_types()
            .iter()
            .all(|t| self.verification.get(*t).is_verified())
    }
}
