use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One wallet per user, created on demand (spec §3 `Wallet`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub available_paise: i64,
    pub pending_paise: i64,
    pub locked_paise: i64,
    pub version: i64,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    BrandDeposit,
    PlatformFee,
    CommissionLock,
    CommissionSettle,
    CashbackLock,
    CashbackSettle,
    OrderSettlementDebit,
    CommissionReversal,
    MarginReversal,
    AgencyPayout,
    AgencyReceipt,
    PayoutRequest,
    PayoutComplete,
    PayoutFailed,
    Refund,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::BrandDeposit => "brand_deposit",
            TransactionType::PlatformFee => "platform_fee",
            TransactionType::CommissionLock => "commission_lock",
            TransactionType::CommissionSettle => "commission_settle",
            TransactionType::CashbackLock => "cashback_lock",
            TransactionType::CashbackSettle => "cashback_settle",
            TransactionType::OrderSettlementDebit => "order_settlement_debit",
            TransactionType::CommissionReversal => "commission_reversal",
            TransactionType::MarginReversal => "margin_reversal",
            TransactionType::AgencyPayout => "agency_payout",
            TransactionType::AgencyReceipt => "agency_receipt",
            TransactionType::PayoutRequest => "payout_request",
            TransactionType::PayoutComplete => "payout_complete",
            TransactionType::PayoutFailed => "payout_failed",
            TransactionType::Refund => "refund",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "brand_deposit" => TransactionType::BrandDeposit,
            "platform_fee" => TransactionType::PlatformFee,
            "commission_lock" => TransactionType::CommissionLock,
            "commission_settle" => TransactionType::CommissionSettle,
            "cashback_lock" => TransactionType::CashbackLock,
            "cashback_settle" => TransactionType::CashbackSettle,
            "order_settlement_debit" => TransactionType::OrderSettlementDebit,
            "commission_reversal" => TransactionType::CommissionReversal,
            "margin_reversal" => TransactionType::MarginReversal,
            "agency_payout" => TransactionType::AgencyPayout,
            "agency_receipt" => TransactionType::AgencyReceipt,
            "payout_request" => TransactionType::PayoutRequest,
            "payout_complete" => TransactionType::PayoutComplete,
            "payout_failed" => TransactionType::PayoutFailed,
            "refund" => TransactionType::Refund,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Reversed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Reversed => "reversed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => TransactionStatus::Pending,
            "completed" => TransactionStatus::Completed,
            "failed" => TransactionStatus::Failed,
            "reversed" => TransactionStatus::Reversed,
            _ => return None,
        })
    }
}

/// An append-only ledger entry (spec §3 `Transaction`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub idempotency_key: String,
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub amount_paise: i64,
    pub wallet_id: Option<Uuid>,
    pub from_user_id: Option<Uuid>,
    pub to_user_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub campaign_id: Option<Uuid>,
    pub payout_id: Option<Uuid>,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Input to `apply_wallet_credit`/`apply_wallet_debit` (spec §4.3).
#[derive(Debug, Clone)]
pub struct WalletMutation {
    pub idempotency_key: String,
    pub kind: TransactionType,
    pub owner_user_id: Uuid,
    pub amount_paise: i64,
    pub from_user_id: Option<Uuid>,
    pub to_user_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub campaign_id: Option<Uuid>,
    pub payout_id: Option<Uuid>,
    pub metadata: Option<Value>,
}
