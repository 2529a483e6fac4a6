use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Brand-side inbox entry for a requesting agency (spec §3 `PendingConnection`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingConnection {
    pub id: Uuid,
    pub brand_user_id: Uuid,
    pub agency_code: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// A support record (spec §3 `Ticket`). Orders with an open dispute ticket
/// are excluded from settlement (spec §4.7 step 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub order_id: Option<Uuid>,
    pub raised_by: Uuid,
    pub subject: String,
    pub open: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suspension {
    pub id: Uuid,
    pub user_id: Uuid,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub lifted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub key: String,
    pub value: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub app: String,
    pub endpoint: String,
    pub created_at: DateTime<Utc>,
}
