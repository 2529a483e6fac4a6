//! Order row <-> domain mapping (spec §4.6 C6).

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::domain::order::{
    AffiliateStatus, Order, OrderEvent, OrderItem, OrderStatus, PaymentStatus, Rejection,
    SettlementMode, Verification, WorkflowStatus,
};
use crate::error::AppResult;

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn parse_opt_dt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok().map(|d| d.with_timezone(&Utc)))
}

fn row_to_order(row: &Row) -> rusqlite::Result<Order> {
    let items_json: String = row.get("items")?;
    let items: Vec<OrderItem> = serde_json::from_str(&items_json).unwrap_or_default();
    let verification_json: String = row.get("verification")?;
    let verification: Verification = serde_json::from_str(&verification_json).unwrap_or_default();
    let rejection_json: Option<String> = row.get("rejection")?;
    let rejection: Option<Rejection> = rejection_json.and_then(|s| serde_json::from_str(&s).ok());
    let missing_json: String = row.get("missing_proof_requests")?;
    let missing: Vec<String> = serde_json::from_str(&missing_json).unwrap_or_default();
    let events_json: String = row.get("events")?;
    let events: Vec<OrderEvent> = serde_json::from_str(&events_json).unwrap_or_default();
    let settlement_mode: Option<String> = row.get("settlement_mode")?;

    Ok(Order {
        id: Uuid::parse_str(&row.get::<_, String>("id")?).unwrap_or_default(),
        user_id: Uuid::parse_str(&row.get::<_, String>("user_id")?).unwrap_or_default(),
        brand_user_id: Uuid::parse_str(&row.get::<_, String>("brand_user_id")?).unwrap_or_default(),
        items,
        total_paise: row.get("total_paise")?,
        workflow_status: WorkflowStatus::from_str(&row.get::<_, String>("workflow_status")?)
            .unwrap_or(WorkflowStatus::Created),
        status: match row.get::<_, String>("status")?.as_str() {
            "Shipped" => OrderStatus::Shipped,
            "Delivered" => OrderStatus::Delivered,
            "Cancelled" => OrderStatus::Cancelled,
            "Returned" => OrderStatus::Returned,
            _ => OrderStatus::Ordered,
        },
        payment_status: match row.get::<_, String>("payment_status")?.as_str() {
            "Paid" => PaymentStatus::Paid,
            "Refunded" => PaymentStatus::Refunded,
            "Failed" => PaymentStatus::Failed,
            _ => PaymentStatus::Pending,
        },
        affiliate_status: match row.get::<_, String>("affiliate_status")?.as_str() {
            "Pending_Cooling" => AffiliateStatus::PendingCooling,
            "Approved_Settled" => AffiliateStatus::ApprovedSettled,
            "Rejected" => AffiliateStatus::Rejected,
            "Fraud_Alert" => AffiliateStatus::FraudAlert,
            "Cap_Exceeded" => AffiliateStatus::CapExceeded,
            "Frozen_Disputed" => AffiliateStatus::FrozenDisputed,
            _ => AffiliateStatus::Unchecked,
        },
        frozen: row.get::<_, i64>("frozen")? != 0,
        frozen_at: parse_opt_dt(row.get("frozen_at")?),
        frozen_reason: row.get("frozen_reason")?,
        reactivated_at: parse_opt_dt(row.get("reactivated_at")?),
        external_order_id: row.get("external_order_id")?,
        review_link: row.get("review_link")?,
        verification,
        rejection,
        missing_proof_requests: missing,
        events,
        manager_name: row.get("manager_name")?,
        agency_name: row.get("agency_name")?,
        buyer_name: row.get("buyer_name")?,
        buyer_mobile: row.get("buyer_mobile")?,
        reviewer_name: row.get("reviewer_name")?,
        brand_name: row.get("brand_name")?,
        settlement_mode: settlement_mode.and_then(|s| match s.as_str() {
            "wallet" => Some(SettlementMode::Wallet),
            "external" => Some(SettlementMode::External),
            _ => None,
        }),
        settlement_ref: row.get("settlement_ref")?,
        expected_settlement_date: parse_opt_dt(row.get("expected_settlement_date")?),
        deleted_at: parse_opt_dt(row.get("deleted_at")?),
        created_at: parse_dt(&row.get::<_, String>("created_at")?),
        updated_at: parse_dt(&row.get::<_, String>("updated_at")?),
    })
}

const SELECT_COLS: &str = "id, user_id, brand_user_id, items, total_paise, workflow_status, \
    status, payment_status, affiliate_status, frozen, frozen_at, frozen_reason, reactivated_at, \
    external_order_id, review_link, verification, rejection, missing_proof_requests, events, \
    manager_name, agency_name, buyer_name, buyer_mobile, reviewer_name, brand_name, \
    settlement_mode, settlement_ref, expected_settlement_date, deleted_at, created_at, updated_at";

pub fn insert_order(conn: &Connection, o: &Order) -> AppResult<()> {
    conn.execute(
        "INSERT INTO orders (id, user_id, brand_user_id, items, total_paise, workflow_status, \
         status, payment_status, affiliate_status, frozen, frozen_at, frozen_reason, \
         reactivated_at, external_order_id, review_link, verification, rejection, \
         missing_proof_requests, events, manager_name, agency_name, buyer_name, buyer_mobile, \
         reviewer_name, brand_name, settlement_mode, settlement_ref, expected_settlement_date, \
         deleted_at, created_at, updated_at) \
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,\
         ?23,?24,?25,?26,?27,?28,?29,?30,?31)",
        params![
            o.id.to_string(),
            o.user_id.to_string(),
            o.brand_user_id.to_string(),
            serde_json::to_string(&o.items).unwrap(),
            o.total_paise,
            o.workflow_status.as_str(),
            format!("{:?}", o.status),
            format!("{:?}", o.payment_status),
            affiliate_status_str(o.affiliate_status),
            o.frozen as i64,
            o.frozen_at.map(|d| d.to_rfc3339()),
            o.frozen_reason,
            o.reactivated_at.map(|d| d.to_rfc3339()),
            o.external_order_id,
            o.review_link,
            serde_json::to_string(&o.verification).unwrap(),
            o.rejection.as_ref().map(|r| serde_json::to_string(r).unwrap()),
            serde_json::to_string(&o.missing_proof_requests).unwrap(),
            serde_json::to_string(&o.events).unwrap(),
            o.manager_name,
            o.agency_name,
            o.buyer_name,
            o.buyer_mobile,
            o.reviewer_name,
            o.brand_name,
            o.settlement_mode.map(|m| match m {
                SettlementMode::Wallet => "wallet",
                SettlementMode::External => "external",
            }),
            o.settlement_ref,
            o.expected_settlement_date.map(|d| d.to_rfc3339()),
            o.deleted_at.map(|d| d.to_rfc3339()),
            o.created_at.to_rfc3339(),
            o.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn affiliate_status_str(s: AffiliateStatus) -> &'static str {
    match s {
        AffiliateStatus::Unchecked => "Unchecked",
        AffiliateStatus::PendingCooling => "Pending_Cooling",
        AffiliateStatus::ApprovedSettled => "Approved_Settled",
        AffiliateStatus::Rejected => "Rejected",
        AffiliateStatus::FraudAlert => "Fraud_Alert",
        AffiliateStatus::CapExceeded => "Cap_Exceeded",
        AffiliateStatus::FrozenDisputed => "Frozen_Disputed",
    }
}

pub fn get_order(conn: &Connection, id: Uuid) -> AppResult<Option<Order>> {
    let sql = format!("SELECT {SELECT_COLS} FROM orders WHERE id = ?1 AND deleted_at IS NULL");
    Ok(conn.query_row(&sql, params![id.to_string()], row_to_order).optional()?)
}

pub fn get_order_by_external_id(conn: &Connection, external_id: &str) -> AppResult<Option<Order>> {
    let sql = format!(
        "SELECT {SELECT_COLS} FROM orders WHERE external_order_id = ?1 AND deleted_at IS NULL"
    );
    Ok(conn
        .query_row(&sql, params![external_id], row_to_order)
        .optional()?)
}

pub fn list_orders_by_user(conn: &Connection, user_id: Uuid) -> AppResult<Vec<Order>> {
    let sql = format!(
        "SELECT {SELECT_COLS} FROM orders WHERE user_id = ?1 AND deleted_at IS NULL \
         ORDER BY created_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    Ok(stmt
        .query_map(params![user_id.to_string()], row_to_order)?
        .collect::<Result<Vec<_>, _>>()?)
}

/// Whole-row replace used by the workflow engine after it mutates an
/// in-memory `Order` — callers hold the row's transaction for the whole
/// read-modify-write unit of work (spec §5 "transactional discipline").
pub fn update_order(conn: &Connection, o: &Order) -> AppResult<()> {
    conn.execute(
        "UPDATE orders SET workflow_status=?2, status=?3, payment_status=?4, affiliate_status=?5, \
         frozen=?6, frozen_at=?7, frozen_reason=?8, reactivated_at=?9, review_link=?10, \
         verification=?11, rejection=?12, missing_proof_requests=?13, events=?14, \
         settlement_mode=?15, settlement_ref=?16, expected_settlement_date=?17, updated_at=?18 \
         WHERE id=?1",
        params![
            o.id.to_string(),
            o.workflow_status.as_str(),
            format!("{:?}", o.status),
            format!("{:?}", o.payment_status),
            affiliate_status_str(o.affiliate_status),
            o.frozen as i64,
            o.frozen_at.map(|d| d.to_rfc3339()),
            o.frozen_reason,
            o.reactivated_at.map(|d| d.to_rfc3339()),
            o.review_link,
            serde_json::to_string(&o.verification).unwrap(),
            o.rejection.as_ref().map(|r| serde_json::to_string(r).unwrap()),
            serde_json::to_string(&o.missing_proof_requests).unwrap(),
            serde_json::to_string(&o.events).unwrap(),
            o.settlement_mode.map(|m| match m {
                SettlementMode::Wallet => "wallet",
                SettlementMode::External => "external",
            }),
            o.settlement_ref,
            o.expected_settlement_date.map(|d| d.to_rfc3339()),
            o.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Conditional transition guard: only moves `workflow_status` from `from`
/// to `to` if the row is still at `from` and not frozen (spec §4.6 "workflow
/// transitions are compare-and-swap, never blind overwrites").
pub fn try_transition(
    conn: &Connection,
    order_id: Uuid,
    from: WorkflowStatus,
    to: WorkflowStatus,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE orders SET workflow_status = ?3, updated_at = ?4 \
         WHERE id = ?1 AND workflow_status = ?2 AND frozen = 0",
        params![
            order_id.to_string(),
            from.as_str(),
            to.as_str(),
            Utc::now().to_rfc3339()
        ],
    )
}
