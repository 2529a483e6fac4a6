//! Campaign & deal row <-> domain mapping (spec §4.5 C5).

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::domain::campaign::{Assignment, Campaign, CampaignStatus, Deal, DealType};
use crate::error::AppResult;

fn row_to_campaign(row: &Row) -> rusqlite::Result<Campaign> {
    let deal_type: Option<String> = row.get("deal_type")?;
    let allowed_json: String = row.get("allowed_agency_codes")?;
    let allowed: Vec<String> = serde_json::from_str(&allowed_json).unwrap_or_default();
    let assignments_json: String = row.get("assignments")?;
    let assignments: HashMap<String, Assignment> =
        serde_json::from_str(&assignments_json).unwrap_or_default();
    let deleted: Option<String> = row.get("deleted_at")?;

    Ok(Campaign {
        id: Uuid::parse_str(&row.get::<_, String>("id")?).unwrap_or_default(),
        title: row.get("title")?,
        brand_user_id: Uuid::parse_str(&row.get::<_, String>("brand_user_id")?).unwrap_or_default(),
        original_price_paise: row.get("original_price_paise")?,
        price_paise: row.get("price_paise")?,
        payout_paise: row.get("payout_paise")?,
        return_window_days: row.get("return_window_days")?,
        deal_type: deal_type.and_then(|s| DealType::from_str(&s)),
        total_slots: row.get("total_slots")?,
        used_slots: row.get("used_slots")?,
        status: CampaignStatus::from_str(&row.get::<_, String>("status")?)
            .unwrap_or(CampaignStatus::Draft),
        allowed_agency_codes: allowed.into_iter().collect::<HashSet<_>>(),
        assignments,
        locked: row.get::<_, i64>("locked")? != 0,
        deleted_at: deleted.and_then(|s| DateTime::parse_from_rfc3339(&s).ok().map(|d| d.with_timezone(&Utc))),
        created_at: DateTime::parse_from_rfc3339(&row.get::<_, String>("created_at")?)
            .unwrap()
            .with_timezone(&Utc),
    })
}

fn row_to_deal(row: &Row) -> rusqlite::Result<Deal> {
    Ok(Deal {
        id: Uuid::parse_str(&row.get::<_, String>("id")?).unwrap_or_default(),
        campaign_id: Uuid::parse_str(&row.get::<_, String>("campaign_id")?).unwrap_or_default(),
        mediator_code: row.get("mediator_code")?,
        price_paise: row.get("price_paise")?,
        original_price_paise: row.get("original_price_paise")?,
        payout_paise: row.get("payout_paise")?,
        commission_paise: row.get("commission_paise")?,
        category: row.get("category")?,
        rating: row.get("rating")?,
        active: row.get::<_, i64>("active")? != 0,
    })
}

const CAMPAIGN_COLS: &str = "id, title, brand_user_id, original_price_paise, price_paise, \
    payout_paise, return_window_days, deal_type, total_slots, used_slots, status, \
    allowed_agency_codes, assignments, locked, deleted_at, created_at";

const DEAL_COLS: &str = "id, campaign_id, mediator_code, price_paise, original_price_paise, \
    payout_paise, commission_paise, category, rating, active";

pub fn insert_campaign(conn: &Connection, c: &Campaign) -> AppResult<()> {
    conn.execute(
        "INSERT INTO campaigns (id, title, brand_user_id, original_price_paise, price_paise, \
         payout_paise, return_window_days, deal_type, total_slots, used_slots, status, \
         allowed_agency_codes, assignments, locked, deleted_at, created_at) \
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
        params![
            c.id.to_string(),
            c.title,
            c.brand_user_id.to_string(),
            c.original_price_paise,
            c.price_paise,
            c.payout_paise,
            c.return_window_days,
            c.deal_type.map(|d| d.as_str()),
            c.total_slots,
            c.used_slots,
            c.status.as_str(),
            serde_json::to_string(&c.allowed_agency_codes.iter().cloned().collect::<Vec<_>>()).unwrap(),
            serde_json::to_string(&c.assignments).unwrap(),
            c.locked as i64,
            c.deleted_at.map(|d| d.to_rfc3339()),
            c.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_campaign(conn: &Connection, id: Uuid) -> AppResult<Option<Campaign>> {
    let sql = format!("SELECT {CAMPAIGN_COLS} FROM campaigns WHERE id = ?1 AND deleted_at IS NULL");
    Ok(conn
        .query_row(&sql, params![id.to_string()], row_to_campaign)
        .optional()?)
}

pub fn list_campaigns_by_status(conn: &Connection, status: CampaignStatus) -> AppResult<Vec<Campaign>> {
    let sql = format!(
        "SELECT {CAMPAIGN_COLS} FROM campaigns WHERE status = ?1 AND deleted_at IS NULL \
         ORDER BY created_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![status.as_str()], row_to_campaign)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Atomically claims one slot iff the campaign still has capacity — no
/// read-then-write. Returns rows affected (0 means sold out).
pub fn try_claim_slot(conn: &Connection, campaign_id: Uuid) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE campaigns SET used_slots = used_slots + 1 \
         WHERE id = ?1 AND deleted_at IS NULL AND status = 'active' AND used_slots < total_slots",
        params![campaign_id.to_string()],
    )
}

pub fn release_slot(conn: &Connection, campaign_id: Uuid) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE campaigns SET used_slots = used_slots - 1 \
         WHERE id = ?1 AND used_slots > 0",
        params![campaign_id.to_string()],
    )
}

pub fn get_deal(conn: &Connection, campaign_id: Uuid, mediator_code: &str) -> AppResult<Option<Deal>> {
    let sql = format!(
        "SELECT {DEAL_COLS} FROM deals WHERE campaign_id = ?1 AND mediator_code = ?2"
    );
    Ok(conn
        .query_row(&sql, params![campaign_id.to_string(), mediator_code], row_to_deal)
        .optional()?)
}

/// Overwrites the `assignments` JSON blob (spec §4.5 "assign a partner to
/// a campaign, optionally overriding payout/commission").
pub fn set_assignment(
    conn: &Connection,
    campaign_id: Uuid,
    mediator_code: &str,
    assignment: &Assignment,
) -> AppResult<usize> {
    let mut campaign = get_campaign(conn, campaign_id)?
        .ok_or_else(|| crate::error::AppError::Internal("campaign not found".into()))?;
    campaign.assignments.insert(mediator_code.to_string(), assignment.clone());
    Ok(conn.execute(
        "UPDATE campaigns SET assignments = ?2 WHERE id = ?1 AND deleted_at IS NULL",
        params![campaign_id.to_string(), serde_json::to_string(&campaign.assignments).unwrap()],
    )?)
}

pub fn insert_deal(conn: &Connection, d: &Deal) -> AppResult<()> {
    conn.execute(
        "INSERT INTO deals (id, campaign_id, mediator_code, price_paise, original_price_paise, \
         payout_paise, commission_paise, category, rating, active) \
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
        params![
            d.id.to_string(),
            d.campaign_id.to_string(),
            d.mediator_code,
            d.price_paise,
            d.original_price_paise,
            d.payout_paise,
            d.commission_paise,
            d.category,
            d.rating,
            d.active as i64,
        ],
    )?;
    Ok(())
}
