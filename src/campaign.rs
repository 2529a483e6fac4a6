//! Campaign slot ledger (C5, spec §4.5).

use rusqlite::Connection;
use uuid::Uuid;

use crate::audit::{write_audit_log, WriteAuditLog};
use crate::db::campaign_repo;
use crate::error::{AppError, AppResult};

/// Claims one global slot atomically. The per-partner cap (advisory —
/// a narrow race may allow one overshoot, spec §4.5) is checked
/// separately by the caller via [`check_partner_cap`], since it counts
/// rows rather than a single counter and cannot be folded into one
/// conditional `UPDATE`.
pub fn claim_slot(conn: &Connection, campaign_id: Uuid) -> AppResult<()> {
    let affected = campaign_repo::try_claim_slot(conn, campaign_id)?;
    if affected == 0 {
        return Err(AppError::SoldOut);
    }
    write_audit_log(
        conn,
        WriteAuditLog {
            actor_user_id: None,
            action: "SLOT_CLAIMED",
            entity_type: "campaign",
            entity_id: &campaign_id.to_string(),
            ip: None,
            user_agent: None,
            metadata: None,
        },
    );
    Ok(())
}

pub fn release_slot(conn: &Connection, campaign_id: Uuid) -> AppResult<()> {
    campaign_repo::release_slot(conn, campaign_id)?;
    Ok(())
}

/// Counts active, non-cancelled orders already managed by `mediator_code`
/// against `campaign_id` and compares to the assignment's limit.
pub fn check_partner_cap(
    conn: &Connection,
    campaign_id: Uuid,
    mediator_code: &str,
) -> AppResult<()> {
    let campaign = campaign_repo::get_campaign(conn, campaign_id)?
        .ok_or(AppError::SoldOut)?;

    let Some(assignment) = campaign.assignments.get(mediator_code) else {
        return Ok(());
    };

    let current: i64 = conn.query_row(
        "SELECT COUNT(*) FROM orders o WHERE o.manager_name = ?1 AND o.deleted_at IS NULL \
         AND o.status != 'Cancelled' AND EXISTS ( \
             SELECT 1 FROM json_each(o.items) item \
             WHERE json_extract(item.value, '$.campaign_id') = ?2 \
         )",
        rusqlite::params![mediator_code, campaign_id.to_string()],
        |row| row.get(0),
    )?;

    if current >= assignment.limit() {
        return Err(AppError::SoldOutForPartner);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::new_test_pool;
    use crate::domain::campaign::{Campaign, CampaignStatus};
    use chrono::Utc;
    use std::collections::{HashMap, HashSet};

    fn seed_campaign(conn: &Connection, total_slots: i64) -> Uuid {
        let id = Uuid::new_v4();
        let campaign = Campaign {
            id,
            title: "Test".into(),
            brand_user_id: Uuid::new_v4(),
            original_price_paise: 1000,
            price_paise: 900,
            payout_paise: 150,
            return_window_days: 14,
            deal_type: None,
            total_slots,
            used_slots: 0,
            status: CampaignStatus::Active,
            allowed_agency_codes: HashSet::new(),
            assignments: HashMap::new(),
            locked: false,
            deleted_at: None,
            created_at: Utc::now(),
        };
        campaign_repo::insert_campaign(conn, &campaign).unwrap();
        id
    }

    #[test]
    fn claim_slot_fails_once_exhausted() {
        let pool = new_test_pool();
        let conn = pool.get().unwrap();
        let campaign_id = seed_campaign(&conn, 1);
        claim_slot(&conn, campaign_id).unwrap();
        let err = claim_slot(&conn, campaign_id).unwrap_err();
        assert!(matches!(err, AppError::SoldOut));
    }
}
