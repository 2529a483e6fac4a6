//! Invite row <-> domain mapping (spec §4.4 C4).

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::domain::invite::{Invite, InviteStatus, InviteUse};
use crate::domain::user::Role;
use crate::error::AppResult;

fn row_to_invite(row: &Row) -> rusqlite::Result<Invite> {
    let uses_json: String = row.get("uses")?;
    let uses: Vec<InviteUse> = serde_json::from_str(&uses_json).unwrap_or_default();
    Ok(Invite {
        id: Uuid::parse_str(&row.get::<_, String>("id")?).unwrap_or_default(),
        code: row.get("code")?,
        role: Role::from_str(&row.get::<_, String>("role")?).unwrap_or(Role::Buyer),
        parent_code: row.get("parent_code")?,
        parent_user_id: row
            .get::<_, Option<String>>("parent_user_id")?
            .and_then(|s| Uuid::parse_str(&s).ok()),
        created_by: Uuid::parse_str(&row.get::<_, String>("created_by")?).unwrap_or_default(),
        status: InviteStatus::from_str(&row.get::<_, String>("status")?)
            .unwrap_or(InviteStatus::Revoked),
        max_uses: row.get("max_uses")?,
        use_count: row.get("use_count")?,
        expires_at: row
            .get::<_, Option<String>>("expires_at")?
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok().map(|d| d.with_timezone(&Utc))),
        uses,
    })
}

const SELECT_COLS: &str = "id, code, role, parent_code, parent_user_id, created_by, status, \
    max_uses, use_count, expires_at, uses";

pub fn insert_invite(conn: &Connection, invite: &Invite) -> AppResult<()> {
    conn.execute(
        "INSERT INTO invites (id, code, role, parent_code, parent_user_id, created_by, status, \
         max_uses, use_count, expires_at, uses) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
        params![
            invite.id.to_string(),
            invite.code,
            invite.role.as_str(),
            invite.parent_code,
            invite.parent_user_id.map(|u| u.to_string()),
            invite.created_by.to_string(),
            invite.status.as_str(),
            invite.max_uses,
            invite.use_count,
            invite.expires_at.map(|d| d.to_rfc3339()),
            serde_json::to_string(&invite.uses).unwrap(),
        ],
    )?;
    Ok(())
}

pub fn get_invite_by_code(conn: &Connection, code: &str) -> AppResult<Option<Invite>> {
    let sql = format!("SELECT {SELECT_COLS} FROM invites WHERE code = ?1");
    Ok(conn.query_row(&sql, params![code], row_to_invite).optional()?)
}

/// Atomically records one use of an invite iff it is still active, not
/// expired, and below its use cap — a single conditional `UPDATE`, no
/// read-then-write (spec §4.4 "invite consumption is atomic"). The
/// `uses[]` append itself happens inside the statement via
/// `json_insert`, the same way `wallet_repo`'s `try_credit`/`try_debit`
/// fold their invariant into the `WHERE` clause: two concurrent callers
/// racing a bounded multi-use invite must never have one overwrite the
/// other's append with a stale snapshot.
pub fn try_consume(
    conn: &Connection,
    code: &str,
    used_by: Uuid,
    used_at: DateTime<Utc>,
    now_rfc3339: &str,
) -> AppResult<usize> {
    let entry_json = serde_json::to_string(&InviteUse { used_by, used_at }).unwrap();

    let affected = conn.execute(
        "UPDATE invites SET use_count = use_count + 1, \
         uses = json_insert(uses, '$[#]', json(?2)), \
         status = CASE WHEN use_count + 1 >= max_uses THEN 'used' ELSE status END \
         WHERE code = ?1 AND status = 'active' AND use_count < max_uses \
         AND (expires_at IS NULL OR expires_at > ?3)",
        params![code, entry_json, now_rfc3339],
    )?;
    Ok(affected)
}

pub fn revoke_invite(conn: &Connection, code: &str) -> AppResult<usize> {
    Ok(conn.execute(
        "UPDATE invites SET status = 'revoked' WHERE code = ?1 AND status = 'active'",
        params![code],
    )?)
}
