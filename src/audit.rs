//! Idempotency & audit log (C2).
//!
//! `write_audit_log` is fire-and-forget from the caller's perspective —
//! generalizes the teacher's best-effort background-task discipline
//! (log and continue, never propagate) to a synchronous write made from
//! inside request handlers.

use chrono::Utc;
use rusqlite::{params, Connection};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::audit::AuditLogEntry;

pub struct WriteAuditLog<'a> {
    pub actor_user_id: Option<Uuid>,
    pub action: &'a str,
    pub entity_type: &'a str,
    pub entity_id: &'a str,
    pub ip: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub metadata: Option<Value>,
}

/// Never returns an error to the caller — a failed audit write is logged
/// and swallowed, per spec §4.2.
pub fn write_audit_log(conn: &Connection, entry: WriteAuditLog) {
    let row = AuditLogEntry {
        id: Uuid::new_v4(),
        actor_user_id: entry.actor_user_id,
        action: entry.action.to_string(),
        entity_type: entry.entity_type.to_string(),
        entity_id: entry.entity_id.to_string(),
        ip: entry.ip.map(String::from),
        user_agent: entry.user_agent.map(String::from),
        metadata: entry.metadata,
        created_at: Utc::now(),
    };

    let result = conn.execute(
        "INSERT INTO audit_logs (id, actor_user_id, action, entity_type, entity_id, ip, \
         user_agent, metadata, created_at) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
        params![
            row.id.to_string(),
            row.actor_user_id.map(|u| u.to_string()),
            row.action,
            row.entity_type,
            row.entity_id,
            row.ip,
            row.user_agent,
            row.metadata.as_ref().map(|m| m.to_string()),
            row.created_at.to_rfc3339(),
        ],
    );

    if let Err(e) = result {
        tracing::error!(
            action = entry.action,
            entity_type = entry.entity_type,
            entity_id = entry.entity_id,
            error = %e,
            "audit log write failed"
        );
    }
}

pub fn list_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> rusqlite::Result<Vec<AuditLogEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, actor_user_id, action, entity_type, entity_id, ip, user_agent, metadata, \
         created_at FROM audit_logs WHERE entity_type = ?1 AND entity_id = ?2 \
         ORDER BY created_at DESC",
    )?;
    let rows = stmt.query_map(params![entity_type, entity_id], |row| {
        let actor: Option<String> = row.get(1)?;
        let metadata: Option<String> = row.get(7)?;
        Ok(AuditLogEntry {
            id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap_or_default(),
            actor_user_id: actor.and_then(|s| Uuid::parse_str(&s).ok()),
            action: row.get(2)?,
            entity_type: row.get(3)?,
            entity_id: row.get(4)?,
            ip: row.get(5)?,
            user_agent: row.get(6)?,
            metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
            created_at: chrono::DateTime::parse_from_rfc3339(&row.get::<_, String>(8)?)
                .unwrap()
                .with_timezone(&Utc),
        })
    })?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::new_test_pool;

    #[test]
    fn write_then_list_round_trips() {
        let pool = new_test_pool();
        let conn = pool.get().unwrap();
        write_audit_log(
            &conn,
            WriteAuditLog {
                actor_user_id: None,
                action: "ORDER_CREATED",
                entity_type: "order",
                entity_id: "order-1",
                ip: Some("127.0.0.1"),
                user_agent: None,
                metadata: None,
            },
        );
        let entries = list_for_entity(&conn, "order", "order-1").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "ORDER_CREATED");
    }
}
