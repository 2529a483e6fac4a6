//! Wallet & transaction row <-> domain mapping (spec §4.3 C3).

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::domain::wallet::{Transaction, TransactionStatus, TransactionType, Wallet};
use crate::error::AppResult;

fn row_to_wallet(row: &Row) -> rusqlite::Result<Wallet> {
    let deleted: Option<String> = row.get("deleted_at")?;
    Ok(Wallet {
        id: Uuid::parse_str(&row.get::<_, String>("id")?).unwrap_or_default(),
        owner_user_id: Uuid::parse_str(&row.get::<_, String>("owner_user_id")?).unwrap_or_default(),
        available_paise: row.get("available_paise")?,
        pending_paise: row.get("pending_paise")?,
        locked_paise: row.get("locked_paise")?,
        version: row.get("version")?,
        deleted_at: deleted.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|d| d.with_timezone(&Utc))
        }),
    })
}

fn row_to_transaction(row: &Row) -> rusqlite::Result<Transaction> {
    let metadata: Option<String> = row.get("metadata")?;
    Ok(Transaction {
        id: Uuid::parse_str(&row.get::<_, String>("id")?).unwrap_or_default(),
        idempotency_key: row.get("idempotency_key")?,
        kind: TransactionType::from_str(&row.get::<_, String>("kind")?)
            .unwrap_or(TransactionType::Refund),
        status: TransactionStatus::from_str(&row.get::<_, String>("status")?)
            .unwrap_or(TransactionStatus::Failed),
        amount_paise: row.get("amount_paise")?,
        wallet_id: row
            .get::<_, Option<String>>("wallet_id")?
            .and_then(|s| Uuid::parse_str(&s).ok()),
        from_user_id: row
            .get::<_, Option<String>>("from_user_id")?
            .and_then(|s| Uuid::parse_str(&s).ok()),
        to_user_id: row
            .get::<_, Option<String>>("to_user_id")?
            .and_then(|s| Uuid::parse_str(&s).ok()),
        order_id: row
            .get::<_, Option<String>>("order_id")?
            .and_then(|s| Uuid::parse_str(&s).ok()),
        campaign_id: row
            .get::<_, Option<String>>("campaign_id")?
            .and_then(|s| Uuid::parse_str(&s).ok()),
        payout_id: row
            .get::<_, Option<String>>("payout_id")?
            .and_then(|s| Uuid::parse_str(&s).ok()),
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
        created_at: DateTime::parse_from_rfc3339(&row.get::<_, String>("created_at")?)
            .unwrap()
            .with_timezone(&Utc),
    })
}

const WALLET_COLS: &str = "id, owner_user_id, available_paise, pending_paise, locked_paise, version, deleted_at";
const TX_COLS: &str = "id, idempotency_key, kind, status, amount_paise, wallet_id, from_user_id, \
    to_user_id, order_id, campaign_id, payout_id, metadata, created_at";

pub fn get_wallet_by_owner(conn: &Connection, owner_user_id: Uuid) -> AppResult<Option<Wallet>> {
    let sql = format!("SELECT {WALLET_COLS} FROM wallets WHERE owner_user_id = ?1");
    Ok(conn
        .query_row(&sql, params![owner_user_id.to_string()], row_to_wallet)
        .optional()?)
}

pub fn insert_wallet(conn: &Connection, wallet: &Wallet) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT OR IGNORE INTO wallets (id, owner_user_id, available_paise, pending_paise, \
         locked_paise, version, deleted_at) VALUES (?1,?2,0,0,0,0,NULL)",
        params![wallet.id.to_string(), wallet.owner_user_id.to_string()],
    )
}

pub fn get_transaction_by_idempotency_key(
    conn: &Connection,
    key: &str,
) -> AppResult<Option<Transaction>> {
    let sql = format!("SELECT {TX_COLS} FROM transactions WHERE idempotency_key = ?1");
    Ok(conn
        .query_row(&sql, params![key], row_to_transaction)
        .optional()?)
}

/// Conditionally increments `available_paise` iff it would not exceed `max`.
/// Returns the number of rows affected (0 or 1) — caller interprets 0 as
/// either "wallet missing" or "ceiling exceeded" per spec §4.3.
pub fn try_credit(conn: &Connection, wallet_id: Uuid, amount_paise: i64, max: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE wallets SET available_paise = available_paise + ?2, version = version + 1 \
         WHERE id = ?1 AND deleted_at IS NULL AND available_paise <= ?3 - ?2",
        params![wallet_id.to_string(), amount_paise, max],
    )
}

/// Conditionally decrements `available_paise` iff sufficient funds exist.
pub fn try_debit(conn: &Connection, wallet_id: Uuid, amount_paise: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE wallets SET available_paise = available_paise - ?2, version = version + 1 \
         WHERE id = ?1 AND deleted_at IS NULL AND available_paise >= ?2",
        params![wallet_id.to_string(), amount_paise],
    )
}

pub fn insert_transaction(conn: &Connection, tx: &Transaction) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO transactions (id, idempotency_key, kind, status, amount_paise, wallet_id, \
         from_user_id, to_user_id, order_id, campaign_id, payout_id, metadata, created_at) \
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
        params![
            tx.id.to_string(),
            tx.idempotency_key,
            tx.kind.as_str(),
            tx.status.as_str(),
            tx.amount_paise,
            tx.wallet_id.map(|u| u.to_string()),
            tx.from_user_id.map(|u| u.to_string()),
            tx.to_user_id.map(|u| u.to_string()),
            tx.order_id.map(|u| u.to_string()),
            tx.campaign_id.map(|u| u.to_string()),
            tx.payout_id.map(|u| u.to_string()),
            tx.metadata.as_ref().map(|m| m.to_string()),
            tx.created_at.to_rfc3339(),
        ],
    )
}
