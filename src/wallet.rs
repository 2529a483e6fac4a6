//! Wallet ledger (C3, spec §4.3).
//!
//! Every mutation runs the ceiling/floor check inside the same
//! conditional `UPDATE` that changes the balance — never read-then-write
//! — so concurrent credits/debits commute with respect to the balance
//! invariant (spec §5).

use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use crate::audit::{write_audit_log, WriteAuditLog};
use crate::db::wallet_repo;
use crate::domain::wallet::{Transaction, TransactionStatus, WalletMutation};
use crate::error::{AppError, AppResult};

/// Upserts a zero-balance wallet for `owner_user_id`. Concurrent
/// first-creation races are resolved by re-reading the winning row
/// (spec §4.3 "ensureWallet").
pub fn ensure_wallet(conn: &Connection, owner_user_id: Uuid) -> AppResult<Uuid> {
    if let Some(w) = wallet_repo::get_wallet_by_owner(conn, owner_user_id)? {
        return Ok(w.id);
    }
    let wallet = crate::domain::wallet::Wallet {
        id: Uuid::new_v4(),
        owner_user_id,
        available_paise: 0,
        pending_paise: 0,
        locked_paise: 0,
        version: 0,
        deleted_at: None,
    };
    match wallet_repo::insert_wallet(conn, &wallet) {
        Ok(_) => Ok(wallet.id),
        Err(_) => {
            // Lost the race to create; the winner's row is now visible.
            wallet_repo::get_wallet_by_owner(conn, owner_user_id)?
                .map(|w| w.id)
                .ok_or(AppError::WalletNotFound)
        }
    }
}

fn validate_amount(amount_paise: i64) -> AppResult<()> {
    if amount_paise <= 0 {
        return Err(AppError::InvalidAmount);
    }
    Ok(())
}

/// Credits `mutation.owner_user_id`'s wallet, or replays the prior
/// Transaction unchanged if `mutation.idempotency_key` was already used
/// (spec §4.3 invariant 4).
pub fn apply_wallet_credit(
    conn: &Connection,
    mutation: WalletMutation,
    max_balance_paise: i64,
) -> AppResult<Transaction> {
    validate_amount(mutation.amount_paise)?;

    if let Some(existing) =
        wallet_repo::get_transaction_by_idempotency_key(conn, &mutation.idempotency_key)?
    {
        return Ok(existing);
    }

    let wallet_id = wallet_repo::get_wallet_by_owner(conn, mutation.owner_user_id)?
        .map(|w| w.id)
        .ok_or(AppError::WalletNotFound)?;

    let affected = wallet_repo::try_credit(
        conn,
        wallet_id,
        mutation.amount_paise,
        max_balance_paise,
    )?;
    if affected == 0 {
        // Distinguish "wallet gone" from "would exceed ceiling" without a
        // second read-then-write on the balance itself.
        return match wallet_repo::get_wallet_by_owner(conn, mutation.owner_user_id)? {
            Some(w) if w.deleted_at.is_some() => Err(AppError::WalletDeleted),
            Some(_) => Err(AppError::BalanceLimitExceeded),
            None => Err(AppError::WalletNotFound),
        };
    }

    let tx = Transaction {
        id: Uuid::new_v4(),
        idempotency_key: mutation.idempotency_key,
        kind: mutation.kind,
        status: TransactionStatus::Completed,
        amount_paise: mutation.amount_paise,
        wallet_id: Some(wallet_id),
        from_user_id: mutation.from_user_id,
        to_user_id: mutation.to_user_id.or(Some(mutation.owner_user_id)),
        order_id: mutation.order_id,
        campaign_id: mutation.campaign_id,
        payout_id: mutation.payout_id,
        metadata: mutation.metadata,
        created_at: Utc::now(),
    };
    wallet_repo::insert_transaction(conn, &tx)?;

    write_audit_log(
        conn,
        WriteAuditLog {
            actor_user_id: mutation.from_user_id.or(mutation.to_user_id),
            action: "WALLET_CREDIT",
            entity_type: "wallet",
            entity_id: &wallet_id.to_string(),
            ip: None,
            user_agent: None,
            metadata: Some(serde_json::json!({ "kind": tx.kind.as_str(), "amountPaise": tx.amount_paise })),
        },
    );
    tracing::info!(wallet_id = %wallet_id, amount_paise = tx.amount_paise, kind = tx.kind.as_str(), "wallet credit applied");

    Ok(tx)
}

/// Debits `mutation.owner_user_id`'s wallet, or replays the prior
/// Transaction unchanged if already applied.
pub fn apply_wallet_debit(conn: &Connection, mutation: WalletMutation) -> AppResult<Transaction> {
    validate_amount(mutation.amount_paise)?;

    if let Some(existing) =
        wallet_repo::get_transaction_by_idempotency_key(conn, &mutation.idempotency_key)?
    {
        return Ok(existing);
    }

    let wallet_id = wallet_repo::get_wallet_by_owner(conn, mutation.owner_user_id)?
        .map(|w| w.id)
        .ok_or(AppError::WalletNotFound)?;

    let affected = wallet_repo::try_debit(conn, wallet_id, mutation.amount_paise)?;
    if affected == 0 {
        return match wallet_repo::get_wallet_by_owner(conn, mutation.owner_user_id)? {
            Some(w) if w.deleted_at.is_some() => Err(AppError::WalletDeleted),
            Some(_) => Err(AppError::InsufficientFunds),
            None => Err(AppError::WalletNotFound),
        };
    }

    let tx = Transaction {
        id: Uuid::new_v4(),
        idempotency_key: mutation.idempotency_key,
        kind: mutation.kind,
        status: TransactionStatus::Completed,
        amount_paise: mutation.amount_paise,
        wallet_id: Some(wallet_id),
        from_user_id: mutation.from_user_id.or(Some(mutation.owner_user_id)),
        to_user_id: mutation.to_user_id,
        order_id: mutation.order_id,
        campaign_id: mutation.campaign_id,
        payout_id: mutation.payout_id,
        metadata: mutation.metadata,
        created_at: Utc::now(),
    };
    wallet_repo::insert_transaction(conn, &tx)?;

    write_audit_log(
        conn,
        WriteAuditLog {
            actor_user_id: mutation.to_user_id.or(mutation.from_user_id),
            action: "WALLET_DEBIT",
            entity_type: "wallet",
            entity_id: &wallet_id.to_string(),
            ip: None,
            user_agent: None,
            metadata: Some(serde_json::json!({ "kind": tx.kind.as_str(), "amountPaise": tx.amount_paise })),
        },
    );
    tracing::info!(wallet_id = %wallet_id, amount_paise = tx.amount_paise, kind = tx.kind.as_str(), "wallet debit applied");

    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::new_test_pool;
    use crate::domain::wallet::TransactionType;

    fn mutation(key: &str, owner: Uuid, amount: i64) -> WalletMutation {
        WalletMutation {
            idempotency_key: key.to_string(),
            kind: TransactionType::BrandDeposit,
            owner_user_id: owner,
            amount_paise: amount,
            from_user_id: None,
            to_user_id: None,
            order_id: None,
            campaign_id: None,
            payout_id: None,
            metadata: None,
        }
    }

    #[test]
    fn credit_then_debit_round_trips() {
        let pool = new_test_pool();
        let conn = pool.get().unwrap();
        let owner = Uuid::new_v4();
        ensure_wallet(&conn, owner).unwrap();

        let tx = apply_wallet_credit(&conn, mutation("credit-1", owner, 500), 10_000).unwrap();
        assert_eq!(tx.amount_paise, 500);

        let w = wallet_repo::get_wallet_by_owner(&conn, owner).unwrap().unwrap();
        assert_eq!(w.available_paise, 500);

        let debit = apply_wallet_debit(
            &conn,
            WalletMutation {
                kind: TransactionType::Refund,
                ..mutation("debit-1", owner, 200)
            },
        )
        .unwrap();
        assert_eq!(debit.amount_paise, 200);
        let w = wallet_repo::get_wallet_by_owner(&conn, owner).unwrap().unwrap();
        assert_eq!(w.available_paise, 300);
    }

    #[test]
    fn debit_below_zero_fails_insufficient_funds() {
        let pool = new_test_pool();
        let conn = pool.get().unwrap();
        let owner = Uuid::new_v4();
        ensure_wallet(&conn, owner).unwrap();
        let err = apply_wallet_debit(&conn, mutation("debit-2", owner, 100)).unwrap_err();
        assert!(matches!(err, AppError::InsufficientFunds));
    }

    #[test]
    fn credit_past_ceiling_fails() {
        let pool = new_test_pool();
        let conn = pool.get().unwrap();
        let owner = Uuid::new_v4();
        ensure_wallet(&conn, owner).unwrap();
        let err = apply_wallet_credit(&conn, mutation("credit-2", owner, 200), 100).unwrap_err();
        assert!(matches!(err, AppError::BalanceLimitExceeded));
    }

    #[test]
    fn replayed_idempotency_key_is_single_mutation() {
        let pool = new_test_pool();
        let conn = pool.get().unwrap();
        let owner = Uuid::new_v4();
        ensure_wallet(&conn, owner).unwrap();
        apply_wallet_credit(&conn, mutation("replay-1", owner, 100), 10_000).unwrap();
        apply_wallet_credit(&conn, mutation("replay-1", owner, 100), 10_000).unwrap();
        let w = wallet_repo::get_wallet_by_owner(&conn, owner).unwrap().unwrap();
        assert_eq!(w.available_paise, 100);
    }
}
