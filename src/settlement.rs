//! Settlement orchestrator (C7, spec §4.7).
//!
//! Every step of settle/unsettle/payout shares one idempotency namespace
//! keyed by `orderId`, so a replayed API call is safe by construction
//! (spec §8 S3). All mutations here run against one connection checked
//! out for the whole unit of work — callers are expected to wrap the
//! call in a `rusqlite::Transaction` when composing it with other
//! entities (spec §5 "transactional discipline").

use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use crate::audit::{write_audit_log, WriteAuditLog};
use crate::db::{order_repo, user_repo};
use crate::domain::order::{AffiliateStatus, Order, OrderEvent, PaymentStatus, SettlementMode};
use crate::domain::user::UserStatus;
use crate::domain::wallet::{Transaction, TransactionType, WalletMutation};
use crate::error::{AppError, AppResult};
use crate::wallet;

fn has_open_dispute(conn: &Connection, order_id: Uuid) -> AppResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM tickets WHERE order_id = ?1 AND open = 1",
        rusqlite::params![order_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Buyer must be active; a suspended/soft-deleted buyer is treated the
/// same as a missing user row — neither can receive a settlement.
fn buyer_is_active(conn: &Connection, buyer_user_id: Uuid) -> AppResult<bool> {
    Ok(matches!(
        user_repo::get_user_by_id(conn, buyer_user_id)?,
        Some(user) if user.status == UserStatus::Active
    ))
}

/// Sums the payout/commission split across every order item, resolving
/// each one via [`resolve_split`]. Shared by `settle_order` and
/// `unsettle_order` so a reversal always undoes exactly what settlement
/// moved, never the order's gross total.
fn settlement_totals(conn: &Connection, order: &Order) -> AppResult<(i64, i64)> {
    let mut total_payout = 0i64;
    let mut total_commission = 0i64;
    for item in &order.items {
        let (payout, commission) = resolve_split(
            conn,
            item.campaign_id,
            order.manager_name.as_deref(),
            item.commission_paise,
        )?;
        total_payout += payout;
        total_commission += commission;
    }
    Ok((total_payout, total_commission))
}

/// Determines the payout/commission split for one order item, honoring
/// the spec's documented preference (§9 open question): a campaign's
/// `Deal` row wins when present, otherwise the assignment object,
/// otherwise the campaign's own `payoutPaise` for the payout side (an
/// `OrderItem` carries no payout snapshot of its own, only commission)
/// and the item-level commission snapshot taken at order creation.
fn resolve_split(
    conn: &Connection,
    campaign_id: Uuid,
    mediator_code: Option<&str>,
    item_commission_paise: i64,
) -> AppResult<(i64, i64)> {
    let campaign = crate::db::campaign_repo::get_campaign(conn, campaign_id)?;
    let campaign_payout_paise = campaign
        .as_ref()
        .map(|c| c.payout_paise)
        .unwrap_or(item_commission_paise);

    if let Some(code) = mediator_code {
        if let Some(deal) = crate::db::campaign_repo::get_deal(conn, campaign_id, code)? {
            return Ok((deal.payout_paise, deal.commission_paise));
        }
        if let Some(campaign) = &campaign {
            if let Some(assignment) = campaign.assignments.get(code) {
                let payout = assignment.payout_paise().unwrap_or(campaign_payout_paise);
                let commission = assignment.commission_paise().unwrap_or(item_commission_paise);
                return Ok((payout, commission));
            }
        }
    }
    Ok((campaign_payout_paise, item_commission_paise))
}

/// Approves and settles an order within one idempotency namespace keyed
/// by `orderId` (spec §4.7).
pub fn settle_order(
    conn: &Connection,
    order_id: Uuid,
    max_wallet_balance_paise: i64,
) -> AppResult<Order> {
    let mut order = order_repo::get_order(conn, order_id)?.ok_or(AppError::InvalidOrderId)?;

    if order.affiliate_status.is_terminal() {
        // Already settled/finalized; replay is a no-op success.
        return Ok(order);
    }

    if has_open_dispute(conn, order_id)? {
        order.affiliate_status = AffiliateStatus::FrozenDisputed;
        order.frozen = true;
        order.frozen_at = Some(Utc::now());
        order.frozen_reason = Some("open dispute ticket".into());
        order_repo::update_order(conn, &order)?;
        return Err(AppError::OrderFrozen);
    }

    if !buyer_is_active(conn, order.user_id)? {
        order.affiliate_status = AffiliateStatus::FrozenDisputed;
        order.frozen = true;
        order.frozen_at = Some(Utc::now());
        order.frozen_reason = Some("buyer not active".into());
        order_repo::update_order(conn, &order)?;
        return Err(AppError::OrderFrozen);
    }

    let idem_ns = format!("settle:{order_id}");

    let (total_payout, total_commission) = settlement_totals(conn, &order)?;
    // No tracked margin field on the order (spec §3); the brand is only
    // ever debited what actually leaves the wallet: payout + commission.
    let debit_total = total_payout + total_commission;

    wallet::ensure_wallet(conn, order.brand_user_id)?;
    wallet::apply_wallet_debit(
        conn,
        WalletMutation {
            idempotency_key: format!("{idem_ns}:debit"),
            kind: TransactionType::OrderSettlementDebit,
            owner_user_id: order.brand_user_id,
            amount_paise: debit_total.max(1),
            from_user_id: Some(order.brand_user_id),
            to_user_id: None,
            order_id: Some(order_id),
            campaign_id: None,
            payout_id: None,
            metadata: None,
        },
    )?;

    wallet::ensure_wallet(conn, order.user_id)?;
    wallet::apply_wallet_credit(
        conn,
        WalletMutation {
            idempotency_key: format!("{idem_ns}:buyer_credit"),
            kind: TransactionType::CashbackSettle,
            owner_user_id: order.user_id,
            amount_paise: total_payout.max(1),
            from_user_id: Some(order.brand_user_id),
            to_user_id: Some(order.user_id),
            order_id: Some(order_id),
            campaign_id: None,
            payout_id: None,
            metadata: None,
        },
        max_wallet_balance_paise,
    )?;

    if let Some(mediator_code) = order.manager_name.clone() {
        if let Some(mediator) =
            crate::db::user_repo::get_user_by_mediator_code(conn, &mediator_code)?
        {
            wallet::ensure_wallet(conn, mediator.id)?;
            wallet::apply_wallet_credit(
                conn,
                WalletMutation {
                    idempotency_key: format!("{idem_ns}:mediator_credit"),
                    kind: TransactionType::CommissionSettle,
                    owner_user_id: mediator.id,
                    amount_paise: total_commission.max(1),
                    from_user_id: Some(order.brand_user_id),
                    to_user_id: Some(mediator.id),
                    order_id: Some(order_id),
                    campaign_id: None,
                    payout_id: None,
                    metadata: None,
                },
                max_wallet_balance_paise,
            )?;
        }
    }

    order.affiliate_status = AffiliateStatus::ApprovedSettled;
    order.payment_status = PaymentStatus::Paid;
    order.settlement_mode = Some(SettlementMode::Wallet);
    order.settlement_ref = Some(idem_ns.clone());
    order.events.push(OrderEvent {
        kind: "SETTLED".into(),
        at: Utc::now(),
        actor_user_id: None,
        metadata: None,
    });
    order.updated_at = Utc::now();
    order_repo::update_order(conn, &order)?;

    write_audit_log(
        conn,
        WriteAuditLog {
            actor_user_id: None,
            action: "SETTLED",
            entity_type: "order",
            entity_id: &order_id.to_string(),
            ip: None,
            user_agent: None,
            metadata: None,
        },
    );

    Ok(order)
}

/// Reverses steps 2–4 of settlement with matching reversal transaction
/// types, guarded by idempotency on `unsettle:<orderId>`.
///
/// Open question (spec §9): whether unsettlement should transition an
/// order out of `Cap_Exceeded` is undefined upstream. Chosen behavior,
/// recorded in DESIGN.md: unsettlement never touches `Cap_Exceeded`
/// orders — that status is left for an explicit admin override.
pub fn unsettle_order(conn: &Connection, order_id: Uuid) -> AppResult<Order> {
    let mut order = order_repo::get_order(conn, order_id)?.ok_or(AppError::InvalidOrderId)?;

    if order.affiliate_status == AffiliateStatus::CapExceeded {
        return Err(AppError::OrderFinalized);
    }
    if order.affiliate_status != AffiliateStatus::ApprovedSettled {
        return Ok(order);
    }

    let idem_ns = format!("unsettle:{order_id}");
    let (total_payout, total_commission) = settlement_totals(conn, &order)?;

    if let Some(mediator_code) = order.manager_name.clone() {
        if let Some(mediator) =
            crate::db::user_repo::get_user_by_mediator_code(conn, &mediator_code)?
        {
            wallet::apply_wallet_debit(
                conn,
                WalletMutation {
                    idempotency_key: format!("{idem_ns}:mediator_reversal"),
                    kind: TransactionType::CommissionReversal,
                    owner_user_id: mediator.id,
                    amount_paise: total_commission.max(1),
                    from_user_id: Some(mediator.id),
                    to_user_id: Some(order.brand_user_id),
                    order_id: Some(order_id),
                    campaign_id: None,
                    payout_id: None,
                    metadata: None,
                },
            )?;
        }
    }

    // Credits back exactly what settlement debited (payout + commission),
    // never the order's gross total — there is no tracked margin field.
    let reversal_credit = (total_payout + total_commission).max(1);
    wallet::ensure_wallet(conn, order.brand_user_id)?;
    wallet::apply_wallet_credit(
        conn,
        WalletMutation {
            idempotency_key: format!("{idem_ns}:margin_reversal"),
            kind: TransactionType::MarginReversal,
            owner_user_id: order.brand_user_id,
            amount_paise: reversal_credit,
            from_user_id: None,
            to_user_id: Some(order.brand_user_id),
            order_id: Some(order_id),
            campaign_id: None,
            payout_id: None,
            metadata: None,
        },
        i64::MAX,
    )?;

    order.affiliate_status = AffiliateStatus::Unchecked;
    order.payment_status = PaymentStatus::Refunded;
    order.events.push(OrderEvent {
        kind: "UNSETTLED".into(),
        at: Utc::now(),
        actor_user_id: None,
        metadata: None,
    });
    order.updated_at = Utc::now();
    order_repo::update_order(conn, &order)?;

    write_audit_log(
        conn,
        WriteAuditLog {
            actor_user_id: None,
            action: "UNSETTLED",
            entity_type: "order",
            entity_id: &order_id.to_string(),
            ip: None,
            user_agent: None,
            metadata: None,
        },
    );

    Ok(order)
}

/// Composes {payout row (requested), wallet debit, transaction record}
/// atomically (spec §4.7 "Payout creation").
pub fn request_payout(
    conn: &Connection,
    user_id: Uuid,
    amount_paise: i64,
    idempotency_key: &str,
) -> AppResult<(Uuid, Transaction)> {
    let payout_id = Uuid::new_v4();
    let now = Utc::now();

    conn.execute(
        "INSERT INTO payouts (id, user_id, amount_paise, status, provider, provider_ref, \
         created_at, updated_at) VALUES (?1,?2,?3,'requested',NULL,NULL,?4,?4)",
        rusqlite::params![payout_id.to_string(), user_id.to_string(), amount_paise, now.to_rfc3339()],
    )?;

    let tx = wallet::apply_wallet_debit(
        conn,
        WalletMutation {
            idempotency_key: idempotency_key.to_string(),
            kind: TransactionType::PayoutRequest,
            owner_user_id: user_id,
            amount_paise,
            from_user_id: Some(user_id),
            to_user_id: None,
            order_id: None,
            campaign_id: None,
            payout_id: Some(payout_id),
            metadata: None,
        },
    )?;

    Ok((payout_id, tx))
}

/// Provider callback marking a payout `paid`.
pub fn complete_payout(conn: &Connection, payout_id: Uuid) -> AppResult<()> {
    conn.execute(
        "UPDATE payouts SET status = 'paid', updated_at = ?2 WHERE id = ?1 AND status = 'requested'",
        rusqlite::params![payout_id.to_string(), Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

/// Provider callback marking a payout `failed` and crediting the wallet
/// back (spec §4.7).
pub fn fail_payout(
    conn: &Connection,
    payout_id: Uuid,
    user_id: Uuid,
    amount_paise: i64,
    max_wallet_balance_paise: i64,
) -> AppResult<()> {
    let affected = conn.execute(
        "UPDATE payouts SET status = 'failed', updated_at = ?2 WHERE id = ?1 AND status = 'requested'",
        rusqlite::params![payout_id.to_string(), Utc::now().to_rfc3339()],
    )?;
    if affected == 0 {
        return Ok(());
    }
    wallet::apply_wallet_credit(
        conn,
        WalletMutation {
            idempotency_key: format!("payout:{payout_id}:refund"),
            kind: TransactionType::PayoutFailed,
            owner_user_id: user_id,
            amount_paise,
            from_user_id: None,
            to_user_id: Some(user_id),
            order_id: None,
            campaign_id: None,
            payout_id: Some(payout_id),
            metadata: None,
        },
        max_wallet_balance_paise,
    )?;
    Ok(())
}
