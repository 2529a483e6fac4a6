//! Order workflow engine (C6, spec §4.6).

use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use crate::audit::{write_audit_log, WriteAuditLog};
use crate::campaign;
use crate::db::order_repo;
use crate::domain::order::{
    AffiliateStatus, Order, OrderEvent, ProofType, VerifiedBy, WorkflowStatus,
};
use crate::error::{AppError, AppResult};

pub struct TransitionInput {
    pub order_id: Uuid,
    pub from: WorkflowStatus,
    pub to: WorkflowStatus,
    pub actor_user_id: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
}

/// Atomic compare-and-set on `workflow_status` (spec §4.6). Appends an
/// event and persists regardless of whether the transition itself was
/// legal on the abstract graph — legality is the caller's job via
/// `WorkflowStatus::can_transition_to`; this function only guards against
/// lost updates under concurrency.
pub fn transition_order_workflow(conn: &Connection, input: TransitionInput) -> AppResult<Order> {
    let mut order = order_repo::get_order(conn, input.order_id)?
        .ok_or(AppError::InvalidOrderId)?;

    if order.frozen {
        return Err(AppError::OrderFrozen);
    }
    if !input.from.can_transition_to(input.to) {
        return Err(AppError::InvalidWorkflowState {
            expected: input.from.as_str().to_string(),
            observed: order.workflow_status.as_str().to_string(),
        });
    }

    let affected = order_repo::try_transition(conn, input.order_id, input.from, input.to)?;
    if affected == 0 {
        let current = order_repo::get_order(conn, input.order_id)?
            .ok_or(AppError::InvalidOrderId)?;
        return Err(AppError::InvalidWorkflowState {
            expected: input.from.as_str().to_string(),
            observed: current.workflow_status.as_str().to_string(),
        });
    }

    order.workflow_status = input.to;
    order.events.push(OrderEvent {
        kind: input.to.as_str().to_string(),
        at: Utc::now(),
        actor_user_id: input.actor_user_id,
        metadata: input.metadata,
    });
    order.updated_at = Utc::now();
    order_repo::update_order(conn, &order)?;

    write_audit_log(
        conn,
        WriteAuditLog {
            actor_user_id: input.actor_user_id,
            action: "WORKFLOW_TRANSITION",
            entity_type: "order",
            entity_id: &order.id.to_string(),
            ip: None,
            user_agent: None,
            metadata: Some(serde_json::json!({
                "from": input.from.as_str(),
                "to": input.to.as_str(),
            })),
        },
    );

    Ok(order)
}

pub fn freeze_order(conn: &Connection, order_id: Uuid, reason: &str) -> AppResult<Order> {
    let mut order = order_repo::get_order(conn, order_id)?.ok_or(AppError::InvalidOrderId)?;
    order.frozen = true;
    order.frozen_at = Some(Utc::now());
    order.frozen_reason = Some(reason.to_string());
    order.events.push(OrderEvent {
        kind: "FROZEN".into(),
        at: Utc::now(),
        actor_user_id: None,
        metadata: Some(serde_json::json!({ "reason": reason })),
    });
    order.updated_at = Utc::now();
    order_repo::update_order(conn, &order)?;
    Ok(order)
}

/// The only state-changing operation permitted while `frozen` (spec §8
/// invariant 8).
pub fn reactivate_order(conn: &Connection, order_id: Uuid) -> AppResult<Order> {
    let mut order = order_repo::get_order(conn, order_id)?.ok_or(AppError::InvalidOrderId)?;
    order.frozen = false;
    order.reactivated_at = Some(Utc::now());
    order.events.push(OrderEvent {
        kind: "REACTIVATED".into(),
        at: Utc::now(),
        actor_user_id: None,
        metadata: None,
    });
    order.updated_at = Utc::now();
    order_repo::update_order(conn, &order)?;
    Ok(order)
}

/// Validates a proof type may be submitted given the order's deal
/// composition and the gating rules of spec §4.6, without yet marking
/// it verified.
pub fn validate_proof_submission(order: &Order, proof_type: ProofType) -> AppResult<()> {
    if order.frozen {
        return Err(AppError::OrderFrozen);
    }
    if !order.required_proof_types().contains(&proof_type) {
        return Err(AppError::NotRequired);
    }

    match proof_type {
        ProofType::Review | ProofType::Rating => {
            if !order.verification.order.is_verified() {
                return Err(AppError::PurchaseNotVerified);
            }
        }
        ProofType::ReturnWindow => {
            let needs_rating = order.required_proof_types().contains(&ProofType::Rating);
            let needs_review = order.required_proof_types().contains(&ProofType::Review);
            if needs_rating && !order.verification.rating.is_verified() {
                return Err(AppError::RatingNotVerified);
            }
            if needs_review && !order.verification.review.is_verified() {
                return Err(AppError::ReviewNotVerified);
            }
        }
        ProofType::Order => {}
    }
    Ok(())
}

/// Records AI confidence for a proof step and, when it meets
/// `AI_AUTO_VERIFY_THRESHOLD` while the order sits in `UNDER_REVIEW`,
/// marks the step verified by `SYSTEM_AI` (spec §4.6 "auto-verify").
pub fn record_proof_confidence(
    conn: &Connection,
    order_id: Uuid,
    proof_type: ProofType,
    confidence: u8,
    auto_verify_threshold: u8,
) -> AppResult<Order> {
    let mut order = order_repo::get_order(conn, order_id)?.ok_or(AppError::InvalidOrderId)?;
    if order.frozen {
        return Err(AppError::OrderFrozen);
    }

    let step = order.verification.get_mut(proof_type);
    step.ai_confidence_score = Some(confidence);

    if order.workflow_status == WorkflowStatus::UnderReview
        && confidence >= auto_verify_threshold
        && !order.verification.get(proof_type).is_verified()
    {
        let step = order.verification.get_mut(proof_type);
        step.verified_at = Some(Utc::now());
        step.verified_by = Some(VerifiedBy::SystemAi);
        step.auto_verified = true;
        order.events.push(OrderEvent {
            kind: "VERIFIED".into(),
            at: Utc::now(),
            actor_user_id: None,
            metadata: Some(serde_json::json!({ "proofType": proof_type.as_str(), "confidence": confidence })),
        });
    }
    order.updated_at = Utc::now();
    order_repo::update_order(conn, &order)?;

    try_finalize(conn, order.id)
}

/// Transitions `UNDER_REVIEW → APPROVED` once every proof type the
/// order's deal composition requires is verified; otherwise a no-op.
pub fn try_finalize(conn: &Connection, order_id: Uuid) -> AppResult<Order> {
    let order = order_repo::get_order(conn, order_id)?.ok_or(AppError::InvalidOrderId)?;
    if order.workflow_status != WorkflowStatus::UnderReview || !order.all_required_steps_verified() {
        return Ok(order);
    }

    transition_order_workflow(
        conn,
        TransitionInput {
            order_id,
            from: WorkflowStatus::UnderReview,
            to: WorkflowStatus::Approved,
            actor_user_id: None,
            metadata: None,
        },
    )
}

/// Duplicate / velocity guards run at order-creation time (spec §4.6).
pub fn check_creation_guards(
    conn: &Connection,
    buyer_id: Uuid,
    product_id: &str,
    external_order_id: Option<&str>,
    pre_order_id: Option<Uuid>,
) -> AppResult<()> {
    if let Some(ext_id) = external_order_id {
        if order_repo::get_order_by_external_id(conn, ext_id)?.is_some() {
            return Err(AppError::DuplicateExternalOrderId);
        }
    }

    if pre_order_id.is_none() {
        let existing = order_repo::list_orders_by_user(conn, buyer_id)?;
        let has_non_terminal_for_product = existing.iter().any(|o| {
            !o.workflow_status.is_terminal()
                && o.items.iter().any(|i| i.product_id == product_id)
        });
        if has_non_terminal_for_product {
            return Err(AppError::DuplicateDealOrder);
        }
    }

    let now = Utc::now();
    let hour_ago = now - chrono::Duration::hours(1);
    let day_ago = now - chrono::Duration::days(1);
    let existing = order_repo::list_orders_by_user(conn, buyer_id)?;
    let last_hour = existing.iter().filter(|o| o.created_at >= hour_ago).count();
    let last_day = existing.iter().filter(|o| o.created_at >= day_ago).count();
    if last_hour >= 10 || last_day >= 30 {
        return Err(AppError::VelocityLimit);
    }

    Ok(())
}

/// Frees the campaign slot claimed at creation time without advancing
/// `workflow_status` — used when a non-terminal order finally lands in
/// REJECTED/FAILED (settlement orchestrator owns slot release per
/// spec §4.7, never the workflow engine itself).
pub fn release_order_slots(conn: &Connection, order: &Order) -> AppResult<()> {
    for item in &order.items {
        campaign::release_slot(conn, item.campaign_id)?;
    }
    Ok(())
}

pub fn lock_affiliate_status(order: &Order) -> bool {
    order.affiliate_status.is_terminal()
}

pub fn mark_cap_exceeded(conn: &Connection, order_id: Uuid) -> AppResult<Order> {
    let mut order = order_repo::get_order(conn, order_id)?.ok_or(AppError::InvalidOrderId)?;
    order.affiliate_status = AffiliateStatus::CapExceeded;
    order.updated_at = Utc::now();
    order_repo::update_order(conn, &order)?;
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{new_test_pool, order_repo};
    use crate::domain::campaign::DealType;
    use crate::domain::order::{
        AffiliateStatus, OrderItem, OrderStatus, PaymentStatus, SettlementMode, Verification,
    };

    fn seed_order(conn: &Connection, deal_type: Option<DealType>) -> Uuid {
        let id = Uuid::new_v4();
        let order = Order {
            id,
            user_id: Uuid::new_v4(),
            brand_user_id: Uuid::new_v4(),
            items: vec![OrderItem {
                product_id: "p1".into(),
                title: "T".into(),
                image: None,
                price_at_purchase_paise: 900,
                commission_paise: 50,
                campaign_id: Uuid::new_v4(),
                quantity: 1,
                deal_type,
                platform: None,
                brand_name: None,
            }],
            total_paise: 900,
            workflow_status: WorkflowStatus::UnderReview,
            status: OrderStatus::Ordered,
            payment_status: PaymentStatus::Pending,
            affiliate_status: AffiliateStatus::Unchecked,
            frozen: false,
            frozen_at: None,
            frozen_reason: None,
            reactivated_at: None,
            external_order_id: None,
            review_link: None,
            verification: Verification::default(),
            rejection: None,
            missing_proof_requests: vec![],
            events: vec![],
            manager_name: None,
            agency_name: None,
            buyer_name: None,
            buyer_mobile: None,
            reviewer_name: None,
            brand_name: None,
            settlement_mode: None::<SettlementMode>,
            settlement_ref: None,
            expected_settlement_date: None,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        order_repo::insert_order(conn, &order).unwrap();
        id
    }

    #[test]
    fn auto_verify_finalizes_discount_only_order() {
        let pool = new_test_pool();
        let conn = pool.get().unwrap();
        let id = seed_order(&conn, Some(DealType::Discount));

        let order = record_proof_confidence(&conn, id, ProofType::Order, 95, 90).unwrap();
        assert_eq!(order.workflow_status, WorkflowStatus::Approved);
    }

    #[test]
    fn rating_deal_requires_rating_before_finalize() {
        let pool = new_test_pool();
        let conn = pool.get().unwrap();
        let id = seed_order(&conn, Some(DealType::Rating));

        let order = record_proof_confidence(&conn, id, ProofType::Order, 95, 90).unwrap();
        assert_eq!(order.workflow_status, WorkflowStatus::UnderReview);

        let order = record_proof_confidence(&conn, id, ProofType::Rating, 95, 90).unwrap();
        assert_eq!(order.workflow_status, WorkflowStatus::Approved);
    }

    #[test]
    fn frozen_order_rejects_transitions() {
        let pool = new_test_pool();
        let conn = pool.get().unwrap();
        let id = seed_order(&conn, Some(DealType::Discount));
        freeze_order(&conn, id, "dispute").unwrap();

        let err = transition_order_workflow(
            &conn,
            TransitionInput {
                order_id: id,
                from: WorkflowStatus::UnderReview,
                to: WorkflowStatus::Approved,
                actor_user_id: None,
                metadata: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, AppError::OrderFrozen));
    }
}
