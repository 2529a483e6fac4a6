//! Ops/admin HTTP controllers (spec §6 Ops row). All privileged-only.

use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use axum::{
    extract::{Extension, State},
    Json,
};

use crate::audit::{write_audit_log, WriteAuditLog};
use crate::auth::models::Claims;
use crate::authz::{self, Requester};
use crate::db::campaign_repo;
use crate::domain::campaign::{Assignment, Campaign, CampaignStatus, Deal, DealType};
use crate::domain::order::{Order, ProofType, VerifiedBy, WorkflowStatus};
use crate::error::{AppError, AppResult};
use crate::realtime::Audience;
use crate::settlement;
use crate::state::AppState;
use crate::workflow;

fn require_privileged_requester(conn: &Connection, claims: &Claims) -> AppResult<Requester> {
    let user_id = claims.user_id().ok_or(AppError::Unauthenticated)?;
    let requester = authz::get_requester(conn, user_id)?;
    authz::require_privileged(&requester)?;
    Ok(requester)
}

#[derive(Debug, Deserialize)]
pub struct VerifyProofRequest {
    pub order_id: Uuid,
    pub proof_type: String,
    pub approve: bool,
    pub rejection_reason: Option<String>,
}

/// Manual ops override for a proof step, bypassing AI scoring entirely
/// (spec §4.6 "a privileged actor may verify or reject any step
/// directly").
pub async fn verify_proof(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<VerifyProofRequest>,
) -> AppResult<Json<Order>> {
    let pool = state.pool.clone();
    let hub = state.hub.clone();
    let order = tokio::task::spawn_blocking(move || -> AppResult<Order> {
        let conn = pool.get()?;
        let requester = require_privileged_requester(&conn, &claims)?;
        let proof_type = ProofType::from_str(&body.proof_type).ok_or(AppError::InvalidProofType)?;

        let mut order = crate::db::order_repo::get_order(&conn, body.order_id)?
            .ok_or(AppError::InvalidOrderId)?;
        if order.frozen {
            return Err(AppError::OrderFrozen);
        }

        if !body.approve {
            order.rejection = Some(crate::domain::order::Rejection {
                kind: proof_type.as_str().to_string(),
                reason: body.rejection_reason.unwrap_or_default(),
                actor_user_id: Some(requester.user_id),
                at: Utc::now(),
            });
            order.updated_at = Utc::now();
            crate::db::order_repo::update_order(&conn, &order)?;
            return workflow::transition_order_workflow(
                &conn,
                workflow::TransitionInput {
                    order_id: body.order_id,
                    from: order.workflow_status,
                    to: WorkflowStatus::Rejected,
                    actor_user_id: Some(requester.user_id),
                    metadata: None,
                },
            );
        }

        let step = order.verification.get_mut(proof_type);
        step.verified_at = Some(Utc::now());
        step.verified_by = Some(VerifiedBy::User(requester.user_id));
        order.updated_at = Utc::now();
        crate::db::order_repo::update_order(&conn, &order)?;

        write_audit_log(
            &conn,
            WriteAuditLog {
                actor_user_id: Some(requester.user_id),
                action: "PROOF_VERIFIED",
                entity_type: "order",
                entity_id: &body.order_id.to_string(),
                ip: None,
                user_agent: None,
                metadata: Some(serde_json::json!({ "proofType": proof_type.as_str() })),
            },
        );

        workflow::try_finalize(&conn, body.order_id)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    hub.publish(Audience::broadcast(), "ORDER_VERIFIED", Some(serde_json::json!({ "orderId": order.id })));
    Ok(Json(order))
}

#[derive(Debug, Deserialize)]
pub struct SettleOrderRequest {
    pub order_id: Uuid,
}

pub async fn settle_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<SettleOrderRequest>,
) -> AppResult<Json<Order>> {
    let pool = state.pool.clone();
    let hub = state.hub.clone();
    let max_balance = state.config.wallet_max_balance_paise;
    let order = tokio::task::spawn_blocking(move || -> AppResult<Order> {
        let conn = pool.get()?;
        require_privileged_requester(&conn, &claims)?;
        settlement::settle_order(&conn, body.order_id, max_balance)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    hub.publish(Audience::broadcast(), "ORDER_SETTLED", Some(serde_json::json!({ "orderId": order.id })));
    Ok(Json(order))
}

#[derive(Debug, Deserialize)]
pub struct UnsettleOrderRequest {
    pub order_id: Uuid,
}

pub async fn unsettle_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<UnsettleOrderRequest>,
) -> AppResult<Json<Order>> {
    let pool = state.pool.clone();
    let order = tokio::task::spawn_blocking(move || -> AppResult<Order> {
        let conn = pool.get()?;
        require_privileged_requester(&conn, &claims)?;
        settlement::unsettle_order(&conn, body.order_id)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(order))
}

#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub title: String,
    pub brand_user_id: Uuid,
    pub original_price_paise: i64,
    pub price_paise: i64,
    pub payout_paise: i64,
    pub return_window_days: i32,
    pub deal_type: Option<String>,
    pub total_slots: i64,
}

pub async fn create_campaign(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<CreateCampaignRequest>,
) -> AppResult<Json<Campaign>> {
    let pool = state.pool.clone();
    tokio::task::spawn_blocking(move || -> AppResult<Campaign> {
        let conn = pool.get()?;
        require_privileged_requester(&conn, &claims)?;

        if body.total_slots <= 0 || body.price_paise < 0 || body.original_price_paise < 0 {
            return Err(AppError::InvalidAmount);
        }

        let campaign = Campaign {
            id: Uuid::new_v4(),
            title: body.title,
            brand_user_id: body.brand_user_id,
            original_price_paise: body.original_price_paise,
            price_paise: body.price_paise,
            payout_paise: body.payout_paise,
            return_window_days: body.return_window_days,
            deal_type: body.deal_type.as_deref().and_then(DealType::from_str),
            total_slots: body.total_slots,
            used_slots: 0,
            status: CampaignStatus::Active,
            allowed_agency_codes: Default::default(),
            assignments: Default::default(),
            locked: false,
            deleted_at: None,
            created_at: Utc::now(),
        };
        campaign_repo::insert_campaign(&conn, &campaign)?;
        Ok(campaign)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?
    .map(Json)
}

#[derive(Debug, Deserialize)]
pub struct AssignCampaignRequest {
    pub campaign_id: Uuid,
    pub mediator_code: String,
    pub limit: i64,
    pub payout_paise: Option<i64>,
    pub commission_paise: Option<i64>,
}

pub async fn assign_campaign(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<AssignCampaignRequest>,
) -> AppResult<Json<Campaign>> {
    let pool = state.pool.clone();
    tokio::task::spawn_blocking(move || -> AppResult<Campaign> {
        let conn = pool.get()?;
        require_privileged_requester(&conn, &claims)?;

        let assignment = if body.payout_paise.is_some() || body.commission_paise.is_some() {
            Assignment::Detailed {
                limit: body.limit,
                payout_paise: body.payout_paise,
                commission_paise: body.commission_paise,
            }
        } else {
            Assignment::Limit(body.limit)
        };
        let affected = campaign_repo::set_assignment(&conn, body.campaign_id, &body.mediator_code, &assignment)?;
        if affected == 0 {
            return Err(AppError::Internal("campaign not found".into()));
        }
        campaign_repo::get_campaign(&conn, body.campaign_id)?
            .ok_or_else(|| AppError::Internal("campaign vanished after assignment".into()))
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?
    .map(Json)
}

#[derive(Debug, Deserialize)]
pub struct PublishDealRequest {
    pub campaign_id: Uuid,
    pub mediator_code: String,
    pub price_paise: i64,
    pub original_price_paise: i64,
    pub payout_paise: i64,
    pub commission_paise: i64,
    pub category: Option<String>,
    pub rating: Option<f64>,
}

pub async fn publish_deal(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<PublishDealRequest>,
) -> AppResult<Json<Deal>> {
    let pool = state.pool.clone();
    tokio::task::spawn_blocking(move || -> AppResult<Deal> {
        let conn = pool.get()?;
        require_privileged_requester(&conn, &claims)?;

        let deal = Deal {
            id: Uuid::new_v4(),
            campaign_id: body.campaign_id,
            mediator_code: body.mediator_code,
            price_paise: body.price_paise,
            original_price_paise: body.original_price_paise,
            payout_paise: body.payout_paise,
            commission_paise: body.commission_paise,
            category: body.category,
            rating: body.rating,
            active: true,
        };
        campaign_repo::insert_deal(&conn, &deal)?;
        Ok(deal)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?
    .map(Json)
}

#[derive(Debug, Deserialize)]
pub struct ConnectBrandRequest {
    pub brand_user_id: Uuid,
    pub agency_user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ConnectBrandResponse {
    pub connected: bool,
}

/// Agency-to-brand connection request (spec §3 `PendingConnection`,
/// "brand-side inbox of requesting agencies").
pub async fn connect_brand(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<ConnectBrandRequest>,
) -> AppResult<Json<ConnectBrandResponse>> {
    let pool = state.pool.clone();
    tokio::task::spawn_blocking(move || -> AppResult<ConnectBrandResponse> {
        let conn = pool.get()?;
        require_privileged_requester(&conn, &claims)?;

        let now = Utc::now();
        conn.execute(
            "INSERT INTO pending_connections (id, brand_user_id, agency_user_id, status, \
             created_at, updated_at) VALUES (?1,?2,?3,'pending',?4,?4)",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                body.brand_user_id.to_string(),
                body.agency_user_id.to_string(),
                now.to_rfc3339(),
            ],
        )?;
        Ok(ConnectBrandResponse { connected: true })
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?
    .map(Json)
}
