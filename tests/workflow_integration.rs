//! End-to-end scenario tests against a real file-backed SQLite store,
//! covering the happy path, oversell prevention, idempotent settlement,
//! and the invite single-use race under genuine multi-threaded
//! concurrency (a shared in-memory `rusqlite` connection can't give more
//! than one connection at a time, so this uses `db::new_pool` against a
//! temp file the way the server does in production).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use affiliate_core::campaign;
use affiliate_core::db::{campaign_repo, order_repo, user_repo, wallet_repo, Pool};
use affiliate_core::domain::campaign::{Campaign, CampaignStatus};
use affiliate_core::domain::invite::{ConsumeInviteInput, Invite, InviteStatus};
use affiliate_core::domain::order::{
    AffiliateStatus, Order, OrderItem, OrderStatus, PaymentStatus, SettlementMode, Verification,
    WorkflowStatus,
};
use affiliate_core::domain::user::{KycStatus, PaymentInstruments, Role, User, UserStatus};
use affiliate_core::error::AppError;
use affiliate_core::invite;
use affiliate_core::settlement;
use affiliate_core::wallet;
use affiliate_core::workflow::{self, TransitionInput};

const MAX_BALANCE: i64 = 100_000_000;

fn test_pool() -> (Pool, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("affiliate_test.db");
    let pool = affiliate_core::db::new_pool(path.to_str().unwrap()).expect("new_pool");
    (pool, dir)
}

fn seed_user(pool: &Pool, role: Role, mediator_code: Option<&str>, parent_code: Option<&str>) -> User {
    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        role,
        roles: [role].into_iter().collect::<HashSet<_>>(),
        status: UserStatus::Active,
        mobile: format!("9{}", Uuid::new_v4().simple().to_string().chars().take(9).collect::<String>()),
        username: None,
        password_hash: "hash".into(),
        name: None,
        mediator_code: mediator_code.map(str::to_string),
        parent_code: parent_code.map(str::to_string),
        brand_code: None,
        connected_agencies: HashSet::new(),
        kyc: KycStatus::default(),
        payment_instruments: PaymentInstruments::default(),
        failed_login_attempts: 0,
        lockout_until: None,
        deleted_at: None,
        created_at: now,
        updated_at: now,
    };
    let conn = pool.get().unwrap();
    user_repo::insert_user(&conn, &user).unwrap();
    user
}

fn seed_campaign(pool: &Pool, brand_user_id: Uuid, total_slots: i64) -> Uuid {
    let id = Uuid::new_v4();
    let campaign = Campaign {
        id,
        title: "Test Deal".into(),
        brand_user_id,
        original_price_paise: 120_000,
        price_paise: 99_900,
        payout_paise: 15_000,
        return_window_days: 7,
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
    let conn = pool.get().unwrap();
    campaign_repo::insert_campaign(&conn, &campaign).unwrap();
    id
}

fn seed_order(
    pool: &Pool,
    buyer_id: Uuid,
    brand_user_id: Uuid,
    campaign_id: Uuid,
    manager_name: Option<&str>,
) -> Uuid {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let order = Order {
        id,
        user_id: buyer_id,
        brand_user_id,
        items: vec![OrderItem {
            product_id: "sku-1".into(),
            title: "Product".into(),
            image: None,
            price_at_purchase_paise: 99_900,
            commission_paise: 5_000,
            campaign_id,
            quantity: 1,
            deal_type: None,
            platform: None,
            brand_name: None,
        }],
        total_paise: 99_900,
        workflow_status: WorkflowStatus::Created,
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
        manager_name: manager_name.map(str::to_string),
        agency_name: None,
        buyer_name: None,
        buyer_mobile: None,
        reviewer_name: None,
        brand_name: None,
        settlement_mode: None::<SettlementMode>,
        settlement_ref: None,
        expected_settlement_date: None,
        deleted_at: None,
        created_at: now,
        updated_at: now,
    };
    let conn = pool.get().unwrap();
    order_repo::insert_order(&conn, &order).unwrap();
    id
}

/// S1 — happy path: order is driven through CREATED -> ... -> APPROVED,
/// then settled, crediting buyer and mediator wallets and debiting the
/// brand's, all from a single settle call.
#[test]
fn s1_happy_path_settlement_distributes_wallet_deltas() {
    let (pool, _dir) = test_pool();
    let brand = seed_user(&pool, Role::Brand, None, None);
    let mediator = seed_user(&pool, Role::Mediator, Some("MED1"), None);
    let buyer = seed_user(&pool, Role::Buyer, None, Some("MED1"));
    let campaign_id = seed_campaign(&pool, brand.id, 10);
    let order_id = seed_order(&pool, buyer.id, brand.id, campaign_id, Some("MED1"));

    let conn = pool.get().unwrap();
    campaign::claim_slot(&conn, campaign_id).unwrap();

    workflow::transition_order_workflow(
        &conn,
        TransitionInput {
            order_id,
            from: WorkflowStatus::Created,
            to: WorkflowStatus::Ordered,
            actor_user_id: Some(buyer.id),
            metadata: None,
        },
    )
    .unwrap();
    workflow::transition_order_workflow(
        &conn,
        TransitionInput {
            order_id,
            from: WorkflowStatus::Ordered,
            to: WorkflowStatus::ProofSubmitted,
            actor_user_id: Some(buyer.id),
            metadata: None,
        },
    )
    .unwrap();
    workflow::transition_order_workflow(
        &conn,
        TransitionInput {
            order_id,
            from: WorkflowStatus::ProofSubmitted,
            to: WorkflowStatus::UnderReview,
            actor_user_id: Some(buyer.id),
            metadata: None,
        },
    )
    .unwrap();

    use affiliate_core::domain::order::ProofType;
    let order = workflow::record_proof_confidence(&conn, order_id, ProofType::Order, 95, 90).unwrap();
    assert_eq!(order.workflow_status, WorkflowStatus::Approved);

    wallet::ensure_wallet(&conn, brand.id).unwrap();
    wallet::apply_wallet_credit(
        &conn,
        affiliate_core::domain::wallet::WalletMutation {
            idempotency_key: "seed-brand-balance".into(),
            kind: affiliate_core::domain::wallet::TransactionType::BrandDeposit,
            owner_user_id: brand.id,
            amount_paise: 1_000_000,
            from_user_id: None,
            to_user_id: Some(brand.id),
            order_id: None,
            campaign_id: None,
            payout_id: None,
            metadata: None,
        },
        MAX_BALANCE,
    )
    .unwrap();

    let settled = settlement::settle_order(&conn, order_id, MAX_BALANCE).unwrap();
    assert_eq!(settled.affiliate_status, AffiliateStatus::ApprovedSettled);

    // Campaign has no Deal row or per-mediator Assignment for "MED1", so
    // the split falls back to the campaign's own payoutPaise (15_000)
    // for the buyer and the item's commission snapshot (5_000) for the
    // mediator — the exact figures from spec.md §8 S1's worked example.
    let buyer_wallet = wallet_repo::get_wallet_by_owner(&conn, buyer.id).unwrap().unwrap();
    assert_eq!(buyer_wallet.available_paise, 15_000);

    let mediator_wallet = wallet_repo::get_wallet_by_owner(&conn, mediator.id).unwrap().unwrap();
    assert_eq!(mediator_wallet.available_paise, 5_000);

    // Brand is debited exactly payout + commission (20_000), never the
    // order's gross total (99_900) — no tracked margin field.
    let brand_wallet = wallet_repo::get_wallet_by_owner(&conn, brand.id).unwrap().unwrap();
    assert_eq!(brand_wallet.available_paise, 1_000_000 - 20_000);

    let campaign = campaign_repo::get_campaign(&conn, campaign_id).unwrap().unwrap();
    assert_eq!(campaign.used_slots, 1);
}

/// S2 — oversell prevention: N threads race to claim slots on a
/// campaign with `totalSlots=1`; exactly one wins.
#[test]
fn s2_oversell_prevention_under_concurrency() {
    let (pool, _dir) = test_pool();
    let brand = seed_user(&pool, Role::Brand, None, None);
    let campaign_id = seed_campaign(&pool, brand.id, 1);

    let pool = Arc::new(pool);
    let handles: Vec<_> = (0..5)
        .map(|_| {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || {
                let conn = pool.get().unwrap();
                campaign::claim_slot(&conn, campaign_id)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let sold_out = results
        .iter()
        .filter(|r| matches!(r, Err(AppError::SoldOut)))
        .count();
    assert_eq!(succeeded, 1);
    assert_eq!(sold_out, 4);

    let conn = pool.get().unwrap();
    let campaign = campaign_repo::get_campaign(&conn, campaign_id).unwrap().unwrap();
    assert_eq!(campaign.used_slots, 1);
}

/// S3 — idempotent settlement: replaying the settle call does not
/// mutate wallet balances past the first call.
#[test]
fn s3_replayed_settlement_is_a_no_op() {
    let (pool, _dir) = test_pool();
    let brand = seed_user(&pool, Role::Brand, None, None);
    let buyer = seed_user(&pool, Role::Buyer, None, None);
    let campaign_id = seed_campaign(&pool, brand.id, 10);
    let order_id = seed_order(&pool, buyer.id, brand.id, campaign_id, None);

    let conn = pool.get().unwrap();
    campaign::claim_slot(&conn, campaign_id).unwrap();
    wallet::ensure_wallet(&conn, brand.id).unwrap();
    wallet::apply_wallet_credit(
        &conn,
        affiliate_core::domain::wallet::WalletMutation {
            idempotency_key: "seed-brand-balance-2".into(),
            kind: affiliate_core::domain::wallet::TransactionType::BrandDeposit,
            owner_user_id: brand.id,
            amount_paise: 1_000_000,
            from_user_id: None,
            to_user_id: Some(brand.id),
            order_id: None,
            campaign_id: None,
            payout_id: None,
            metadata: None,
        },
        MAX_BALANCE,
    )
    .unwrap();

    settlement::settle_order(&conn, order_id, MAX_BALANCE).unwrap();
    let buyer_balance_after_first = wallet_repo::get_wallet_by_owner(&conn, buyer.id).unwrap().unwrap().available_paise;

    for _ in 0..2 {
        settlement::settle_order(&conn, order_id, MAX_BALANCE).unwrap();
    }

    let buyer_balance_after_replays = wallet_repo::get_wallet_by_owner(&conn, buyer.id).unwrap().unwrap().available_paise;
    assert_eq!(buyer_balance_after_first, buyer_balance_after_replays);
}

/// S4 — invite single-use race: N threads race `consumeInvite` against
/// `maxUses=1`; exactly one succeeds.
#[test]
fn s4_invite_single_use_race() {
    let (pool, _dir) = test_pool();
    let creator = seed_user(&pool, Role::Admin, None, None);

    let code = "RACE-INVITE";
    let invite_row = Invite {
        id: Uuid::new_v4(),
        code: code.into(),
        role: Role::Buyer,
        parent_code: None,
        parent_user_id: None,
        created_by: creator.id,
        status: InviteStatus::Active,
        max_uses: 1,
        use_count: 0,
        expires_at: None,
        uses: vec![],
    };
    {
        let conn = pool.get().unwrap();
        affiliate_core::db::invite_repo::insert_invite(&conn, &invite_row).unwrap();
    }

    let pool = Arc::new(pool);
    let handles: Vec<_> = (0..10)
        .map(|_| {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || {
                let conn = pool.get().unwrap();
                invite::consume_invite(
                    &conn,
                    ConsumeInviteInput {
                        code: code.into(),
                        role: Role::Buyer,
                        used_by_user_id: Uuid::new_v4(),
                        require_active_issuer: false,
                    },
                )
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let failed = results
        .iter()
        .filter(|r| matches!(r, Err(AppError::InvalidInvite)))
        .count();
    assert_eq!(succeeded, 1);
    assert_eq!(failed, 9);

    let conn = pool.get().unwrap();
    let updated = affiliate_core::db::invite_repo::get_invite_by_code(&conn, code)
        .unwrap()
        .unwrap();
    assert_eq!(updated.use_count, 1);
    assert_eq!(updated.status, InviteStatus::Used);
}

/// S6 — a buyer cannot open a second non-terminal order against the
/// same product without an explicit pre-order id.
#[test]
fn s6_duplicate_deal_order_is_rejected() {
    let (pool, _dir) = test_pool();
    let brand = seed_user(&pool, Role::Brand, None, None);
    let buyer = seed_user(&pool, Role::Buyer, None, None);
    let campaign_id = seed_campaign(&pool, brand.id, 10);

    let conn = pool.get().unwrap();
    workflow::check_creation_guards(&conn, buyer.id, "sku-1", None, None).unwrap();
    seed_order(&pool, buyer.id, brand.id, campaign_id, None);

    let conn = pool.get().unwrap();
    let err = workflow::check_creation_guards(&conn, buyer.id, "sku-1", None, None).unwrap_err();
    assert!(matches!(err, AppError::DuplicateDealOrder));

    let campaign = campaign_repo::get_campaign(&conn, campaign_id).unwrap().unwrap();
    assert_eq!(campaign.used_slots, 0);
}
