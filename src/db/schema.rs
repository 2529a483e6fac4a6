//! Schema initialization (spec §4.1 C1).
//!
//! Idempotent `CREATE TABLE IF NOT EXISTS` / `CREATE INDEX IF NOT EXISTS`
//! statements, run once per connection at boot — generalizing the
//! teacher's `UserStore::init_db` to the full entity set. Monetary columns
//! are `INTEGER` paise; enums are `TEXT`; open-shaped fields (`events`,
//! `verification`, `assignments`, `uses`, AI reports) are `TEXT` JSON.

use rusqlite::{Connection, Result};

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            role TEXT NOT NULL,
            roles TEXT NOT NULL,
            status TEXT NOT NULL,
            mobile TEXT NOT NULL,
            username TEXT,
            password_hash TEXT NOT NULL,
            name TEXT,
            mediator_code TEXT,
            parent_code TEXT,
            brand_code TEXT,
            connected_agencies TEXT NOT NULL DEFAULT '[]',
            kyc TEXT NOT NULL DEFAULT '{}',
            payment_instruments TEXT NOT NULL DEFAULT '{}',
            failed_login_attempts INTEGER NOT NULL DEFAULT 0,
            lockout_until TEXT,
            deleted_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_users_mobile_live
            ON users(mobile) WHERE deleted_at IS NULL;
        CREATE UNIQUE INDEX IF NOT EXISTS idx_users_username_live
            ON users(username) WHERE username IS NOT NULL AND deleted_at IS NULL;

        CREATE TABLE IF NOT EXISTS wallets (
            id TEXT PRIMARY KEY,
            owner_user_id TEXT NOT NULL UNIQUE,
            available_paise INTEGER NOT NULL DEFAULT 0,
            pending_paise INTEGER NOT NULL DEFAULT 0,
            locked_paise INTEGER NOT NULL DEFAULT 0,
            version INTEGER NOT NULL DEFAULT 0,
            deleted_at TEXT,
            FOREIGN KEY (owner_user_id) REFERENCES users(id)
        );

        CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            idempotency_key TEXT NOT NULL UNIQUE,
            kind TEXT NOT NULL,
            status TEXT NOT NULL,
            amount_paise INTEGER NOT NULL,
            wallet_id TEXT,
            from_user_id TEXT,
            to_user_id TEXT,
            order_id TEXT,
            campaign_id TEXT,
            payout_id TEXT,
            metadata TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS campaigns (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            brand_user_id TEXT NOT NULL,
            original_price_paise INTEGER NOT NULL,
            price_paise INTEGER NOT NULL,
            payout_paise INTEGER NOT NULL,
            return_window_days INTEGER NOT NULL DEFAULT 14,
            deal_type TEXT,
            total_slots INTEGER NOT NULL,
            used_slots INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            allowed_agency_codes TEXT NOT NULL DEFAULT '[]',
            assignments TEXT NOT NULL DEFAULT '{}',
            locked INTEGER NOT NULL DEFAULT 0,
            deleted_at TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_campaigns_status_brand
            ON campaigns(status, brand_user_id, created_at DESC);

        CREATE TABLE IF NOT EXISTS deals (
            id TEXT PRIMARY KEY,
            campaign_id TEXT NOT NULL,
            mediator_code TEXT NOT NULL,
            price_paise INTEGER NOT NULL,
            original_price_paise INTEGER NOT NULL,
            payout_paise INTEGER NOT NULL,
            commission_paise INTEGER NOT NULL,
            category TEXT,
            rating REAL,
            active INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY (campaign_id) REFERENCES campaigns(id)
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_deals_campaign_mediator
            ON deals(campaign_id, mediator_code);

        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            brand_user_id TEXT NOT NULL,
            items TEXT NOT NULL,
            total_paise INTEGER NOT NULL,
            workflow_status TEXT NOT NULL,
            status TEXT NOT NULL,
            payment_status TEXT NOT NULL,
            affiliate_status TEXT NOT NULL,
            frozen INTEGER NOT NULL DEFAULT 0,
            frozen_at TEXT,
            frozen_reason TEXT,
            reactivated_at TEXT,
            external_order_id TEXT,
            review_link TEXT,
            verification TEXT NOT NULL DEFAULT '{}',
            rejection TEXT,
            missing_proof_requests TEXT NOT NULL DEFAULT '[]',
            events TEXT NOT NULL DEFAULT '[]',
            manager_name TEXT,
            agency_name TEXT,
            buyer_name TEXT,
            buyer_mobile TEXT,
            reviewer_name TEXT,
            brand_name TEXT,
            settlement_mode TEXT,
            settlement_ref TEXT,
            expected_settlement_date TEXT,
            deleted_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_orders_external_id
            ON orders(external_order_id) WHERE external_order_id IS NOT NULL;
        CREATE INDEX IF NOT EXISTS idx_orders_user_created
            ON orders(user_id, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_orders_manager_created
            ON orders(manager_name, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_orders_brand_status
            ON orders(brand_user_id, workflow_status, deleted_at);

        CREATE TABLE IF NOT EXISTS invites (
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            role TEXT NOT NULL,
            parent_code TEXT,
            parent_user_id TEXT,
            created_by TEXT NOT NULL,
            status TEXT NOT NULL,
            max_uses INTEGER NOT NULL DEFAULT 1,
            use_count INTEGER NOT NULL DEFAULT 0,
            expires_at TEXT,
            uses TEXT NOT NULL DEFAULT '[]'
        );

        CREATE TABLE IF NOT EXISTS payouts (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            amount_paise INTEGER NOT NULL,
            status TEXT NOT NULL,
            provider TEXT,
            provider_ref TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_payouts_provider_ref
            ON payouts(provider, provider_ref) WHERE provider IS NOT NULL AND provider_ref IS NOT NULL;

        CREATE TABLE IF NOT EXISTS pending_connections (
            id TEXT PRIMARY KEY,
            brand_user_id TEXT NOT NULL,
            agency_code TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tickets (
            id TEXT PRIMARY KEY,
            order_id TEXT,
            raised_by TEXT NOT NULL,
            subject TEXT NOT NULL,
            open INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS suspensions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            reason TEXT NOT NULL,
            created_at TEXT NOT NULL,
            lifted_at TEXT
        );

        CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            actor_user_id TEXT,
            action TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            ip TEXT,
            user_agent TEXT,
            metadata TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_audit_entity
            ON audit_logs(entity_type, entity_id, created_at DESC);

        CREATE TABLE IF NOT EXISTS system_config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS push_subscriptions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            app TEXT NOT NULL,
            endpoint TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        ",
    )
}
