//! Application configuration, loaded from the environment.
//!
//! Mirrors the teacher's `models::Config::from_env` convention: plain
//! `env::var(..).unwrap_or_else(..)` defaults, `dotenv` loaded first.

use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub port: u16,
    pub node_env: NodeEnv,
    pub jwt_access_secret: String,
    pub jwt_refresh_secret: String,
    pub wallet_max_balance_paise: i64,
    pub ai_proof_confidence_threshold: u8,
    pub ai_auto_verify_threshold: u8,
    pub seed_admin: bool,
    pub seed_e2e: bool,
    pub seed_dev: bool,
    pub admin_seed_mobile: Option<String>,
    pub admin_seed_username: Option<String>,
    pub admin_seed_password: Option<String>,
    pub admin_seed_name: Option<String>,
    pub shutdown_drain_seconds: u64,
    pub availability_check_interval_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEnv {
    Production,
    Development,
    Test,
}

impl NodeEnv {
    fn parse(s: &str) -> Self {
        match s {
            "production" => NodeEnv::Production,
            "test" => NodeEnv::Test,
            _ => NodeEnv::Development,
        }
    }

    pub fn is_production(self) -> bool {
        matches!(self, NodeEnv::Production)
    }
}

fn bool_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let database_path =
            env::var("DATABASE_PATH").unwrap_or_else(|_| "./affiliate_core.db".to_string());

        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(3000);

        let node_env = NodeEnv::parse(&env::var("NODE_ENV").unwrap_or_default());

        let jwt_access_secret =
            env::var("JWT_ACCESS_SECRET").unwrap_or_else(|_| "dev-access-secret".to_string());
        let jwt_refresh_secret =
            env::var("JWT_REFRESH_SECRET").unwrap_or_else(|_| "dev-refresh-secret".to_string());

        let wallet_max_balance_paise = env::var("WALLET_MAX_BALANCE_PAISE")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(100_00_000);

        let ai_proof_confidence_threshold = env::var("AI_PROOF_CONFIDENCE_THRESHOLD")
            .ok()
            .and_then(|v| v.parse::<u8>().ok())
            .unwrap_or(75);

        let ai_auto_verify_threshold = env::var("AI_AUTO_VERIFY_THRESHOLD")
            .ok()
            .and_then(|v| v.parse::<u8>().ok())
            .unwrap_or(90);

        let seed_admin = bool_flag("SEED_ADMIN", false);
        let seed_e2e = bool_flag("SEED_E2E", false);
        let seed_dev = bool_flag("SEED_DEV", false);

        if seed_dev && node_env.is_production() {
            anyhow::bail!("SEED_DEV is refused in production");
        }

        let shutdown_drain_seconds = env::var("SHUTDOWN_DRAIN_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);

        let availability_check_interval_seconds = env::var("AVAILABILITY_CHECK_INTERVAL_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(300);

        Ok(Self {
            database_path,
            port,
            node_env,
            jwt_access_secret,
            jwt_refresh_secret,
            wallet_max_balance_paise,
            ai_proof_confidence_threshold,
            ai_auto_verify_threshold,
            seed_admin,
            seed_e2e,
            seed_dev,
            admin_seed_mobile: env::var("ADMIN_SEED_MOBILE").ok(),
            admin_seed_username: env::var("ADMIN_SEED_USERNAME").ok(),
            admin_seed_password: env::var("ADMIN_SEED_PASSWORD").ok(),
            admin_seed_name: env::var("ADMIN_SEED_NAME").ok(),
            shutdown_drain_seconds,
            availability_check_interval_seconds,
        })
    }
}
