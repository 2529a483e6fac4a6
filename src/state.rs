//! Shared application state, analogous to the teacher's `AppState`.

use std::sync::Arc;

use crate::ai_oracle::ProofOracle;
use crate::auth::JwtHandler;
use crate::config::Config;
use crate::db::Pool;
use crate::realtime::RealtimeHub;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub config: Arc<Config>,
    pub jwt: Arc<JwtHandler>,
    pub hub: RealtimeHub,
    pub oracle: Arc<dyn ProofOracle>,
}
