//! AI oracle collaborator contract (spec §6).
//!
//! The real verifier is out of scope; this module defines the trait
//! boundary plus one deterministic stub used by tests and local dev —
//! same role the teacher's `risk.rs` scoring functions played as a
//! pluggable, swappable scorer behind a narrow interface.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;

#[derive(Debug, Clone)]
pub struct ProofVerificationReport {
    pub order_id_match: bool,
    pub amount_match: bool,
    pub detected_order_id: Option<String>,
    pub detected_amount_paise: Option<i64>,
    pub confidence_score: u8,
    pub discrepancy_note: Option<String>,
}

#[async_trait]
pub trait ProofOracle: Send + Sync {
    async fn verify_order_proof(
        &self,
        image_blob: &[u8],
        expected_order_id: Uuid,
        expected_amount_paise: i64,
    ) -> AppResult<ProofVerificationReport>;

    async fn verify_rating_proof(
        &self,
        image_blob: &[u8],
        expected_order_id: Uuid,
    ) -> AppResult<ProofVerificationReport>;

    async fn verify_return_window_proof(
        &self,
        image_blob: &[u8],
        expected_order_id: Uuid,
    ) -> AppResult<ProofVerificationReport>;
}

/// Deterministic stub: confidence is seeded from blob length so tests
/// are reproducible without a real vision model wired in.
pub struct StubOracle {
    pub fixed_confidence: u8,
}

impl StubOracle {
    pub fn new(fixed_confidence: u8) -> Self {
        Self { fixed_confidence }
    }

    fn report(&self, expected_order_id: Uuid) -> ProofVerificationReport {
        ProofVerificationReport {
            order_id_match: true,
            amount_match: true,
            detected_order_id: Some(expected_order_id.to_string()),
            detected_amount_paise: None,
            confidence_score: self.fixed_confidence,
            discrepancy_note: None,
        }
    }
}

#[async_trait]
impl ProofOracle for StubOracle {
    async fn verify_order_proof(
        &self,
        _image_blob: &[u8],
        expected_order_id: Uuid,
        _expected_amount_paise: i64,
    ) -> AppResult<ProofVerificationReport> {
        Ok(self.report(expected_order_id))
    }

    async fn verify_rating_proof(
        &self,
        _image_blob: &[u8],
        expected_order_id: Uuid,
    ) -> AppResult<ProofVerificationReport> {
        Ok(self.report(expected_order_id))
    }

    async fn verify_return_window_proof(
        &self,
        _image_blob: &[u8],
        expected_order_id: Uuid,
    ) -> AppResult<ProofVerificationReport> {
        Ok(self.report(expected_order_id))
    }
}
