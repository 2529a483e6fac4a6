//! JWT issuance/validation (C auth, spec §4.9 "JWT signing treated as an
//! opaque primitive").
//!
//! Split access/refresh secrets generalize the teacher's single-secret
//! `JwtHandler` — access tokens are short-lived and carry roles for fast
//! authorization, refresh tokens are long-lived and narrowly scoped to
//! the `/api/auth/refresh` endpoint via `TokenType`.

use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::models::{Claims, TokenType};
use crate::domain::user::{Role, User};

const ACCESS_TOKEN_MINUTES: i64 = 60;
const REFRESH_TOKEN_DAYS: i64 = 30;

pub struct JwtHandler {
    access_secret: String,
    refresh_secret: String,
}

impl JwtHandler {
    pub fn new(access_secret: String, refresh_secret: String) -> Self {
        Self { access_secret, refresh_secret }
    }

    fn mint(&self, user_id: &str, roles: HashSet<Role>, token_type: TokenType, minutes: i64) -> Result<(String, usize)> {
        let exp = Utc::now()
            .checked_add_signed(chrono::Duration::minutes(minutes))
            .context("invalid timestamp")?
            .timestamp() as usize;
        let claims = Claims { sub: user_id.to_string(), roles, token_type, exp };
        let secret = match token_type {
            TokenType::Access => &self.access_secret,
            TokenType::Refresh => &self.refresh_secret,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
            .context("failed to sign token")?;
        Ok((token, (minutes * 60) as usize))
    }

    pub fn generate_access_token(&self, user: &User) -> Result<(String, usize)> {
        self.mint(&user.id.to_string(), user.roles.clone(), TokenType::Access, ACCESS_TOKEN_MINUTES)
    }

    pub fn generate_refresh_token(&self, user: &User) -> Result<(String, usize)> {
        self.mint(&user.id.to_string(), user.roles.clone(), TokenType::Refresh, REFRESH_TOKEN_DAYS * 24 * 60)
    }

    pub fn validate_access_token(&self, token: &str) -> Result<Claims> {
        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.access_secret.as_bytes()),
            &Validation::default(),
        )
        .context("invalid or expired access token")?;
        if decoded.claims.token_type != TokenType::Access {
            anyhow::bail!("wrong token type");
        }
        Ok(decoded.claims)
    }

    pub fn validate_refresh_token(&self, token: &str) -> Result<Claims> {
        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.refresh_secret.as_bytes()),
            &Validation::default(),
        )
        .context("invalid or expired refresh token")?;
        if decoded.claims.token_type != TokenType::Refresh {
            anyhow::bail!("wrong token type");
        }
        Ok(decoded.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::user::{KycStatus, PaymentInstruments, UserStatus};
    use chrono::Utc;
    use uuid::Uuid;

    fn test_user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            role: Role::Buyer,
            roles: [Role::Buyer].into_iter().collect(),
            status: UserStatus::Active,
            mobile: "9998887776".into(),
            username: None,
            password_hash: "hash".into(),
            name: None,
            mediator_code: None,
            parent_code: None,
            brand_code: None,
            connected_agencies: Default::default(),
            kyc: KycStatus::default(),
            payment_instruments: PaymentInstruments::default(),
            failed_login_attempts: 0,
            lockout_until: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn access_and_refresh_tokens_round_trip() {
        let handler = JwtHandler::new("access-secret".into(), "refresh-secret".into());
        let user = test_user();

        let (access, _) = handler.generate_access_token(&user).unwrap();
        let claims = handler.validate_access_token(&access).unwrap();
        assert_eq!(claims.user_id().unwrap(), user.id);

        let (refresh, _) = handler.generate_refresh_token(&user).unwrap();
        let claims = handler.validate_refresh_token(&refresh).unwrap();
        assert_eq!(claims.user_id().unwrap(), user.id);
    }

    #[test]
    fn access_token_rejected_by_refresh_validation() {
        let handler = JwtHandler::new("access-secret".into(), "refresh-secret".into());
        let user = test_user();
        let (access, _) = handler.generate_access_token(&user).unwrap();
        assert!(handler.validate_refresh_token(&access).is_err());
    }
}
