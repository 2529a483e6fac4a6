//! Authorization resolver (C9, spec §4.9).
//!
//! `get_requester` re-reads the User row on every authenticated call —
//! generalizes the teacher's `auth/middleware.rs` bearer-verification
//! step, which also re-fetches the user rather than trusting claims
//! embedded in the token body.

use chrono::{Duration, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::user_repo;
use crate::domain::order::Order;
use crate::domain::user::{Role, User};
use crate::error::{AppError, AppResult};

pub const MAX_FAILED_ATTEMPTS: u32 = 7;
pub const LOCKOUT_MINUTES: i64 = 15;

pub struct Requester {
    pub user_id: Uuid,
    pub roles: std::collections::HashSet<Role>,
    pub user: User,
}

/// Re-reads role/status on every call; suspended or soft-deleted users
/// are rejected regardless of token validity (spec §4.9).
pub fn get_requester(conn: &Connection, user_id: Uuid) -> AppResult<Requester> {
    let user = user_repo::get_user_by_id(conn, user_id)?.ok_or(AppError::Unauthenticated)?;
    if !user.is_active() {
        return Err(AppError::Unauthenticated);
    }
    Ok(Requester {
        user_id: user.id,
        roles: user.roles.clone(),
        user,
    })
}

pub fn is_privileged(requester: &Requester) -> bool {
    crate::domain::user::any_privileged(&requester.roles)
}

pub fn require_privileged(requester: &Requester) -> AppResult<()> {
    if is_privileged(requester) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

/// Buyer operations require exactly-self-or-privileged.
pub fn can_access_as_buyer(requester: &Requester, target_user_id: Uuid) -> bool {
    requester.user_id == target_user_id || is_privileged(requester)
}

/// Mediator/agency/brand visibility rules over an order (spec §4.9).
pub fn can_view_order(requester: &Requester, order: &Order) -> bool {
    if is_privileged(requester) {
        return true;
    }
    if requester.user_id == order.user_id {
        return true;
    }
    if requester.roles.contains(&Role::Mediator) {
        if let (Some(code), Some(manager)) = (&requester.user.mediator_code, &order.manager_name) {
            if code == manager {
                return true;
            }
        }
    }
    if requester.roles.contains(&Role::Agency) {
        if let Some(agency_code) = &requester.user.mediator_code {
            if order.agency_name.as_deref() == Some(agency_code.as_str()) {
                return true;
            }
        }
    }
    if requester.roles.contains(&Role::Brand) {
        if requester.user_id == order.brand_user_id {
            return true;
        }
        if let Some(name) = &requester.user.name {
            if order.brand_name.as_deref() == Some(name.as_str()) {
                return true;
            }
        }
    }
    false
}

/// Whether buyer PII should be stripped from a proof view for this
/// requester — true for brand viewers (spec §4.9).
pub fn should_strip_buyer_pii(requester: &Requester) -> bool {
    requester.roles.contains(&Role::Brand) && !is_privileged(requester)
}

/// Admin/ops must authenticate by username; mobile-based login for
/// those roles fails `USERNAME_REQUIRED` (spec §4.9).
pub fn validate_login_identifier(role: Role, used_username: bool) -> AppResult<()> {
    if role.requires_username_login() && !used_username {
        return Err(AppError::UsernameRequired);
    }
    Ok(())
}

/// Records a failed login attempt, locking the account for
/// `LOCKOUT_MINUTES` once `MAX_FAILED_ATTEMPTS` is reached (spec §4.9,
/// §8 S5).
pub fn record_failed_login(conn: &Connection, user: &User) -> AppResult<()> {
    let attempts = user.failed_login_attempts + 1;
    let lockout_until = if attempts >= MAX_FAILED_ATTEMPTS {
        Some(Utc::now() + Duration::minutes(LOCKOUT_MINUTES))
    } else {
        None
    };
    user_repo::record_login_failure(conn, user.id, lockout_until)
}

/// Checks account-lockout state before attempting password verification.
/// Emits a `BRUTE_FORCE_DETECTED` marker via the returned bool so the
/// caller can route it to observability.
pub fn check_lockout(user: &User) -> AppResult<bool> {
    let now = Utc::now();
    if user.is_locked_out(now) {
        return Err(AppError::AccountLocked);
    }
    Ok(user.failed_login_attempts >= MAX_FAILED_ATTEMPTS)
}

pub fn clear_login_failures(conn: &Connection, user_id: Uuid) -> AppResult<()> {
    user_repo::clear_login_failures(conn, user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{new_test_pool, user_repo};
    use crate::domain::user::{KycStatus, PaymentInstruments, Role, UserStatus};
    use std::collections::HashSet;

    fn seed_user(conn: &Connection, role: Role) -> User {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            role,
            roles: [role].into_iter().collect::<HashSet<_>>(),
            status: UserStatus::Active,
            mobile: "9998887776".into(),
            username: None,
            password_hash: "hash".into(),
            name: None,
            mediator_code: None,
            parent_code: None,
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
        user_repo::insert_user(conn, &user).unwrap();
        user
    }

    #[test]
    fn seventh_failure_locks_account() {
        let pool = new_test_pool();
        let conn = pool.get().unwrap();
        let mut user = seed_user(&conn, Role::Buyer);

        for _ in 0..MAX_FAILED_ATTEMPTS {
            record_failed_login(&conn, &user).unwrap();
            user = user_repo::get_user_by_id(&conn, user.id).unwrap().unwrap();
        }

        assert!(user.is_locked_out(Utc::now()));
        let err = check_lockout(&user).unwrap_err();
        assert!(matches!(err, AppError::AccountLocked));
    }

    #[test]
    fn admin_mobile_login_requires_username() {
        let err = validate_login_identifier(Role::Admin, false).unwrap_err();
        assert!(matches!(err, AppError::UsernameRequired));
        validate_login_identifier(Role::Admin, true).unwrap();
    }
}
