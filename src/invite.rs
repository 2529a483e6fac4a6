//! Invite & lineage resolver (C4, spec §4.4).

use chrono::Utc;
use rusqlite::Connection;

use crate::audit::{write_audit_log, WriteAuditLog};
use crate::db::{invite_repo, user_repo};
use crate::domain::invite::{ConsumeInviteInput, Invite, InviteStatus};
use crate::domain::user::Role;
use crate::error::{AppError, AppResult};

/// Asserts the invite's issuing chain is live: for a buyer invite, the
/// parent must be an active mediator whose own parent is an active
/// agency; for a mediator invite, the parent must be an active agency.
fn assert_issuer_chain_live(conn: &Connection, invite: &Invite) -> AppResult<()> {
    let Some(parent_code) = invite.parent_code.as_deref() else {
        return Ok(());
    };
    let parent = user_repo::get_user_by_mediator_code(conn, parent_code)?
        .ok_or(AppError::InviteParentNotActive)?;
    if !parent.is_active() {
        return Err(AppError::InviteParentNotActive);
    }

    match invite.role {
        Role::Buyer => {
            if parent.role != Role::Mediator {
                return Err(AppError::InviteParentNotActive);
            }
            if let Some(grandparent_code) = parent.parent_code.as_deref() {
                let grandparent = user_repo::get_user_by_mediator_code(conn, grandparent_code)?
                    .ok_or(AppError::InviteUpstreamNotActive)?;
                if !grandparent.is_active() || grandparent.role != Role::Agency {
                    return Err(AppError::InviteUpstreamNotActive);
                }
            } else {
                return Err(AppError::InviteUpstreamNotActive);
            }
        }
        Role::Mediator => {
            if parent.role != Role::Agency {
                return Err(AppError::InviteParentNotActive);
            }
        }
        _ => {}
    }
    Ok(())
}

/// Validates and atomically consumes one use of an invite (spec §4.4).
pub fn consume_invite(conn: &Connection, input: ConsumeInviteInput) -> AppResult<Invite> {
    let invite = invite_repo::get_invite_by_code(conn, &input.code)?
        .ok_or(AppError::InvalidInvite)?;

    if invite.role != input.role {
        return Err(AppError::InviteRoleMismatch);
    }
    if invite.status != InviteStatus::Active {
        return Err(AppError::InvalidInvite);
    }

    let now = Utc::now();
    if let Some(expires_at) = invite.expires_at {
        if expires_at <= now {
            // Persists even though the caller's overall operation fails.
            let _ = invite_repo::revoke_invite(conn, &input.code);
            conn.execute(
                "UPDATE invites SET status = 'expired' WHERE code = ?1",
                rusqlite::params![input.code],
            )
            .ok();
            return Err(AppError::InviteExpired);
        }
    }
    if invite.use_count >= invite.max_uses {
        return Err(AppError::InvalidInvite);
    }

    if input.require_active_issuer {
        let issuer = user_repo::get_user_by_id(conn, invite.created_by)?
            .ok_or(AppError::InviteParentNotActive)?;
        if !issuer.is_active() {
            return Err(AppError::InviteParentNotActive);
        }
        assert_issuer_chain_live(conn, &invite)?;
    }

    let affected = invite_repo::try_consume(
        conn,
        &input.code,
        input.used_by_user_id,
        now,
        &now.to_rfc3339(),
    )?;
    if affected == 0 {
        return Err(AppError::InvalidInvite);
    }

    let updated = invite_repo::get_invite_by_code(conn, &input.code)?
        .ok_or(AppError::InvalidInvite)?;

    write_audit_log(
        conn,
        WriteAuditLog {
            actor_user_id: Some(input.used_by_user_id),
            action: "INVITE_CONSUMED",
            entity_type: "invite",
            entity_id: &input.code,
            ip: None,
            user_agent: None,
            metadata: None,
        },
    );

    Ok(updated)
}

pub fn revoke_invite(conn: &Connection, code: &str) -> AppResult<()> {
    let affected = invite_repo::revoke_invite(conn, code)?;
    if affected == 0 {
        return Err(AppError::InvalidInvite);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::new_test_pool;
    use crate::domain::invite::Invite;
    use rusqlite::params;
    use uuid::Uuid;

    fn seed_invite(conn: &Connection, code: &str, max_uses: i64) -> Uuid {
        let creator = Uuid::new_v4();
        conn.execute(
            "INSERT INTO users (id, role, roles, status, mobile, username, password_hash, name, \
             mediator_code, parent_code, brand_code, connected_agencies, kyc, \
             payment_instruments, failed_login_attempts, lockout_until, deleted_at, created_at, \
             updated_at) VALUES (?1,'admin','[\"admin\"]','active','9990000000',NULL,'h',NULL, \
             NULL,NULL,NULL,'[]','{}','{}',0,NULL,NULL,?2,?2)",
            params![creator.to_string(), Utc::now().to_rfc3339()],
        )
        .unwrap();
        let invite = Invite {
            id: Uuid::new_v4(),
            code: code.to_string(),
            role: Role::Buyer,
            parent_code: None,
            parent_user_id: None,
            created_by: creator,
            status: InviteStatus::Active,
            max_uses,
            use_count: 0,
            expires_at: None,
            uses: vec![],
        };
        invite_repo::insert_invite(conn, &invite).unwrap();
        creator
    }

    #[test]
    fn single_use_invite_consumes_once() {
        let pool = new_test_pool();
        let conn = pool.get().unwrap();
        seed_invite(&conn, "INV1", 1);

        let used_by = Uuid::new_v4();
        let result = consume_invite(
            &conn,
            ConsumeInviteInput {
                code: "INV1".into(),
                role: Role::Buyer,
                used_by_user_id: used_by,
                require_active_issuer: false,
            },
        )
        .unwrap();
        assert_eq!(result.use_count, 1);
        assert_eq!(result.status, InviteStatus::Used);

        let err = consume_invite(
            &conn,
            ConsumeInviteInput {
                code: "INV1".into(),
                role: Role::Buyer,
                used_by_user_id: Uuid::new_v4(),
                require_active_issuer: false,
            },
        )
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidInvite));
    }
}
