//! User row <-> domain mapping (spec §4.1, §3 `User`).

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use uuid::Uuid;

use crate::domain::user::{KycStatus, PaymentInstruments, Role, User, UserStatus};
use crate::error::{AppError, AppResult};

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    let role_str: String = row.get("role")?;
    let status_str: String = row.get("status")?;
    let roles_json: String = row.get("roles")?;
    let roles: Vec<String> = serde_json::from_str(&roles_json).unwrap_or_default();
    let connected_json: String = row.get("connected_agencies")?;
    let connected: Vec<String> = serde_json::from_str(&connected_json).unwrap_or_default();
    let kyc_json: String = row.get("kyc")?;
    let pay_json: String = row.get("payment_instruments")?;
    let lockout: Option<String> = row.get("lockout_until")?;
    let deleted: Option<String> = row.get("deleted_at")?;

    Ok(User {
        id: Uuid::parse_str(&row.get::<_, String>("id")?).unwrap_or_default(),
        role: Role::from_str(&role_str).unwrap_or(Role::Buyer),
        roles: roles
            .iter()
            .filter_map(|s| Role::from_str(s))
            .collect::<HashSet<_>>(),
        status: UserStatus::from_str(&status_str).unwrap_or(UserStatus::Pending),
        mobile: row.get("mobile")?,
        username: row.get("username")?,
        password_hash: row.get("password_hash")?,
        name: row.get("name")?,
        mediator_code: row.get("mediator_code")?,
        parent_code: row.get("parent_code")?,
        brand_code: row.get("brand_code")?,
        connected_agencies: connected.into_iter().collect(),
        kyc: serde_json::from_str::<KycStatus>(&kyc_json).unwrap_or_default(),
        payment_instruments: serde_json::from_str::<PaymentInstruments>(&pay_json)
            .unwrap_or_default(),
        failed_login_attempts: row.get::<_, i64>("failed_login_attempts")? as u32,
        lockout_until: lockout.and_then(|s| DateTime::parse_from_rfc3339(&s).ok().map(|d| d.with_timezone(&Utc))),
        deleted_at: deleted.and_then(|s| DateTime::parse_from_rfc3339(&s).ok().map(|d| d.with_timezone(&Utc))),
        created_at: DateTime::parse_from_rfc3339(&row.get::<_, String>("created_at")?)
            .unwrap()
            .with_timezone(&Utc),
        updated_at: DateTime::parse_from_rfc3339(&row.get::<_, String>("updated_at")?)
            .unwrap()
            .with_timezone(&Utc),
    })
}

const SELECT_COLS: &str = "id, role, roles, status, mobile, username, password_hash, name, \
    mediator_code, parent_code, brand_code, connected_agencies, kyc, payment_instruments, \
    failed_login_attempts, lockout_until, deleted_at, created_at, updated_at";

pub fn insert_user(conn: &Connection, user: &User) -> AppResult<()> {
    let roles_json = serde_json::to_string(
        &user.roles.iter().map(|r| r.as_str()).collect::<Vec<_>>(),
    )
    .unwrap();
    let connected_json = serde_json::to_string(
        &user.connected_agencies.iter().cloned().collect::<Vec<_>>(),
    )
    .unwrap();
    conn.execute(
        "INSERT INTO users (id, role, roles, status, mobile, username, password_hash, name, \
         mediator_code, parent_code, brand_code, connected_agencies, kyc, payment_instruments, \
         failed_login_attempts, lockout_until, deleted_at, created_at, updated_at) \
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19)",
        params![
            user.id.to_string(),
            user.role.as_str(),
            roles_json,
            user.status.as_str(),
            user.mobile,
            user.username,
            user.password_hash,
            user.name,
            user.mediator_code,
            user.parent_code,
            user.brand_code,
            connected_json,
            serde_json::to_string(&user.kyc).unwrap(),
            serde_json::to_string(&user.payment_instruments).unwrap(),
            user.failed_login_attempts as i64,
            user.lockout_until.map(|d| d.to_rfc3339()),
            user.deleted_at.map(|d| d.to_rfc3339()),
            user.created_at.to_rfc3339(),
            user.updated_at.to_rfc3339(),
        ],
    )
    .map_err(|e| {
        if matches!(&e, rusqlite::Error::SqliteFailure(f, _) if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)
        {
            AppError::Internal("mobile or username already in use".into())
        } else {
            AppError::from(e)
        }
    })?;
    Ok(())
}

pub fn get_user_by_id(conn: &Connection, id: Uuid) -> AppResult<Option<User>> {
    let sql = format!("SELECT {SELECT_COLS} FROM users WHERE id = ?1 AND deleted_at IS NULL");
    Ok(conn
        .query_row(&sql, params![id.to_string()], row_to_user)
        .optional()?)
}

pub fn get_user_by_mobile(conn: &Connection, mobile: &str) -> AppResult<Option<User>> {
    let sql = format!("SELECT {SELECT_COLS} FROM users WHERE mobile = ?1 AND deleted_at IS NULL");
    Ok(conn.query_row(&sql, params![mobile], row_to_user).optional()?)
}

pub fn get_user_by_username(conn: &Connection, username: &str) -> AppResult<Option<User>> {
    let sql =
        format!("SELECT {SELECT_COLS} FROM users WHERE username = ?1 AND deleted_at IS NULL");
    Ok(conn
        .query_row(&sql, params![username], row_to_user)
        .optional()?)
}

pub fn get_user_by_mediator_code(conn: &Connection, code: &str) -> AppResult<Option<User>> {
    let sql = format!(
        "SELECT {SELECT_COLS} FROM users WHERE mediator_code = ?1 AND deleted_at IS NULL"
    );
    Ok(conn.query_row(&sql, params![code], row_to_user).optional()?)
}

pub fn record_login_failure(conn: &Connection, user_id: Uuid, lockout_until: Option<DateTime<Utc>>) -> AppResult<()> {
    conn.execute(
        "UPDATE users SET failed_login_attempts = failed_login_attempts + 1, lockout_until = ?2, \
         updated_at = ?3 WHERE id = ?1",
        params![
            user_id.to_string(),
            lockout_until.map(|d| d.to_rfc3339()),
            Utc::now().to_rfc3339()
        ],
    )?;
    Ok(())
}

pub fn clear_login_failures(conn: &Connection, user_id: Uuid) -> AppResult<()> {
    conn.execute(
        "UPDATE users SET failed_login_attempts = 0, lockout_until = NULL, updated_at = ?2 \
         WHERE id = ?1",
        params![user_id.to_string(), Utc::now().to_rfc3339()],
    )?;
    Ok(())
}
