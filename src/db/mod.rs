//! Relational store wiring (spec §4.1 C1).
//!
//! The teacher opens a fresh `rusqlite::Connection` per call
//! (`UserStore::new`/`get_user_by_username`/...). That serializes nothing
//! across connections and doesn't compose into multi-entity transactions.
//! Here a single bundled-SQLite database is shared via an `r2d2` pool so
//! concurrent request handlers each get their own connection, and
//! multi-entity operations (spec §5 "transactional discipline") borrow one
//! connection for the whole unit of work.

pub mod campaign_repo;
pub mod invite_repo;
pub mod order_repo;
pub mod schema;
pub mod user_repo;
pub mod wallet_repo;

use r2d2::CustomizeConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

pub type Pool = r2d2::Pool<SqliteConnectionManager>;
pub type PooledConn = r2d2::PooledConnection<SqliteConnectionManager>;

#[derive(Debug)]
struct Pragmas;

impl CustomizeConnection<Connection, rusqlite::Error> for Pragmas {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;",
        )
    }
}

pub fn new_pool(database_path: &str) -> anyhow::Result<Pool> {
    let manager = SqliteConnectionManager::file(database_path);
    let pool = r2d2::Pool::builder()
        .connection_customizer(Box::new(Pragmas))
        .build(manager)?;

    {
        let conn = pool.get()?;
        schema::init_schema(&conn)?;
    }

    Ok(pool)
}

#[cfg(test)]
pub fn new_test_pool() -> Pool {
    let manager = SqliteConnectionManager::memory();
    let pool = r2d2::Pool::builder()
        .max_size(1)
        .connection_customizer(Box::new(Pragmas))
        .build(manager)
        .expect("build in-memory pool");
    let conn = pool.get().expect("get conn");
    schema::init_schema(&conn).expect("init schema");
    pool
}
