//! Shared fixtures for unit and router tests.
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use sqlx::Sqlite;
use sqlx::pool::PoolConnection;

use crate::clock::FixedClock;
use crate::config::AppConfig;
use crate::db::{self, Db, account_repo};
use crate::token::TokenService;
use crate::{AppState, SharedState};

/// 2023-11-14T22:21:40Z, five hundred seconds into a serial window.
pub const TEST_EPOCH: i64 = 1_700_000_500;

pub fn fixed_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(
        Utc.timestamp_opt(TEST_EPOCH, 0).single().expect("valid timestamp"),
    ))
}

pub async fn test_db() -> Db {
    db::init_memory_db()
        .await
        .expect("Failed to create in-memory SQLite pool")
}

/// Migrated database file inside `dir`, for tests that need several
/// connections to contend for the write lock.
pub async fn file_db(dir: &tempfile::TempDir, busy_timeout: Duration) -> Db {
    db::init_db(&dir.path().join("zones.sqlite"), busy_timeout)
        .await
        .expect("Failed to create file-backed SQLite pool")
}

/// Check out a connection and take the database write lock on it.
/// Issue `ROLLBACK` on the returned connection to release it.
pub async fn hold_write_lock(db: &Db) -> PoolConnection<Sqlite> {
    let mut conn = db.acquire().await.expect("connection");
    sqlx::query("BEGIN IMMEDIATE")
        .execute(&mut *conn)
        .await
        .expect("take write lock");
    conn
}

pub fn test_tokens() -> Arc<TokenService> {
    Arc::new(TokenService::new(
        TokenService::generate_signing_key(),
        Duration::from_secs(3600),
        Duration::from_secs(30),
        fixed_clock(),
    ))
}

pub fn test_config() -> AppConfig {
    AppConfig {
        soa_primary: "ns1.example.net.".into(),
        soa_contact: "hostmaster.example.net.".into(),
        ..AppConfig::default()
    }
}

/// Insert an account row directly, skipping password hashing.
pub async fn seed_account(db: &Db, email: &str) -> i64 {
    let mut conn = db.acquire().await.expect("connection");
    account_repo::insert(&mut conn, email, "$argon2id$unused")
        .await
        .expect("seed account")
}

/// State wired the way `main` wires it, over an in-memory database.
pub async fn create_test_app_state(config: AppConfig) -> SharedState {
    let db = test_db().await;
    Arc::new(AppState::new(
        config,
        db,
        TokenService::generate_signing_key(),
        fixed_clock(),
    ))
}
