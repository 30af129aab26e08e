//! Repository functions for manipulating rows in the `accounts` table.
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

/// Application-level representation of a stored account.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Determine whether an email already has an account row.
pub async fn exists(conn: &mut SqliteConnection, email: &str) -> sqlx::Result<bool> {
    let cnt: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM accounts WHERE email = ?")
        .bind(email)
        .fetch_one(&mut *conn)
        .await?;
    Ok(cnt.0 > 0)
}

/// Fetch an account by email.
pub async fn find_by_email(
    conn: &mut SqliteConnection,
    email: &str,
) -> sqlx::Result<Option<Account>> {
    let row = sqlx::query(
        r#"
        SELECT id, email, password_hash, created_at, updated_at
        FROM accounts
        WHERE email = ?
        "#,
    )
    .bind(email)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    Ok(Some(Account {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    }))
}

/// Resolve the id owning `email`, the token subject.
pub async fn find_id_by_email(
    conn: &mut SqliteConnection,
    email: &str,
) -> sqlx::Result<Option<i64>> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM accounts WHERE email = ?")
        .bind(email)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|r| r.0))
}

/// Create a new account row.
pub async fn insert(
    conn: &mut SqliteConnection,
    email: &str,
    password_hash: &str,
) -> sqlx::Result<i64> {
    let now = Utc::now();

    let res = sqlx::query(
        r#"
        INSERT INTO accounts (email, password_hash, created_at, updated_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(email)
    .bind(password_hash)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(res.last_insert_rowid())
}

/// Replace the stored password hash. Returns false when no such account.
pub async fn update_password(
    conn: &mut SqliteConnection,
    account_id: i64,
    password_hash: &str,
) -> sqlx::Result<bool> {
    let now = Utc::now();
    let res = sqlx::query(
        r#"
        UPDATE accounts
        SET password_hash = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(password_hash)
    .bind(now)
    .bind(account_id)
    .execute(&mut *conn)
    .await?;

    Ok(res.rows_affected() > 0)
}
