//! Repository functions for the PowerDNS `domains` table.
use sqlx::{Row, SqliteConnection};

/// Zone kind written for every zone this service creates.
pub const ZONE_KIND: &str = "master";

/// A zone owned by an account, with its SOA content if present.
#[derive(Debug, Clone)]
pub struct DomainSummary {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub soa_content: Option<String>,
}

/// Resolve a zone name inside one account's namespace.
pub async fn find_id(
    conn: &mut SqliteConnection,
    name: &str,
    account_id: i64,
) -> sqlx::Result<Option<i64>> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM domains WHERE name = ? AND account = ?")
        .bind(name)
        .bind(account_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|r| r.0))
}

/// Whether some other account already holds a zone with this name.
pub async fn owned_by_other(
    conn: &mut SqliteConnection,
    name: &str,
    account_id: i64,
) -> sqlx::Result<bool> {
    let cnt: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM domains WHERE name = ? AND account IS NOT ?")
            .bind(name)
            .bind(account_id)
            .fetch_one(&mut *conn)
            .await?;
    Ok(cnt.0 > 0)
}

pub async fn insert(conn: &mut SqliteConnection, name: &str, account_id: i64) -> sqlx::Result<i64> {
    let res = sqlx::query("INSERT INTO domains (name, type, account) VALUES (?, ?, ?)")
        .bind(name)
        .bind(ZONE_KIND)
        .bind(account_id)
        .execute(&mut *conn)
        .await?;
    Ok(res.last_insert_rowid())
}

pub async fn delete(conn: &mut SqliteConnection, domain_id: i64) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM domains WHERE id = ?")
        .bind(domain_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// All zones of an account, ordered by name.
pub async fn list_for_account(
    conn: &mut SqliteConnection,
    account_id: i64,
) -> sqlx::Result<Vec<DomainSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT
            d.id,
            d.name,
            d.type,
            (SELECT r.content FROM records r
             WHERE r.domain_id = d.id AND r.type = 'SOA'
             ORDER BY r.id DESC LIMIT 1) AS soa_content
        FROM domains d
        WHERE d.account = ?
        ORDER BY d.name
        "#,
    )
    .bind(account_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| DomainSummary {
            id: row.get("id"),
            name: row.get("name"),
            kind: row.get("type"),
            soa_content: row.get("soa_content"),
        })
        .collect())
}
