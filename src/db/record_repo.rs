//! Repository functions for the PowerDNS `records` table.
use sqlx::{Row, SqliteConnection};

use crate::record_type::RecordType;

/// A stored resource record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRow {
    pub id: i64,
    pub name: String,
    pub rtype: String,
    pub content: String,
    pub ttl: u32,
    pub change_date: Option<i64>,
}

/// Identifies records by owner name, type and content.
#[derive(Debug, Clone, Copy)]
pub struct RecordKey<'a> {
    pub name: &'a str,
    pub rtype: RecordType,
    pub content: &'a str,
}

/// Field values written by insert and update.
#[derive(Debug, Clone, Copy)]
pub struct RecordData<'a> {
    pub name: &'a str,
    pub rtype: RecordType,
    pub content: &'a str,
    pub ttl: u32,
}

pub async fn insert(
    conn: &mut SqliteConnection,
    domain_id: i64,
    data: RecordData<'_>,
    change_date: i64,
) -> sqlx::Result<i64> {
    let res = sqlx::query(
        r#"
        INSERT INTO records (domain_id, name, type, content, ttl, change_date, disabled, auth)
        VALUES (?, ?, ?, ?, ?, ?, 0, 1)
        "#,
    )
    .bind(domain_id)
    .bind(data.name)
    .bind(data.rtype.as_str())
    .bind(data.content)
    .bind(i64::from(data.ttl))
    .bind(change_date)
    .execute(&mut *conn)
    .await?;
    Ok(res.last_insert_rowid())
}

/// Remove every record of a zone, SOA included.
pub async fn delete_all(conn: &mut SqliteConnection, domain_id: i64) -> sqlx::Result<u64> {
    let res = sqlx::query("DELETE FROM records WHERE domain_id = ?")
        .bind(domain_id)
        .execute(&mut *conn)
        .await?;
    Ok(res.rows_affected())
}

pub async fn delete_matching(
    conn: &mut SqliteConnection,
    domain_id: i64,
    key: RecordKey<'_>,
) -> sqlx::Result<u64> {
    let res = sqlx::query(
        "DELETE FROM records WHERE domain_id = ? AND name = ? AND type = ? AND content = ?",
    )
    .bind(domain_id)
    .bind(key.name)
    .bind(key.rtype.as_str())
    .bind(key.content)
    .execute(&mut *conn)
    .await?;
    Ok(res.rows_affected())
}

pub async fn update_matching(
    conn: &mut SqliteConnection,
    domain_id: i64,
    target: RecordKey<'_>,
    source: RecordData<'_>,
    change_date: i64,
) -> sqlx::Result<u64> {
    let res = sqlx::query(
        r#"
        UPDATE records
        SET name = ?, type = ?, content = ?, ttl = ?, change_date = ?
        WHERE domain_id = ? AND name = ? AND type = ? AND content = ?
        "#,
    )
    .bind(source.name)
    .bind(source.rtype.as_str())
    .bind(source.content)
    .bind(i64::from(source.ttl))
    .bind(change_date)
    .bind(domain_id)
    .bind(target.name)
    .bind(target.rtype.as_str())
    .bind(target.content)
    .execute(&mut *conn)
    .await?;
    Ok(res.rows_affected())
}

/// Every record of the zone except its SOA, in insertion order.
pub async fn list_without_soa(
    conn: &mut SqliteConnection,
    domain_id: i64,
) -> sqlx::Result<Vec<RecordRow>> {
    let rows = sqlx::query(
        r#"
        SELECT id, name, type, content, ttl, change_date
        FROM records
        WHERE domain_id = ? AND type != 'SOA'
        ORDER BY id
        "#,
    )
    .bind(domain_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| RecordRow {
            id: row.get("id"),
            name: row.get("name"),
            rtype: row.get("type"),
            content: row.get("content"),
            ttl: u32::try_from(row.get::<Option<i64>, _>("ttl").unwrap_or(0)).unwrap_or(0),
            change_date: row.get("change_date"),
        })
        .collect())
}

/// Contents of the zone's SOA rows, newest first.
pub async fn soa_contents(conn: &mut SqliteConnection, domain_id: i64) -> sqlx::Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT content FROM records WHERE domain_id = ? AND type = 'SOA' ORDER BY id DESC",
    )
    .bind(domain_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

pub async fn delete_soa(conn: &mut SqliteConnection, domain_id: i64) -> sqlx::Result<u64> {
    let res = sqlx::query("DELETE FROM records WHERE domain_id = ? AND type = 'SOA'")
        .bind(domain_id)
        .execute(&mut *conn)
        .await?;
    Ok(res.rows_affected())
}
