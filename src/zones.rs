//! Account-scoped zone and record mutations.
//!
//! Each public operation runs in one transaction: resolve the caller's
//! account from the token subject, resolve the zone inside that account,
//! apply the change and bump the SOA serial, then commit. Any failure rolls
//! the whole transaction back so a zone's records and its serial always move
//! together.
use std::future::Future;
use std::sync::Arc;

use sqlx::{Sqlite, SqliteConnection, Transaction};
use thiserror::Error;

use crate::config::{AppConfig, RetryPolicy};
use crate::db::record_repo::{RecordData, RecordKey, RecordRow};
use crate::db::{self, Db, account_repo, domain_repo, record_repo};
use crate::record_type::RecordType;
use crate::soa::{self, SerialProtocol, SoaError};
use crate::validation::{self, ValidationError};

#[derive(Debug, Error)]
pub enum ZoneError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("no account for subject '{0}'")]
    UnknownAccount(String),
    #[error("zone '{0}' not found")]
    ZoneNotFound(String),
    #[error("zone '{0}' is owned by another account")]
    ZoneTaken(String),
    #[error("no record matches {name} {rtype} {content}")]
    RecordNotFound {
        name: String,
        rtype: RecordType,
        content: String,
    },
    #[error("transaction conflicted with a concurrent writer: {0}")]
    Conflict(sqlx::Error),
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error(transparent)]
    Soa(SoaError),
}

impl From<sqlx::Error> for ZoneError {
    fn from(err: sqlx::Error) -> Self {
        if db::is_transient(&err) {
            ZoneError::Conflict(err)
        } else {
            ZoneError::Database(err)
        }
    }
}

impl From<SoaError> for ZoneError {
    fn from(err: SoaError) -> Self {
        match err {
            SoaError::Database(e) => e.into(),
            other => ZoneError::Soa(other),
        }
    }
}

impl ZoneError {
    /// Caller mistakes, as opposed to server-side failures.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ZoneError::Invalid(_)
                | ZoneError::UnknownAccount(_)
                | ZoneError::ZoneNotFound(_)
                | ZoneError::ZoneTaken(_)
                | ZoneError::RecordNotFound { .. }
        )
    }
}

/// Record fields supplied by AddRecord and as UpdateRecord's source.
#[derive(Debug, Clone)]
pub struct RecordSpec {
    pub name: String,
    pub rtype: RecordType,
    pub content: String,
    /// Zero means the configured default.
    pub ttl: u32,
}

/// Identifies an existing record for RemoveRecord / UpdateRecord.
#[derive(Debug, Clone)]
pub struct RecordMatch {
    pub name: String,
    pub rtype: RecordType,
    pub content: String,
}

/// A non-SOA record as returned by GetRecords.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneRecord {
    pub name: String,
    pub rtype: String,
    pub content: String,
    pub ttl: u32,
}

impl From<RecordRow> for ZoneRecord {
    fn from(row: RecordRow) -> Self {
        Self {
            name: row.name,
            rtype: row.rtype,
            content: row.content,
            ttl: row.ttl,
        }
    }
}

/// A zone as returned by GetDomains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneSummary {
    pub name: String,
    pub kind: String,
    pub serial: Option<u32>,
}

/// Validated, canonical form of a [`RecordSpec`].
struct CheckedRecord {
    name: String,
    rtype: RecordType,
    content: String,
    ttl: u32,
}

impl CheckedRecord {
    fn as_data(&self) -> RecordData<'_> {
        RecordData {
            name: &self.name,
            rtype: self.rtype,
            content: &self.content,
            ttl: self.ttl,
        }
    }
}

/// Validated, canonical form of a [`RecordMatch`].
struct CheckedMatch {
    name: String,
    rtype: RecordType,
    content: String,
}

impl CheckedMatch {
    fn as_key(&self) -> RecordKey<'_> {
        RecordKey {
            name: &self.name,
            rtype: self.rtype,
            content: &self.content,
        }
    }

    fn not_found(&self) -> ZoneError {
        ZoneError::RecordNotFound {
            name: self.name.clone(),
            rtype: self.rtype,
            content: self.content.clone(),
        }
    }
}

pub struct ZoneStore {
    db: Db,
    serials: Arc<SerialProtocol>,
    default_ttl: u32,
    exclusive_names: bool,
    retry: RetryPolicy,
}

impl ZoneStore {
    pub fn new(db: Db, serials: Arc<SerialProtocol>, config: &AppConfig) -> Self {
        Self {
            db,
            serials,
            default_ttl: config.default_ttl,
            exclusive_names: config.exclusive_zone_names,
            retry: config.retry,
        }
    }

    /// Create the zone, or wipe it back to a lone SOA if it already exists.
    pub async fn init_zone(&self, subject: &str, zone: &str) -> Result<u32, ZoneError> {
        let zone = validation::zone_name(zone)?;
        let serial = self
            .retrying("init_zone", || self.init_zone_once(subject, &zone))
            .await?;
        tracing::info!(zone = %zone, serial, "zone initialised");
        Ok(serial)
    }

    async fn init_zone_once(&self, subject: &str, zone: &str) -> Result<u32, ZoneError> {
        let mut tx = self.db.begin().await?;
        let outcome: Result<_, ZoneError> = async {
            let account_id = resolve_account(&mut tx, subject).await?;
            let (domain_id, previous) = match domain_repo::find_id(&mut tx, zone, account_id).await? {
                Some(id) => {
                    let previous = record_repo::soa_contents(&mut tx, id)
                        .await?
                        .iter()
                        .filter_map(|c| soa::serial_of(c))
                        .max();
                    let removed = record_repo::delete_all(&mut tx, id).await?;
                    tracing::debug!(zone, removed, "resetting existing zone");
                    (id, previous)
                }
                None => {
                    if self.exclusive_names
                        && domain_repo::owned_by_other(&mut tx, zone, account_id).await?
                    {
                        return Err(ZoneError::ZoneTaken(zone.to_string()));
                    }
                    (domain_repo::insert(&mut tx, zone, account_id).await?, None)
                }
            };
            Ok(self.serials.stamp(&mut tx, domain_id, zone, previous).await?)
        }
        .await;
        finish(tx, outcome).await
    }

    /// Delete the zone and all its records.
    pub async fn remove_zone(&self, subject: &str, zone: &str) -> Result<(), ZoneError> {
        let zone = validation::zone_name(zone)?;
        self.retrying("remove_zone", || self.remove_zone_once(subject, &zone))
            .await?;
        tracing::info!(zone = %zone, "zone removed");
        Ok(())
    }

    async fn remove_zone_once(&self, subject: &str, zone: &str) -> Result<(), ZoneError> {
        let mut tx = self.db.begin().await?;
        let outcome: Result<_, ZoneError> = async {
            let domain_id = resolve_zone(&mut tx, subject, zone).await?;
            record_repo::delete_all(&mut tx, domain_id).await?;
            domain_repo::delete(&mut tx, domain_id).await?;
            Ok(())
        }
        .await;
        finish(tx, outcome).await
    }

    /// Add a record to `origin`. Returns the zone's new serial.
    pub async fn add_record(
        &self,
        subject: &str,
        origin: &str,
        record: &RecordSpec,
    ) -> Result<u32, ZoneError> {
        let origin = validation::zone_name(origin)?;
        let record = self.check_record(record, &origin)?;
        let serial = self
            .retrying("add_record", || self.add_record_once(subject, &origin, &record))
            .await?;
        tracing::info!(zone = %origin, name = %record.name, rtype = %record.rtype, serial, "record added");
        Ok(serial)
    }

    async fn add_record_once(
        &self,
        subject: &str,
        origin: &str,
        record: &CheckedRecord,
    ) -> Result<u32, ZoneError> {
        let mut tx = self.db.begin().await?;
        let outcome: Result<_, ZoneError> = async {
            let domain_id = resolve_zone(&mut tx, subject, origin).await?;
            let serial = self.serials.bump(&mut tx, domain_id, origin).await?;
            record_repo::insert(&mut tx, domain_id, record.as_data(), i64::from(serial)).await?;
            Ok(serial)
        }
        .await;
        finish(tx, outcome).await
    }

    /// Remove every record of `origin` equal to `target`. Returns the new serial.
    pub async fn remove_record(
        &self,
        subject: &str,
        origin: &str,
        target: &RecordMatch,
    ) -> Result<u32, ZoneError> {
        let origin = validation::zone_name(origin)?;
        let target = check_match(target, &origin)?;
        let serial = self
            .retrying("remove_record", || self.remove_record_once(subject, &origin, &target))
            .await?;
        tracing::info!(zone = %origin, name = %target.name, rtype = %target.rtype, serial, "record removed");
        Ok(serial)
    }

    async fn remove_record_once(
        &self,
        subject: &str,
        origin: &str,
        target: &CheckedMatch,
    ) -> Result<u32, ZoneError> {
        let mut tx = self.db.begin().await?;
        let outcome: Result<_, ZoneError> = async {
            let domain_id = resolve_zone(&mut tx, subject, origin).await?;
            let removed = record_repo::delete_matching(&mut tx, domain_id, target.as_key()).await?;
            if removed == 0 {
                return Err(target.not_found());
            }
            Ok(self.serials.bump(&mut tx, domain_id, origin).await?)
        }
        .await;
        finish(tx, outcome).await
    }

    /// Rewrite the record(s) equal to `target` with `source`. Returns the new serial.
    pub async fn update_record(
        &self,
        subject: &str,
        origin: &str,
        target: &RecordMatch,
        source: &RecordSpec,
    ) -> Result<u32, ZoneError> {
        let origin = validation::zone_name(origin)?;
        let target = check_match(target, &origin)?;
        let source = self.check_record(source, &origin)?;
        let serial = self
            .retrying("update_record", || {
                self.update_record_once(subject, &origin, &target, &source)
            })
            .await?;
        tracing::info!(zone = %origin, name = %source.name, rtype = %source.rtype, serial, "record updated");
        Ok(serial)
    }

    async fn update_record_once(
        &self,
        subject: &str,
        origin: &str,
        target: &CheckedMatch,
        source: &CheckedRecord,
    ) -> Result<u32, ZoneError> {
        let mut tx = self.db.begin().await?;
        let outcome: Result<_, ZoneError> = async {
            let domain_id = resolve_zone(&mut tx, subject, origin).await?;
            let serial = self.serials.bump(&mut tx, domain_id, origin).await?;
            let updated = record_repo::update_matching(
                &mut tx,
                domain_id,
                target.as_key(),
                source.as_data(),
                i64::from(serial),
            )
            .await?;
            if updated == 0 {
                return Err(target.not_found());
            }
            Ok(serial)
        }
        .await;
        finish(tx, outcome).await
    }

    /// All records of `origin` except the SOA.
    pub async fn get_records(&self, subject: &str, origin: &str) -> Result<Vec<ZoneRecord>, ZoneError> {
        let origin = validation::zone_name(origin)?;
        self.retrying("get_records", || self.get_records_once(subject, &origin))
            .await
    }

    async fn get_records_once(&self, subject: &str, origin: &str) -> Result<Vec<ZoneRecord>, ZoneError> {
        let mut tx = self.db.begin().await?;
        let outcome: Result<_, ZoneError> = async {
            let domain_id = resolve_zone(&mut tx, subject, origin).await?;
            let rows = record_repo::list_without_soa(&mut tx, domain_id).await?;
            Ok(rows.into_iter().map(ZoneRecord::from).collect())
        }
        .await;
        finish(tx, outcome).await
    }

    /// Every zone owned by the caller.
    pub async fn get_domains(&self, subject: &str) -> Result<Vec<ZoneSummary>, ZoneError> {
        self.retrying("get_domains", || self.get_domains_once(subject))
            .await
    }

    async fn get_domains_once(&self, subject: &str) -> Result<Vec<ZoneSummary>, ZoneError> {
        let mut tx = self.db.begin().await?;
        let outcome: Result<_, ZoneError> = async {
            let account_id = resolve_account(&mut tx, subject).await?;
            let domains = domain_repo::list_for_account(&mut tx, account_id).await?;
            Ok(domains
                .into_iter()
                .map(|d| ZoneSummary {
                    serial: d.soa_content.as_deref().and_then(soa::serial_of),
                    name: d.name,
                    kind: d.kind,
                })
                .collect())
        }
        .await;
        finish(tx, outcome).await
    }

    fn check_record(&self, spec: &RecordSpec, origin: &str) -> Result<CheckedRecord, ZoneError> {
        let rtype = validation::writable_type(spec.rtype)?;
        Ok(CheckedRecord {
            name: validation::owner_name(&spec.name, origin)?,
            rtype,
            content: validation::record_content(rtype, &spec.content)?,
            ttl: if spec.ttl == 0 { self.default_ttl } else { spec.ttl },
        })
    }

    /// Run `attempt` again while it fails with a transient conflict, up to
    /// the policy's attempt budget.
    async fn retrying<T, F, Fut>(&self, op: &'static str, mut attempt: F) -> Result<T, ZoneError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ZoneError>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut tries = 1;
        loop {
            match attempt().await {
                Err(ZoneError::Conflict(err)) if tries < max_attempts => {
                    let delay = self.retry.delay_for(tries);
                    tracing::warn!(op, tries, ?delay, "transaction conflict, retrying: {err}");
                    tokio::time::sleep(delay).await;
                    tries += 1;
                }
                Err(err) if err.is_client_error() => {
                    tracing::debug!(op, "rejected: {err}");
                    return Err(err);
                }
                Err(err) => {
                    tracing::error!(op, tries, "failed: {err}");
                    return Err(err);
                }
                Ok(value) => return Ok(value),
            }
        }
    }
}

fn check_match(target: &RecordMatch, origin: &str) -> Result<CheckedMatch, ZoneError> {
    let rtype = validation::writable_type(target.rtype)?;
    Ok(CheckedMatch {
        name: validation::owner_name(&target.name, origin)?,
        rtype,
        content: target.content.trim().to_string(),
    })
}

async fn resolve_account(conn: &mut SqliteConnection, subject: &str) -> Result<i64, ZoneError> {
    account_repo::find_id_by_email(conn, subject)
        .await?
        .ok_or_else(|| ZoneError::UnknownAccount(subject.to_string()))
}

async fn resolve_zone(
    conn: &mut SqliteConnection,
    subject: &str,
    zone: &str,
) -> Result<i64, ZoneError> {
    let account_id = resolve_account(conn, subject).await?;
    domain_repo::find_id(conn, zone, account_id)
        .await?
        .ok_or_else(|| ZoneError::ZoneNotFound(zone.to_string()))
}

/// Commit on success, roll back on failure.
async fn finish<T>(
    tx: Transaction<'static, Sqlite>,
    outcome: Result<T, ZoneError>,
) -> Result<T, ZoneError> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!("rollback failed: {rollback}");
            }
            Err(err)
        }
    }
}
