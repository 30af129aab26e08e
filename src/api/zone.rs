// src/api/zone.rs
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use super::JsonBody;
use crate::SharedState;
use crate::auth::Authenticated;
use crate::error::{AppError, Status};
use crate::record_type::RecordType;
use crate::zones::{RecordMatch, RecordSpec, ZoneRecord, ZoneSummary};

/// Success body of every mutation: the zone's serial after the change.
#[derive(Debug, Serialize)]
pub struct SerialResponse {
    pub status: Status,
    pub serial: u32,
}

fn serial(serial: u32) -> Json<SerialResponse> {
    Json(SerialResponse {
        status: Status::Ok,
        serial,
    })
}

#[derive(Deserialize)]
pub struct ZoneRequest {
    pub domain: String,
}

// POST /api/zone/init
pub async fn init_zone(
    auth: Authenticated,
    Extension(state): Extension<SharedState>,
    JsonBody(req): JsonBody<ZoneRequest>,
) -> Result<Json<SerialResponse>, AppError> {
    let s = state.zones.init_zone(auth.subject(), &req.domain).await?;
    Ok(serial(s))
}

// POST /api/zone/remove
pub async fn remove_zone(
    auth: Authenticated,
    Extension(state): Extension<SharedState>,
    JsonBody(req): JsonBody<ZoneRequest>,
) -> Result<Json<super::StatusResponse>, AppError> {
    state.zones.remove_zone(auth.subject(), &req.domain).await?;
    Ok(super::StatusResponse::ok())
}

/// Record fields as they travel on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDto {
    pub name: String,
    #[serde(rename = "type")]
    pub rtype: RecordType,
    pub content: String,
    /// 0 or absent selects the server default.
    #[serde(default)]
    pub ttl: u32,
}

impl From<RecordDto> for RecordSpec {
    fn from(dto: RecordDto) -> Self {
        RecordSpec {
            name: dto.name,
            rtype: dto.rtype,
            content: dto.content,
            ttl: dto.ttl,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordKeyDto {
    pub name: String,
    #[serde(rename = "type")]
    pub rtype: RecordType,
    pub content: String,
}

impl From<RecordKeyDto> for RecordMatch {
    fn from(dto: RecordKeyDto) -> Self {
        RecordMatch {
            name: dto.name,
            rtype: dto.rtype,
            content: dto.content,
        }
    }
}

#[derive(Deserialize)]
pub struct AddRecordRequest {
    pub origin: String,
    #[serde(flatten)]
    pub record: RecordDto,
}

// POST /api/record/add
pub async fn add_record(
    auth: Authenticated,
    Extension(state): Extension<SharedState>,
    JsonBody(req): JsonBody<AddRecordRequest>,
) -> Result<Json<SerialResponse>, AppError> {
    let s = state
        .zones
        .add_record(auth.subject(), &req.origin, &req.record.into())
        .await?;
    Ok(serial(s))
}

#[derive(Deserialize)]
pub struct RemoveRecordRequest {
    pub origin: String,
    #[serde(flatten)]
    pub record: RecordKeyDto,
}

// POST /api/record/remove
pub async fn remove_record(
    auth: Authenticated,
    Extension(state): Extension<SharedState>,
    JsonBody(req): JsonBody<RemoveRecordRequest>,
) -> Result<Json<SerialResponse>, AppError> {
    let s = state
        .zones
        .remove_record(auth.subject(), &req.origin, &req.record.into())
        .await?;
    Ok(serial(s))
}

#[derive(Deserialize)]
pub struct UpdateRecordRequest {
    pub origin: String,
    pub target: RecordKeyDto,
    pub source: RecordDto,
}

// POST /api/record/update
pub async fn update_record(
    auth: Authenticated,
    Extension(state): Extension<SharedState>,
    JsonBody(req): JsonBody<UpdateRecordRequest>,
) -> Result<Json<SerialResponse>, AppError> {
    let s = state
        .zones
        .update_record(
            auth.subject(),
            &req.origin,
            &req.target.into(),
            &req.source.into(),
        )
        .await?;
    Ok(serial(s))
}

#[derive(Deserialize)]
pub struct RecordsRequest {
    pub origin: String,
}

#[derive(Debug, Serialize)]
pub struct RecordView {
    pub name: String,
    #[serde(rename = "type")]
    pub rtype: String,
    pub content: String,
    pub ttl: u32,
}

impl From<ZoneRecord> for RecordView {
    fn from(r: ZoneRecord) -> Self {
        Self {
            name: r.name,
            rtype: r.rtype,
            content: r.content,
            ttl: r.ttl,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecordsResponse {
    pub status: Status,
    pub records: Vec<RecordView>,
}

// POST /api/records
pub async fn get_records(
    auth: Authenticated,
    Extension(state): Extension<SharedState>,
    JsonBody(req): JsonBody<RecordsRequest>,
) -> Result<Json<RecordsResponse>, AppError> {
    let records = state.zones.get_records(auth.subject(), &req.origin).await?;
    Ok(Json(RecordsResponse {
        status: Status::Ok,
        records: records.into_iter().map(RecordView::from).collect(),
    }))
}

#[derive(Debug, Serialize)]
pub struct DomainView {
    pub name: String,
    pub kind: String,
    /// Absent when the stored SOA cannot be read.
    pub serial: Option<u32>,
}

impl From<ZoneSummary> for DomainView {
    fn from(z: ZoneSummary) -> Self {
        Self {
            name: z.name,
            kind: z.kind,
            serial: z.serial,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DomainsResponse {
    pub status: Status,
    pub domains: Vec<DomainView>,
}

// GET /api/domains
pub async fn get_domains(
    auth: Authenticated,
    Extension(state): Extension<SharedState>,
) -> Result<Json<DomainsResponse>, AppError> {
    let domains = state.zones.get_domains(auth.subject()).await?;
    Ok(Json(DomainsResponse {
        status: Status::Ok,
        domains: domains.into_iter().map(DomainView::from).collect(),
    }))
}
