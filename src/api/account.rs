// src/api/account.rs
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use super::{JsonBody, StatusResponse};
use crate::SharedState;
use crate::auth::Authenticated;
use crate::error::{AppError, Status};

#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub status: Status,
    pub token: String,
}

// POST /api/account
pub async fn create_account(
    Extension(state): Extension<SharedState>,
    JsonBody(req): JsonBody<CredentialsRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let token = state
        .credentials
        .create_account(&req.email, &req.password)
        .await?;
    Ok(Json(TokenResponse {
        status: Status::Ok,
        token,
    }))
}

// POST /api/token
pub async fn get_token(
    Extension(state): Extension<SharedState>,
    JsonBody(req): JsonBody<CredentialsRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let token = state.credentials.get_token(&req.email, &req.password).await?;
    Ok(Json(TokenResponse {
        status: Status::Ok,
        token,
    }))
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub password: String,
}

// POST /api/account/password
pub async fn change_password(
    auth: Authenticated,
    Extension(state): Extension<SharedState>,
    JsonBody(req): JsonBody<ChangePasswordRequest>,
) -> Result<Json<StatusResponse>, AppError> {
    state
        .credentials
        .change_password(auth.subject(), &req.password)
        .await?;
    Ok(StatusResponse::ok())
}
