pub mod account;
pub mod zone;

use axum::{
    Extension, Json, Router,
    extract::{FromRequest, Request, rejection::JsonRejection},
    middleware,
    routing::{get, post},
};
use serde::{Serialize, de::DeserializeOwned};
use tower_http::trace::TraceLayer;

use crate::error::{AppError, Status};
use crate::{SharedState, auth};

pub fn create_router(state: SharedState) -> Router {
    Router::new()
        // reachable without a token
        .route("/api/account", post(account::create_account))
        .route("/api/token", post(account::get_token))
        // authenticated
        .route("/api/account/password", post(account::change_password))
        .route("/api/zone/init", post(zone::init_zone))
        .route("/api/zone/remove", post(zone::remove_zone))
        .route("/api/record/add", post(zone::add_record))
        .route("/api/record/remove", post(zone::remove_record))
        .route("/api/record/update", post(zone::update_record))
        .route("/api/records", post(zone::get_records))
        .route("/api/domains", get(zone::get_domains))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_gate))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
}

/// `Json` whose rejections come back as a `BadRequest` body.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e: JsonRejection| AppError::bad_request(e.body_text()))?;
        Ok(JsonBody(value))
    }
}

/// Success body for operations with nothing else to report.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: Status,
}

impl StatusResponse {
    pub fn ok() -> Json<Self> {
        Json(Self { status: Status::Ok })
    }
}
