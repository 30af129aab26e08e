//! Crate entrypoint wiring together configuration, DB, token service and APIs.

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod record_type;
pub mod soa;
pub mod token;
pub mod validation;
pub mod zones;

#[cfg(test)]
pub(crate) mod test_helpers;

use clock::Clock;
use config::AppConfig;
use credentials::CredentialStore;
use db::Db;
use ed25519_dalek::SigningKey;
use soa::SerialProtocol;
use token::TokenService;
use zones::ZoneStore;

use std::sync::Arc;

/// Complete application dependencies shared across handlers.
pub struct AppState {
    pub tokens: Arc<TokenService>,
    pub credentials: CredentialStore,
    pub zones: ZoneStore,
}

impl AppState {
    /// Build every component from explicit dependencies.
    pub fn new(config: AppConfig, db: Db, signing_key: SigningKey, clock: Arc<dyn Clock>) -> Self {
        let tokens = Arc::new(TokenService::new(
            signing_key,
            config.token_ttl,
            config.token_leeway,
            clock.clone(),
        ));
        let serials = Arc::new(SerialProtocol::new(
            config.soa_primary.clone(),
            config.soa_contact.clone(),
            clock,
        ));
        let credentials = CredentialStore::new(db.clone(), tokens.clone());
        let zones = ZoneStore::new(db, serials, &config);

        Self {
            tokens,
            credentials,
            zones,
        }
    }
}

/// Arc-wrapped version of `AppState` passed into Axum extensions.
pub type SharedState = Arc<AppState>;
