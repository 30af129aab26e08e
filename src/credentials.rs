//! Account creation, credential checks and password changes.
use std::sync::Arc;

use thiserror::Error;

use crate::auth;
use crate::db::{self, Db, account_repo};
use crate::token::{TokenError, TokenService};
use crate::validation::{self, ValidationError};

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("account '{0}' already exists")]
    AlreadyExists(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("no account for subject '{0}'")]
    UnknownAccount(String),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("password hashing failed: {0}")]
    Hash(anyhow::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub struct CredentialStore {
    db: Db,
    tokens: Arc<TokenService>,
}

impl CredentialStore {
    pub fn new(db: Db, tokens: Arc<TokenService>) -> Self {
        Self { db, tokens }
    }

    /// Register `email` and return a token for it.
    pub async fn create_account(&self, email: &str, password: &str) -> Result<String, CredentialError> {
        let (email, password) = validation::credentials(email, password)?;
        let hash = hash_off_thread(password).await?;

        let mut tx = self.db.begin().await?;
        if account_repo::exists(&mut tx, email).await? {
            return Err(CredentialError::AlreadyExists(email.to_string()));
        }
        let id = account_repo::insert(&mut tx, email, &hash)
            .await
            .map_err(|e| {
                if db::is_unique_violation(&e) {
                    CredentialError::AlreadyExists(email.to_string())
                } else {
                    e.into()
                }
            })?;
        tx.commit().await.map_err(|e| {
            if db::is_unique_violation(&e) {
                CredentialError::AlreadyExists(email.to_string())
            } else {
                e.into()
            }
        })?;

        tracing::info!(account_id = id, email, "account created");
        Ok(self.tokens.issue(email)?)
    }

    /// Check a password; unknown emails and wrong passwords look the same.
    pub async fn verify_credentials(&self, email: &str, password: &str) -> Result<i64, CredentialError> {
        let (email, password) = validation::credentials(email, password)?;
        let mut conn = self.db.acquire().await?;
        let account = account_repo::find_by_email(&mut conn, email)
            .await?
            .ok_or(CredentialError::InvalidCredentials)?;

        let hash = account.password_hash.clone();
        let plain = password.to_owned();
        let matches = tokio::task::spawn_blocking(move || auth::verify_password(&hash, &plain))
            .await
            .map_err(|e| CredentialError::Hash(e.into()))?
            .map_err(CredentialError::Hash)?;

        if !matches {
            tracing::debug!(email, "password mismatch");
            return Err(CredentialError::InvalidCredentials);
        }
        Ok(account.id)
    }

    /// Exchange email and password for a fresh token.
    pub async fn get_token(&self, email: &str, password: &str) -> Result<String, CredentialError> {
        self.verify_credentials(email, password).await?;
        Ok(self.tokens.issue(email.trim())?)
    }

    /// Replace the password of the account behind `subject`. Tokens already
    /// issued stay valid until they expire.
    pub async fn change_password(&self, subject: &str, new_password: &str) -> Result<(), CredentialError> {
        if new_password.is_empty() {
            return Err(ValidationError::Empty("password").into());
        }
        let hash = hash_off_thread(new_password).await?;

        let mut tx = self.db.begin().await?;
        let account_id = account_repo::find_id_by_email(&mut tx, subject)
            .await?
            .ok_or_else(|| CredentialError::UnknownAccount(subject.to_string()))?;
        account_repo::update_password(&mut tx, account_id, &hash).await?;
        tx.commit().await?;

        tracing::info!(account_id, "password changed");
        Ok(())
    }
}

async fn hash_off_thread(password: &str) -> Result<String, CredentialError> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || auth::hash_password(&password))
        .await
        .map_err(|e| CredentialError::Hash(e.into()))?
        .map_err(CredentialError::Hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{test_db, test_tokens};

    async fn store() -> CredentialStore {
        CredentialStore::new(test_db().await, test_tokens())
    }

    #[tokio::test]
    async fn create_account_returns_token_for_email() {
        let store = store().await;
        let token = store.create_account("a@x.com", "pw").await.unwrap();
        let claims = store.tokens.verify(&token).unwrap();
        assert_eq!(claims.sub, "a@x.com");
    }

    #[tokio::test]
    async fn duplicate_email_already_exists() {
        let store = store().await;
        store.create_account("a@x.com", "pw").await.unwrap();
        let err = store.create_account("a@x.com", "other").await.unwrap_err();
        assert!(matches!(err, CredentialError::AlreadyExists(e) if e == "a@x.com"));
    }

    #[tokio::test]
    async fn empty_fields_are_rejected() {
        let store = store().await;
        assert!(matches!(
            store.create_account("", "pw").await,
            Err(CredentialError::Invalid(ValidationError::Empty("email")))
        ));
        assert!(matches!(
            store.create_account("a@x.com", "").await,
            Err(CredentialError::Invalid(ValidationError::Empty("password")))
        ));
    }

    #[tokio::test]
    async fn verify_credentials_checks_password() {
        let store = store().await;
        store.create_account("a@x.com", "pw").await.unwrap();

        assert!(store.verify_credentials("a@x.com", "pw").await.unwrap() > 0);
        assert!(matches!(
            store.verify_credentials("a@x.com", "nope").await,
            Err(CredentialError::InvalidCredentials)
        ));
        assert!(matches!(
            store.verify_credentials("b@x.com", "pw").await,
            Err(CredentialError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn change_password_swaps_credentials_but_keeps_tokens() {
        let store = store().await;
        let old_token = store.create_account("a@x.com", "pw").await.unwrap();

        store.change_password("a@x.com", "new-pw").await.unwrap();

        assert!(store.get_token("a@x.com", "pw").await.is_err());
        let fresh = store.get_token("a@x.com", "new-pw").await.unwrap();
        assert_eq!(store.tokens.verify(&fresh).unwrap().sub, "a@x.com");
        assert!(store.tokens.verify(&old_token).is_ok());
    }

    #[tokio::test]
    async fn change_password_validates_input_and_subject() {
        let store = store().await;
        store.create_account("a@x.com", "pw").await.unwrap();
        assert!(matches!(
            store.change_password("a@x.com", "").await,
            Err(CredentialError::Invalid(_))
        ));
        assert!(matches!(
            store.change_password("ghost@x.com", "pw2").await,
            Err(CredentialError::UnknownAccount(_))
        ));
    }
}
