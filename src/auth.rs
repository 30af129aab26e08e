//! Bearer-token gate, the `Authenticated` extractor and password helpers.
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};
use std::future::Future;

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand_core::OsRng;

use crate::SharedState;
use crate::error::AppError;
use crate::token::Claims;

/// Header carrying the bare token.
pub const TOKEN_HEADER: &str = "token";

/// Who is calling, as established by [`auth_gate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Unauthenticated,
    Authenticated(Claims),
}

/// Pull the single token off the request, if any.
fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, AppError> {
    let mut found = Vec::new();

    for value in headers.get_all(TOKEN_HEADER) {
        let token = value
            .to_str()
            .map_err(|_| AppError::unauthorized("invalid token header"))?;
        found.push(token.trim());
    }
    for value in headers.get_all(header::AUTHORIZATION) {
        let value = value
            .to_str()
            .map_err(|_| AppError::unauthorized("invalid Authorization header"))?;
        // auth scheme names are case-insensitive
        let token = match value.trim().split_once(' ') {
            Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token,
            _ => return Err(AppError::unauthorized("expected Bearer auth")),
        };
        found.push(token.trim());
    }

    match found.as_slice() {
        [] => Ok(None),
        [token] => Ok(Some(token)),
        _ => Err(AppError::unauthorized("more than one token supplied")),
    }
}

/// Resolve the caller's identity before any handler runs.
///
/// Requests without a token pass through unauthenticated so that account
/// creation and token issuance stay reachable. A token that fails
/// verification stops the request here.
pub async fn auth_gate(
    State(state): State<SharedState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = match bearer_token(request.headers())? {
        None => Identity::Unauthenticated,
        Some(token) => {
            let claims = state.tokens.verify(token).map_err(|e| {
                tracing::debug!("rejecting token: {e}");
                AppError::unauthorized(e.to_string())
            })?;
            Identity::Authenticated(claims)
        }
    };

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Axum extractor that requires a verified token on the request.
pub struct Authenticated(pub Claims);

impl Authenticated {
    pub fn subject(&self) -> &str {
        &self.0.sub
    }
}

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> {
        let identity = parts.extensions.get::<Identity>().cloned();
        async move {
            match identity {
                Some(Identity::Authenticated(claims)) => Ok(Authenticated(claims)),
                Some(Identity::Unauthenticated) => Err(AppError::unauthorized("missing token")),
                None => Err(AppError::Internal(anyhow::anyhow!(
                    "auth gate not installed on this route"
                ))),
            }
        }
    }
}

/// Hash a plaintext password using Argon2 + random salt.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|_| anyhow::anyhow!("Failed to hash password"))?
        .to_string();
    Ok(hash)
}

/// Verify a plaintext password against a stored Argon2 hash.
pub fn verify_password(hash: &str, plain: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|_| anyhow::anyhow!("Failed to instantiate PasswordHash"))?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("changeme").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(&hash, "changeme").unwrap());
        assert!(!verify_password(&hash, "changeme!").unwrap());
    }

    #[test]
    fn verify_rejects_malformed_hash() {
        assert!(verify_password("plaintext", "plaintext").is_err());
    }

    #[test]
    fn token_taken_from_either_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers).unwrap(), None);

        headers.insert(TOKEN_HEADER, HeaderValue::from_static("abc"));
        assert_eq!(bearer_token(&headers).unwrap(), Some("abc"));

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(bearer_token(&headers).unwrap(), Some("xyz"));
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        for value in ["bearer xyz", "BEARER xyz", "BeArEr  xyz"] {
            let mut headers = HeaderMap::new();
            headers.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
            assert_eq!(bearer_token(&headers).unwrap(), Some("xyz"), "{value}");
        }

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearerxyz"));
        assert!(matches!(bearer_token(&headers), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn ambiguous_or_foreign_credentials_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(TOKEN_HEADER, HeaderValue::from_static("abc"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert!(matches!(bearer_token(&headers), Err(AppError::Unauthorized(_))));

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert!(matches!(bearer_token(&headers), Err(AppError::Unauthorized(_))));
    }
}
