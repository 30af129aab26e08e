//! Signed bearer tokens (compact JWS, EdDSA over Ed25519).
//!
//! Tokens carry `sub`, `iat` and `exp`. Verification accepts nothing but
//! `EdDSA` in the header so a token re-signed with `none` or an HMAC
//! algorithm is refused before any key material is consulted.
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::pkcs8::DecodePrivateKey;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::Clock;

const ALGORITHM: &str = "EdDSA";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

/// Claims carried by every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token must have three dot-separated parts")]
    InvalidFormat,
    #[error("token is not valid base64url")]
    InvalidBase64,
    #[error("token header or claims are not valid JSON")]
    InvalidJson,
    #[error("unsupported signing algorithm '{0}'")]
    UnsupportedAlgorithm(String),
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("failed to encode token: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct TokenService {
    signing: SigningKey,
    verifying: VerifyingKey,
    ttl: Duration,
    leeway: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(signing: SigningKey, ttl: Duration, leeway: Duration, clock: Arc<dyn Clock>) -> Self {
        let verifying = signing.verifying_key();
        Self {
            signing,
            verifying,
            ttl,
            leeway,
            clock,
        }
    }

    /// Load a PKCS#8 PEM encoded Ed25519 private key.
    pub fn load_signing_key(path: &Path) -> anyhow::Result<SigningKey> {
        let pem = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read token key {}", path.display()))?;
        SigningKey::from_pkcs8_pem(&pem)
            .map_err(|e| anyhow::anyhow!("invalid Ed25519 PKCS#8 key in {}: {e}", path.display()))
    }

    /// Fresh random key; tokens signed with it die with the process.
    pub fn generate_signing_key() -> SigningKey {
        SigningKey::generate(&mut OsRng)
    }

    /// Issue a token for `subject` valid for the configured TTL.
    pub fn issue(&self, subject: &str) -> Result<String, TokenError> {
        let iat = self.clock.now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: subject.to_string(),
            iat,
            exp: iat.saturating_add(ttl),
        };
        let header = Header {
            alg: ALGORITHM.into(),
            typ: Some("JWT".into()),
        };

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?),
        );
        let signature = self.signing.sign(signing_input.as_bytes());
        Ok(format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        ))
    }

    /// Check structure, algorithm, signature and expiry; return the claims.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(sig_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::InvalidFormat);
        };

        let header_bytes = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| TokenError::InvalidBase64)?;
        let header: Header =
            serde_json::from_slice(&header_bytes).map_err(|_| TokenError::InvalidJson)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }

        let sig_bytes = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| TokenError::InvalidBase64)?;
        let sig_bytes: [u8; 64] = sig_bytes
            .as_slice()
            .try_into()
            .map_err(|_| TokenError::InvalidSignature)?;
        let signature = Signature::from_bytes(&sig_bytes);

        let signing_input = &token[..header_b64.len() + 1 + claims_b64.len()];
        self.verifying
            .verify_strict(signing_input.as_bytes(), &signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let claims_bytes = URL_SAFE_NO_PAD
            .decode(claims_b64)
            .map_err(|_| TokenError::InvalidBase64)?;
        let claims: Claims =
            serde_json::from_slice(&claims_bytes).map_err(|_| TokenError::InvalidJson)?;

        let leeway = i64::try_from(self.leeway.as_secs()).unwrap_or(i64::MAX);
        if self.clock.now().timestamp() > claims.exp.saturating_add(leeway) {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{TimeZone, Utc};
    use ed25519_dalek::pkcs8::{EncodePrivateKey, spki::der::pem::LineEnding};

    fn service(clock: Arc<FixedClock>) -> TokenService {
        TokenService::new(
            TokenService::generate_signing_key(),
            Duration::from_secs(3600),
            Duration::from_secs(30),
            clock,
        )
    }

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()))
    }

    fn forge(header: &str, claims: &str, sig: &[u8]) -> String {
        format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(claims),
            URL_SAFE_NO_PAD.encode(sig)
        )
    }

    #[test]
    fn issued_token_verifies_with_one_hour_lifetime() {
        let clock = clock();
        let tokens = service(clock.clone());
        let token = tokens.issue("a@x.com").unwrap();
        assert_eq!(token.split('.').count(), 3);

        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.sub, "a@x.com");
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(claims.iat, clock.now().timestamp());
    }

    #[test]
    fn expired_token_is_rejected_after_leeway() {
        let clock = clock();
        let tokens = service(clock.clone());
        let token = tokens.issue("a@x.com").unwrap();

        clock.advance(chrono::Duration::seconds(3600 + 30));
        assert!(tokens.verify(&token).is_ok());

        clock.advance(chrono::Duration::seconds(1));
        assert!(matches!(tokens.verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn token_from_another_key_is_rejected() {
        let clock = clock();
        let ours = service(clock.clone());
        let theirs = service(clock);
        let token = theirs.issue("a@x.com").unwrap();
        assert!(matches!(ours.verify(&token), Err(TokenError::InvalidSignature)));
    }

    #[test]
    fn tampered_claims_are_rejected() {
        let tokens = service(clock());
        let token = tokens.issue("a@x.com").unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let claims = r#"{"sub":"b@x.com","iat":0,"exp":9999999999}"#;
        let forged = format!("{}.{}.{}", parts[0], URL_SAFE_NO_PAD.encode(claims), parts[2]);
        assert!(matches!(tokens.verify(&forged), Err(TokenError::InvalidSignature)));
    }

    #[test]
    fn other_algorithms_are_refused() {
        let tokens = service(clock());
        let claims = r#"{"sub":"a@x.com","iat":0,"exp":9999999999}"#;

        let none = forge(r#"{"alg":"none"}"#, claims, b"");
        assert!(matches!(
            tokens.verify(&none),
            Err(TokenError::UnsupportedAlgorithm(alg)) if alg == "none"
        ));

        let hmac = forge(r#"{"alg":"HS256","typ":"JWT"}"#, claims, &[0u8; 32]);
        assert!(matches!(
            tokens.verify(&hmac),
            Err(TokenError::UnsupportedAlgorithm(alg)) if alg == "HS256"
        ));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let tokens = service(clock());
        assert!(matches!(tokens.verify("abc.def"), Err(TokenError::InvalidFormat)));
        assert!(matches!(tokens.verify("a.b.c.d"), Err(TokenError::InvalidFormat)));
        assert!(matches!(tokens.verify("!!.??.**"), Err(TokenError::InvalidBase64)));
    }

    #[test]
    fn loads_pkcs8_pem_key_from_disk() {
        let key = TokenService::generate_signing_key();
        let pem = key.to_pkcs8_pem(LineEnding::LF).unwrap();
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), pem.as_bytes()).unwrap();

        let loaded = TokenService::load_signing_key(file.path()).unwrap();
        assert_eq!(loaded.verifying_key(), key.verifying_key());
    }

    #[test]
    fn rejects_garbage_key_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "not a key").unwrap();
        assert!(TokenService::load_signing_key(file.path()).is_err());
    }
}
