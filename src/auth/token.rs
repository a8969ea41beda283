//! Token issuance and verification for the three credential kinds.
//!
//! Wire format is `b64url(claims_json).b64url(hmac_sha256)`. Each kind is
//! signed under its own key and carries its kind tag inside the signed
//! claims, so a token minted for one purpose fails verification as any other
//! kind twice over: wrong key, then wrong tag.
//!
//! Verification is pure computation; `now` is always passed in explicitly.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

use super::config::{AuthConfig, TokenKeys};
use super::store::Role;

type HmacSha256 = Hmac<Sha256>;

/// The three token purposes, with pairwise-distinct signing contexts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Proof that a password check passed; valid only to submit a one-time
    /// code. Grants no resource access.
    PreAuth,
    /// The capability for authenticated requests. Short-lived by design; no
    /// revocation list.
    Session,
    /// Long-lived device-bypass credential. Only effective together with a
    /// live trusted-device row.
    Remember,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub kind: TokenKind,
    pub sub: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<Uuid>,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("invalid signing key")]
    Key,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token kind mismatch")]
    KindMismatch,
    #[error("token expired")]
    Expired,
    #[error("missing required claim")]
    MissingClaim,
}

/// Issues and verifies all three token kinds.
#[derive(Clone, Debug)]
pub struct TokenSigner {
    keys: TokenKeys,
    pre_auth_ttl_seconds: i64,
    session_ttl_seconds: i64,
    remember_ttl_seconds: i64,
}

impl TokenSigner {
    #[must_use]
    pub fn new(keys: TokenKeys, config: &AuthConfig) -> Self {
        Self {
            keys,
            pre_auth_ttl_seconds: config.pre_auth_ttl_seconds(),
            session_ttl_seconds: config.session_ttl_seconds(),
            remember_ttl_seconds: config.remember_ttl_seconds(),
        }
    }

    fn key_for(&self, kind: TokenKind) -> &[u8] {
        match kind {
            TokenKind::PreAuth => self.keys.pre_auth(),
            TokenKind::Session => self.keys.session(),
            TokenKind::Remember => self.keys.remember(),
        }
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        let payload = serde_json::to_vec(claims)?;
        let payload_b64 = URL_SAFE_NO_PAD.encode(&payload);
        let mut mac = HmacSha256::new_from_slice(self.key_for(claims.kind))
            .map_err(|_| TokenError::Key)?;
        mac.update(payload_b64.as_bytes());
        let signature_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{payload_b64}.{signature_b64}"))
    }

    /// Mint a pre-auth token after a successful password check.
    pub fn issue_pre_auth(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        self.sign(&Claims {
            kind: TokenKind::PreAuth,
            sub: account_id,
            role: None,
            device: None,
            iat: now.timestamp(),
            exp: now.timestamp() + self.pre_auth_ttl_seconds,
        })
    }

    /// Mint the session capability carrying the account's role.
    pub fn issue_session(
        &self,
        account_id: Uuid,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        self.sign(&Claims {
            kind: TokenKind::Session,
            sub: account_id,
            role: Some(role),
            device: None,
            iat: now.timestamp(),
            exp: now.timestamp() + self.session_ttl_seconds,
        })
    }

    /// Mint a remember-device token bound to a registered device row.
    pub fn issue_remember(
        &self,
        account_id: Uuid,
        device_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        self.sign(&Claims {
            kind: TokenKind::Remember,
            sub: account_id,
            role: None,
            device: Some(device_id),
            iat: now.timestamp(),
            exp: now.timestamp() + self.remember_ttl_seconds,
        })
    }

    /// Verify a token against the expected kind's signing context.
    ///
    /// Rejects on bad signature, kind mismatch, or elapsed expiry, in that
    /// order; signature is always checked before any claim is trusted.
    pub fn verify(
        &self,
        token: &str,
        expected: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<Claims, TokenError> {
        let (payload_b64, signature_b64) =
            token.split_once('.').ok_or(TokenError::TokenFormat)?;
        if payload_b64.is_empty() || signature_b64.is_empty() || signature_b64.contains('.') {
            return Err(TokenError::TokenFormat);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::Base64)?;
        let mut mac =
            HmacSha256::new_from_slice(self.key_for(expected)).map_err(|_| TokenError::Key)?;
        mac.update(payload_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| TokenError::Base64)?;
        let claims: Claims = serde_json::from_slice(&payload)?;

        if claims.kind != expected {
            return Err(TokenError::KindMismatch);
        }
        if claims.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }
        match expected {
            TokenKind::Session if claims.role.is_none() => Err(TokenError::MissingClaim),
            TokenKind::Remember if claims.device.is_none() => Err(TokenError::MissingClaim),
            _ => Ok(claims),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{TokenError, TokenKind, TokenSigner};
    use crate::auth::config::{AuthConfig, Environment, TokenKeys};
    use crate::auth::store::Role;
    use chrono::{Duration, Utc};
    use secrecy::SecretString;
    use uuid::Uuid;

    fn signer() -> TokenSigner {
        let keys = TokenKeys::new(
            SecretString::from("pre-auth-key-for-tests".to_string()),
            SecretString::from("session-key-for-tests".to_string()),
            SecretString::from("remember-key-for-tests".to_string()),
        );
        let config = AuthConfig::new(Environment::Production, "https://presenza.dev".to_string());
        TokenSigner::new(keys, &config)
    }

    #[test]
    fn pre_auth_round_trip() {
        let signer = signer();
        let now = Utc::now();
        let id = Uuid::new_v4();
        let token = signer.issue_pre_auth(id, now).expect("issue");
        let claims = signer.verify(&token, TokenKind::PreAuth, now).expect("verify");
        assert_eq!(claims.sub, id);
        assert_eq!(claims.kind, TokenKind::PreAuth);
        assert_eq!(claims.exp - claims.iat, 300);
    }

    #[test]
    fn session_carries_role() {
        let signer = signer();
        let now = Utc::now();
        let token = signer
            .issue_session(Uuid::new_v4(), Role::Administrator, now)
            .expect("issue");
        let claims = signer.verify(&token, TokenKind::Session, now).expect("verify");
        assert_eq!(claims.role, Some(Role::Administrator));
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn remember_carries_device() {
        let signer = signer();
        let now = Utc::now();
        let device = Uuid::new_v4();
        let token = signer
            .issue_remember(Uuid::new_v4(), device, now)
            .expect("issue");
        let claims = signer.verify(&token, TokenKind::Remember, now).expect("verify");
        assert_eq!(claims.device, Some(device));
        assert_eq!(claims.exp - claims.iat, 30 * 24 * 3600);
    }

    #[test]
    fn cross_kind_replay_is_rejected() {
        let signer = signer();
        let now = Utc::now();
        let pre_auth = signer.issue_pre_auth(Uuid::new_v4(), now).expect("issue");

        // A pre-auth token presented where a session is expected fails on the
        // signature itself: the kinds do not share a key.
        let err = signer
            .verify(&pre_auth, TokenKind::Session, now)
            .expect_err("must fail");
        assert!(matches!(err, TokenError::InvalidSignature));

        let err = signer
            .verify(&pre_auth, TokenKind::Remember, now)
            .expect_err("must fail");
        assert!(matches!(err, TokenError::InvalidSignature));
    }

    #[test]
    fn kind_tag_checked_even_with_shared_key() {
        // Same key for every kind: the signed kind tag alone must still stop
        // cross-kind replay.
        let keys = TokenKeys::new(
            SecretString::from("shared".to_string()),
            SecretString::from("shared".to_string()),
            SecretString::from("shared".to_string()),
        );
        let config = AuthConfig::new(Environment::Production, "https://presenza.dev".to_string());
        let signer = TokenSigner::new(keys, &config);

        let now = Utc::now();
        let pre_auth = signer.issue_pre_auth(Uuid::new_v4(), now).expect("issue");
        let err = signer
            .verify(&pre_auth, TokenKind::Session, now)
            .expect_err("must fail");
        assert!(matches!(err, TokenError::KindMismatch));
    }

    #[test]
    fn expiry_is_enforced() {
        let signer = signer();
        let now = Utc::now();
        let token = signer.issue_pre_auth(Uuid::new_v4(), now).expect("issue");

        let just_before = now + Duration::seconds(299);
        assert!(signer.verify(&token, TokenKind::PreAuth, just_before).is_ok());

        let just_after = now + Duration::seconds(301);
        let err = signer
            .verify(&token, TokenKind::PreAuth, just_after)
            .expect_err("must fail");
        assert!(matches!(err, TokenError::Expired));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let signer = signer();
        let now = Utc::now();
        let token = signer.issue_pre_auth(Uuid::new_v4(), now).expect("issue");
        let (payload, signature) = token.split_once('.').expect("format");
        let mut flipped = payload.to_string();
        flipped.replace_range(0..1, if payload.starts_with('A') { "B" } else { "A" });

        let err = signer
            .verify(&format!("{flipped}.{signature}"), TokenKind::PreAuth, now)
            .expect_err("must fail");
        assert!(matches!(err, TokenError::InvalidSignature));
    }

    #[test]
    fn malformed_shapes_are_rejected() {
        let signer = signer();
        let now = Utc::now();
        for garbage in ["", "no-dot", ".", "a.", ".b", "a.b.c", "!*.@#"] {
            assert!(signer.verify(garbage, TokenKind::Session, now).is_err());
        }
    }
}
