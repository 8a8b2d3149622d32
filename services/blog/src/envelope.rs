//! Signed envelopes for access secrets and password-reset requests
//!
//! Both envelopes are compact JWTs signed with the server's symmetric key
//! (HS256). An access envelope carries `{token}`, the opaque access secret
//! that is looked up in the token store. A reset envelope carries
//! `{reset_email, exp}`. Any decode, algorithm, signature or claim failure
//! is reported as [`AuthError::Unauthenticated`] without saying which.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use crate::error::AuthError;

const ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Serialize, Deserialize)]
struct AccessClaims {
    token: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ResetClaims {
    reset_email: String,
    exp: i64,
}

/// Seals and opens signed envelopes
#[derive(Clone)]
pub struct EnvelopeCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_validation: Validation,
    reset_validation: Validation,
}

impl EnvelopeCodec {
    /// Build a codec around the server-held signing secret
    pub fn new(secret: &str) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::Internal("Signing secret is empty".to_string()));
        }

        // Access envelopes carry no expiry; the token row holds it.
        let mut access_validation = Validation::new(ALGORITHM);
        access_validation.required_spec_claims = HashSet::new();
        access_validation.validate_exp = false;

        // Reset expiry is checked against the caller's clock.
        let mut reset_validation = Validation::new(ALGORITHM);
        reset_validation.required_spec_claims = HashSet::from(["exp".to_string()]);
        reset_validation.validate_exp = false;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_validation,
            reset_validation,
        })
    }

    /// Wrap an access secret in a signed envelope
    pub fn seal_access(&self, secret: &str) -> Result<String, AuthError> {
        let claims = AccessClaims {
            token: secret.to_string(),
        };
        encode(&Header::new(ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Failed to sign access envelope: {}", e)))
    }

    /// Verify an access envelope and return the embedded secret
    pub fn open_access(&self, envelope: &str) -> Result<String, AuthError> {
        let data = decode::<AccessClaims>(envelope, &self.decoding_key, &self.access_validation)
            .map_err(|e| {
                debug!("Rejected access envelope: {}", e);
                AuthError::Unauthenticated
            })?;

        if data.claims.token.is_empty() {
            return Err(AuthError::Unauthenticated);
        }
        Ok(data.claims.token)
    }

    /// Build a password-reset envelope for `email` valid until `expires_at`
    pub fn seal_reset(&self, email: &str, expires_at: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = ResetClaims {
            reset_email: email.to_string(),
            exp: expires_at.timestamp(),
        };
        encode(&Header::new(ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Failed to sign reset envelope: {}", e)))
    }

    /// Verify a reset envelope at `now` and return the email it was issued for
    pub fn open_reset(&self, envelope: &str, now: DateTime<Utc>) -> Result<String, AuthError> {
        let data = decode::<ResetClaims>(envelope, &self.decoding_key, &self.reset_validation)
            .map_err(|e| {
                debug!("Rejected reset envelope: {}", e);
                AuthError::Unauthenticated
            })?;

        if data.claims.exp <= now.timestamp() {
            return Err(AuthError::Expired);
        }
        Ok(data.claims.reset_email)
    }
}
