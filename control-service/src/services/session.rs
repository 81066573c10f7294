use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

use crate::config::SessionConfig;
use crate::models::Identity;

/// Claims carried by the session token the login collaborator mints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub exp: i64,
}

/// Validates session tokens and exposes the operator identity they carry.
#[derive(Clone)]
pub struct SessionService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    cookie_name: String,
    session_hours: i64,
}

impl SessionService {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            cookie_name: config.cookie_name.clone(),
            session_hours: config.session_hours,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Mint a session token for an authenticated operator. Used by the login
    /// collaborator and the local bootstrap path.
    pub fn issue(&self, subject: &str, email: &str, name: &str) -> Result<String, AppError> {
        let claims = SessionClaims {
            sub: subject.to_string(),
            email: email.to_string(),
            name: name.to_string(),
            exp: (Utc::now() + Duration::hours(self.session_hours)).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            AppError::InternalError(anyhow::anyhow!("Failed to encode session token: {e}"))
        })
    }

    /// Decode and verify a session token into the operator identity.
    pub fn validate(&self, token: &str) -> Result<Identity, AppError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map_err(|_| AppError::Forbidden(anyhow::anyhow!("Invalid or expired session token")))?;

        let claims = data.claims;
        let expiry = DateTime::<Utc>::from_timestamp(claims.exp, 0)
            .ok_or_else(|| AppError::Forbidden(anyhow::anyhow!("Invalid session expiry")))?;

        Ok(Identity {
            subject: claims.sub,
            email: claims.email,
            name: claims.name,
            expiry,
        })
    }
}
