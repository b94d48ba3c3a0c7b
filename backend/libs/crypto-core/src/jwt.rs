//! JWT validation for the chat signaling backend
//!
//! Tokens are minted by the identity service and verified here with RS256
//! (RSA with SHA-256). Symmetric algorithms are never accepted, which rules out
//! algorithm confusion attacks where a public key is reused as an HMAC secret.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use crypto_core::jwt::JwtValidator;
//!
//! let public_key = std::env::var("JWT_PUBLIC_KEY_PEM")?;
//! let validator = JwtValidator::from_rsa_pem(&public_key)?;
//! let user_id = validator.user_id(token)?;
//! ```
//!
//! Unlike a process-global key store, validators are plain values: the
//! service builds one at startup and hands it to whoever needs it, and tests
//! build their own from the fixture keys.
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, TokenData,
    Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Constants
// ============================================================================

const ACCESS_TOKEN_EXPIRY_HOURS: i64 = 1;

/// JWT algorithm - RS256 only
const JWT_ALGORITHM: Algorithm = Algorithm::RS256;

// ============================================================================
// Data Structures
// ============================================================================

/// JWT claims issued by the identity service
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Token type: "access" or "refresh"
    pub token_type: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JwtError {
    #[error("invalid key material: {0}")]
    Key(String),

    #[error("token expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("token is not an access token")]
    WrongTokenType,

    #[error("malformed subject: {0}")]
    Subject(String),

    #[error("token signing failed: {0}")]
    Signing(String),
}

// ============================================================================
// Validation
// ============================================================================

/// Verifies RS256 tokens against a single public key
#[derive(Clone)]
pub struct JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    /// Build a validator from an RSA public key in PEM format
    pub fn from_rsa_pem(public_key_pem: &str) -> Result<Self, JwtError> {
        let key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| JwtError::Key(format!("failed to parse RSA public key: {e}")))?;

        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.validate_exp = true;

        Ok(Self { key, validation })
    }

    /// Validate signature, structure and expiry
    pub fn validate(&self, token: &str) -> Result<TokenData<Claims>, JwtError> {
        decode::<Claims>(token, &self.key, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            _ => JwtError::Invalid(e.to_string()),
        })
    }

    /// Validate an access token and resolve its subject to a user id
    ///
    /// Refresh tokens are rejected: they are meant for the identity service's
    /// refresh endpoint only.
    pub fn user_id(&self, token: &str) -> Result<Uuid, JwtError> {
        let data = self.validate(token)?;
        if data.claims.token_type != "access" {
            return Err(JwtError::WrongTokenType);
        }
        Uuid::parse_str(&data.claims.sub).map_err(|e| JwtError::Subject(e.to_string()))
    }
}

// ============================================================================
// Issuing
// ============================================================================

/// Signs RS256 tokens; used by tooling and tests, never by the signaling service
#[derive(Clone)]
pub struct JwtIssuer {
    key: EncodingKey,
}

impl JwtIssuer {
    pub fn from_rsa_pem(private_key_pem: &str) -> Result<Self, JwtError> {
        let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| JwtError::Key(format!("failed to parse RSA private key: {e}")))?;
        Ok(Self { key })
    }

    /// Sign an arbitrary claim set
    pub fn sign(&self, claims: &Claims) -> Result<String, JwtError> {
        encode(&Header::new(JWT_ALGORITHM), claims, &self.key)
            .map_err(|e| JwtError::Signing(e.to_string()))
    }

    /// Generate a one-hour access token for `user_id`
    pub fn access_token(&self, user_id: Uuid) -> Result<String, JwtError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(ACCESS_TOKEN_EXPIRY_HOURS)).timestamp(),
            token_type: "access".to_string(),
            email: None,
            username: None,
        };
        self.sign(&claims)
    }
}

/// Fixed key pairs for tests in this and dependent crates
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    pub const TEST_PRIVATE_KEY_PEM: &str = include_str!("../tests/fixtures/test_private_key.pem");
    pub const TEST_PUBLIC_KEY_PEM: &str = include_str!("../tests/fixtures/test_public_key.pem");
    /// Signs valid-looking tokens that `TEST_PUBLIC_KEY_PEM` must reject
    pub const FOREIGN_PRIVATE_KEY_PEM: &str =
        include_str!("../tests/fixtures/foreign_private_key.pem");
}

// ============================================================================
// Tests
// ============================================================================
