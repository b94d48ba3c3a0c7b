use crate::error::{AppError, AppResult, AuthFailure};
use actix_web::{http::header, web, HttpRequest};
use crypto_core::JwtValidator;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Verifies the bearer credential of a request before anything else runs
///
/// HTTP calls must send `Authorization: Bearer <jwt>`. WebSocket upgrades may
/// instead pass `?token=<jwt>` since browsers cannot set headers on them.
#[derive(Clone)]
pub struct HandshakeAuthenticator {
    validator: JwtValidator,
}

impl HandshakeAuthenticator {
    pub fn new(validator: JwtValidator) -> Self {
        Self { validator }
    }

    pub fn from_public_key_pem(pem: &str) -> AppResult<Self> {
        let validator = JwtValidator::from_rsa_pem(pem)
            .map_err(|e| AppError::Config(format!("JWT public key: {e}")))?;
        Ok(Self::new(validator))
    }

    /// Resolve a raw token to the user it was issued for
    pub fn verify_token(&self, token: &str) -> AppResult<Uuid> {
        self.validator.user_id(token).map_err(|e| {
            tracing::warn!(error = %e, "JWT validation failed");
            AppError::from(e)
        })
    }

    /// Authenticate a plain HTTP request from its `Authorization` header
    pub fn authenticate_request(&self, req: &HttpRequest) -> AppResult<Uuid> {
        let token = bearer_from_header(req)?
            .ok_or_else(|| AppError::Authentication(AuthFailure::MissingToken))?;
        self.verify_token(&token)
    }

    /// Authenticate a WebSocket upgrade from its header or `token` query
    pub fn authenticate_upgrade(&self, req: &HttpRequest) -> AppResult<Uuid> {
        let token = match bearer_from_header(req)? {
            Some(token) => token,
            None => web::Query::<TokenQuery>::from_query(req.query_string())
                .ok()
                .and_then(|q| q.into_inner().token)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| AppError::Authentication(AuthFailure::MissingToken))?,
        };
        self.verify_token(&token)
    }
}

/// `Ok(None)` when no header is present; an error when it is malformed
fn bearer_from_header(req: &HttpRequest) -> AppResult<Option<String>> {
    let Some(value) = req.headers().get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let value = value
        .to_str()
        .map_err(|_| AppError::Authentication(AuthFailure::MalformedHeader))?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or(AppError::Authentication(AuthFailure::MalformedHeader))?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(AppError::Authentication(AuthFailure::MalformedHeader));
    }

    Ok(Some(token.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use crypto_core::jwt::test_utils::{
        FOREIGN_PRIVATE_KEY_PEM, TEST_PRIVATE_KEY_PEM, TEST_PUBLIC_KEY_PEM,
    };
    use crypto_core::JwtIssuer;

    fn authenticator() -> HandshakeAuthenticator {
        HandshakeAuthenticator::from_public_key_pem(TEST_PUBLIC_KEY_PEM).unwrap()
    }

    fn token_for(user_id: Uuid) -> String {
        JwtIssuer::from_rsa_pem(TEST_PRIVATE_KEY_PEM)
            .unwrap()
            .access_token(user_id)
            .unwrap()
    }

    #[test]
    fn test_header_token_accepted() {
        let user_id = Uuid::new_v4();
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", token_for(user_id))))
            .to_http_request();

        assert_eq!(authenticator().authenticate_request(&req).unwrap(), user_id);
    }

    #[test]
    fn test_query_token_only_for_upgrade() {
        let user_id = Uuid::new_v4();
        let req = TestRequest::with_uri(&format!("/ws?token={}", token_for(user_id)))
            .to_http_request();

        assert_eq!(authenticator().authenticate_upgrade(&req).unwrap(), user_id);
        assert_eq!(
            authenticator().authenticate_request(&req),
            Err(AppError::Authentication(AuthFailure::MissingToken))
        );
    }

    #[test]
    fn test_missing_token_rejected() {
        let req = TestRequest::with_uri("/ws").to_http_request();
        assert_eq!(
            authenticator().authenticate_upgrade(&req),
            Err(AppError::Authentication(AuthFailure::MissingToken))
        );
    }

    #[test]
    fn test_wrong_scheme_rejected() {
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Basic dXNlcjpwYXNz"))
            .to_http_request();
        assert_eq!(
            authenticator().authenticate_request(&req),
            Err(AppError::Authentication(AuthFailure::MalformedHeader))
        );
    }

    #[test]
    fn test_forged_token_rejected() {
        let forged = JwtIssuer::from_rsa_pem(FOREIGN_PRIVATE_KEY_PEM)
            .unwrap()
            .access_token(Uuid::new_v4())
            .unwrap();
        assert!(matches!(
            authenticator().verify_token(&forged),
            Err(AppError::Authentication(AuthFailure::InvalidToken(_)))
        ));
    }

    #[test]
    fn test_bad_public_key_is_config_error() {
        assert!(matches!(
            HandshakeAuthenticator::from_public_key_pem("nope"),
            Err(AppError::Config(_))
        ));
    }
}
