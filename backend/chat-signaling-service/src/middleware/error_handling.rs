use crate::error::{AppError, AuthFailure, Denial, Entity};
use actix_web::{http::StatusCode, HttpResponse};
use error_types::{error_codes, ErrorResponse};

/// Map domain errors to the shared error body
pub fn map_error(err: &AppError) -> (StatusCode, ErrorResponse) {
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let (error_type, code) = match err {
        AppError::Validation(_) => ("validation_error", error_codes::INVALID_REQUEST),
        AppError::Authentication(AuthFailure::MissingToken) => {
            ("authentication_error", error_codes::TOKEN_MISSING)
        }
        AppError::Authentication(AuthFailure::MalformedHeader | AuthFailure::InvalidToken(_)) => {
            ("authentication_error", error_codes::TOKEN_INVALID)
        }
        AppError::Authorization(Denial::NotParticipant) => {
            ("authorization_error", error_codes::NOT_PARTICIPANT)
        }
        AppError::Authorization(Denial::MessagingNotAllowed) => {
            ("authorization_error", error_codes::MESSAGING_NOT_ALLOWED)
        }
        AppError::Authorization(Denial::NotSender) => {
            ("authorization_error", error_codes::AUTHORIZATION_ERROR)
        }
        AppError::NotFound(Entity::Message) => ("not_found_error", error_codes::MESSAGE_NOT_FOUND),
        AppError::NotFound(Entity::Conversation) => {
            ("not_found_error", error_codes::CONVERSATION_NOT_FOUND)
        }
        AppError::Database(_) => ("server_error", error_codes::DATABASE_ERROR),
        AppError::Config(_) | AppError::StartServer(_) | AppError::Internal => {
            ("server_error", error_codes::INTERNAL_SERVER_ERROR)
        }
    };

    // Store failures keep their detail in the logs, not in the response body
    let message = match err {
        AppError::Database(_) => "database error".to_string(),
        other => other.to_string(),
    };

    let response = ErrorResponse::new(
        status.canonical_reason().unwrap_or("Error"),
        &message,
        status.as_u16(),
        error_type,
        code,
    );

    (status, response)
}

pub fn into_response(err: &AppError) -> HttpResponse {
    if let AppError::Database(detail) = err {
        tracing::error!(error = %detail, "request failed on store access");
    }
    let (status, response) = map_error(err);
    HttpResponse::build(status).json(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_participant_maps_to_forbidden() {
        let (status, body) = map_error(&AppError::Authorization(Denial::NotParticipant));
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.error, "Forbidden");
        assert_eq!(body.error_type, "authorization_error");
        assert_eq!(body.code, error_codes::NOT_PARTICIPANT);

        let (_, body) = map_error(&AppError::Authorization(Denial::MessagingNotAllowed));
        assert_eq!(body.code, error_codes::MESSAGING_NOT_ALLOWED);

        let (_, body) = map_error(&AppError::Authorization(Denial::NotSender));
        assert_eq!(body.code, error_codes::AUTHORIZATION_ERROR);
    }

    #[test]
    fn test_missing_token_code() {
        let (status, body) = map_error(&AppError::Authentication(AuthFailure::MissingToken));
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.code, error_codes::TOKEN_MISSING);

        for failure in [
            AuthFailure::MalformedHeader,
            AuthFailure::InvalidToken("token expired".into()),
        ] {
            let (_, body) = map_error(&AppError::Authentication(failure));
            assert_eq!(body.code, error_codes::TOKEN_INVALID);
        }
    }

    #[test]
    fn test_message_not_found_code() {
        let (status, body) = map_error(&AppError::NotFound(Entity::Message));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.code, error_codes::MESSAGE_NOT_FOUND);

        let (_, body) = map_error(&AppError::NotFound(Entity::Conversation));
        assert_eq!(body.code, error_codes::CONVERSATION_NOT_FOUND);
    }

    #[test]
    fn test_database_detail_not_leaked() {
        let (status, body) = map_error(&AppError::Database("relation \"x\" does not exist".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.message, "database error");
        assert_eq!(body.code, error_codes::DATABASE_ERROR);
    }
}
