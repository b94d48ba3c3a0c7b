//! Authentication guard extracted per request

use crate::error::AppError;
use crate::state::AppState;
use actix_web::{web, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use uuid::Uuid;

/// Authenticated caller, resolved from the bearer token
///
/// Taking `User` as a handler argument makes the route reject unauthenticated
/// requests with 401 before the handler body runs.
#[derive(Debug, Clone, Copy)]
pub struct User {
    pub id: Uuid,
}

impl FromRequest for User {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let result = match req.app_data::<web::Data<AppState>>() {
            Some(state) => state
                .authenticator
                .authenticate_request(req)
                .map(|id| User { id }),
            None => {
                tracing::error!("AppState missing from app data");
                Err(AppError::Internal)
            }
        };
        ready(result)
    }
}
