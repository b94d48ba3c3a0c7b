pub mod conversations;
pub mod messages;
pub mod wsroute;

use crate::error::AppError;
use crate::metrics::metrics_handler;
use actix_web::{web, HttpResponse};

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

/// Register every route plus the JSON/query error mapping
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .limit(64 * 1024)
            .error_handler(|err, _req| AppError::Validation(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| AppError::Validation(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _req| AppError::Validation(err.to_string()).into()),
    )
    .service(conversations::create_conversation)
    .service(conversations::list_conversations)
    .service(conversations::get_conversation)
    .service(messages::list_messages)
    .service(messages::send_message)
    .service(messages::unread_count)
    .service(messages::delete_message)
    .service(wsroute::ws_handler)
    .route("/health", web::get().to(health))
    .route("/metrics", web::get().to(metrics_handler));
}
