use crate::error::AppError;
use crate::middleware::guards::User;
use crate::services::SendMessageRequest;
use crate::state::AppState;
use actix_web::{delete, get, post, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    pub limit: Option<i64>,
    pub before: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub count: i64,
}

#[get("/api/v1/conversations/{id}/messages")]
pub async fn list_messages(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
    query: web::Query<ListMessagesQuery>,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner();
    let messages = state
        .messages
        .list(path.into_inner(), user.id, query.limit, query.before)
        .await?;
    Ok(HttpResponse::Ok().json(messages))
}

#[post("/api/v1/conversations/{id}/messages")]
pub async fn send_message(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let message = state
        .messages
        .send(path.into_inner(), user.id, body.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(message))
}

#[get("/api/v1/messages/unread-count")]
pub async fn unread_count(
    state: web::Data<AppState>,
    user: User,
) -> Result<HttpResponse, AppError> {
    let count = state.messages.unread_total(user.id).await?;
    Ok(HttpResponse::Ok().json(UnreadCountResponse { count }))
}

#[delete("/api/v1/messages/{id}")]
pub async fn delete_message(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    state
        .messages
        .soft_delete(path.into_inner(), user.id)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}
