use crate::error::AppError;
use crate::middleware::guards::User;
use crate::state::AppState;
use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    pub other_user_id: Uuid,
}

#[post("/api/v1/conversations")]
pub async fn create_conversation(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<CreateConversationRequest>,
) -> Result<HttpResponse, AppError> {
    let conversation = state
        .conversations
        .get_or_create(user.id, body.other_user_id)
        .await?;
    Ok(HttpResponse::Ok().json(conversation))
}

#[get("/api/v1/conversations")]
pub async fn list_conversations(
    state: web::Data<AppState>,
    user: User,
) -> Result<HttpResponse, AppError> {
    let conversations = state.conversations.list_for_user(user.id).await?;
    Ok(HttpResponse::Ok().json(conversations))
}

#[get("/api/v1/conversations/{id}")]
pub async fn get_conversation(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let conversation = state
        .conversations
        .get(path.into_inner(), user.id)
        .await?;
    Ok(HttpResponse::Ok().json(conversation))
}
