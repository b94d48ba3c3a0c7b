use actix_web::{web, App, HttpServer};
use chat_signaling_service::{
    config::{self, StoreBackend},
    db, error, logging, routes,
    state::AppState,
    storage::{
        ChatStore, InMemoryChatStore, InMemoryRelationshipDirectory, PgChatStore,
        PgRelationshipDirectory, RelationshipDirectory,
    },
    websocket::InMemoryConnectionRegistry,
};
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

#[actix_web::main]
async fn main() -> Result<(), error::AppError> {
    let cfg = Arc::new(config::Config::from_env()?);
    logging::init_tracing(cfg.log_format);

    let (store, directory): (Arc<dyn ChatStore>, Arc<dyn RelationshipDirectory>) =
        match cfg.store_backend {
            StoreBackend::Postgres => {
                let database_url = cfg
                    .database_url
                    .as_deref()
                    .ok_or_else(|| error::AppError::Config("DATABASE_URL missing".into()))?;
                let pool = db::init_pool(database_url)
                    .await
                    .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;
                (
                    Arc::new(PgChatStore::new(pool.clone())),
                    Arc::new(PgRelationshipDirectory::new(pool)),
                )
            }
            StoreBackend::Memory => {
                tracing::warn!("using in-memory store; data is lost on restart");
                (
                    Arc::new(InMemoryChatStore::new()),
                    Arc::new(InMemoryRelationshipDirectory::new()),
                )
            }
        };

    let state = AppState::new(
        cfg.clone(),
        store,
        directory,
        Arc::new(InMemoryConnectionRegistry::new()),
    )?;

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, backend = ?cfg.store_backend, "starting chat-signaling-service");

    HttpServer::new(move || {
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
    })
    .bind(&bind_addr)
    .map_err(|e| error::AppError::StartServer(format!("bind: {e}")))?
    .run()
    .await
    .map_err(|e| error::AppError::StartServer(format!("server: {e}")))
}
