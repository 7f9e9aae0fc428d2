use actix_web::{web, App, HttpServer};
use messaging_engine::{
    config, db, error,
    logging,
    middleware::{JwtVerifier, SharedVerifier},
    migrations, routes,
    services::audit::{AuditSink, PgAuditSink, TracingAuditSink},
    state::AppState,
    store::{ChatStore, MemoryStore, PgStore},
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = config::Config::from_env()?;

    let public_key = cfg.jwt_public_key_pem.as_deref().ok_or_else(|| {
        error::AppError::Config("JWT_PUBLIC_KEY_PEM or JWT_PUBLIC_KEY_FILE is required".into())
    })?;
    let verifier: SharedVerifier = Arc::new(JwtVerifier::from_rsa_pem(public_key)?);

    let (store, audit_sink): (Arc<dyn ChatStore>, Arc<dyn AuditSink>) = match &cfg.database_url {
        Some(url) => {
            let pool = db::init_pool(url, cfg.db_max_connections).await?;
            migrations::run(&pool).await?;
            (
                Arc::new(PgStore::new(pool.clone())),
                Arc::new(PgAuditSink::new(pool)),
            )
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-process store; data is lost on exit");
            (Arc::new(MemoryStore::new()), Arc::new(TracingAuditSink))
        }
    };

    let (state, audit_worker) = AppState::new(
        store,
        audit_sink,
        cfg.audit_queue_capacity,
        cfg.engine.clone(),
        cfg.ws.clone(),
    );

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting messaging-engine");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .app_data(web::Data::new(verifier.clone()))
            .configure(routes::configure_routes)
    })
    .bind(&bind_addr)
    .map_err(|e| error::AppError::StartServer(format!("bind: {e}")))?
    .run()
    .await
    .map_err(|e| error::AppError::StartServer(format!("server: {e}")))?;

    // Give queued audit records a moment to drain
    match tokio::time::timeout(std::time::Duration::from_secs(5), audit_worker).await {
        Ok(Err(e)) => tracing::warn!(error = %e, "audit worker ended abnormally"),
        Err(_) => tracing::warn!("audit queue not drained before shutdown"),
        Ok(Ok(())) => {}
    }
    Ok(())
}
