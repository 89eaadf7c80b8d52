use std::sync::Arc;

use appointment_server::{
    appointments::service::AppointmentService,
    config::Config,
    db::{self, PgStore},
    models::AppState,
    routes,
};

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use axum::http::header;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;
    let pool = db::connect_pg(&cfg.database_url, cfg.db_max_connections).await?;
    let store = Arc::new(PgStore::new(pool));

    if cfg.enforce_slot_on_create {
        tracing::info!("slot rule enforced on create");
    }

    let state = AppState {
        appointments: AppointmentService::new(store.clone(), cfg.enforce_slot_on_create),
        sessions: store,
        session_ttl_hours: cfg.session_ttl_hours,
    };

    // Browser clients call the API cross-origin; answer OPTIONS preflight.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on http://{}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
