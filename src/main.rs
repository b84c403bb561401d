use anyhow::Result;
use axum::Router;
use dotenvy::dotenv;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use courseserver::cascade::configure_cascade_routes;
use courseserver::config::AppConfig;
use courseserver::duplicate::configure_duplicate_routes;
use courseserver::grading::configure_grading_routes;
use courseserver::hierarchy::configure_hierarchy_routes;
use courseserver::pedagogy::configure_pedagogy_routes;
use courseserver::shared::state::AppState;
use courseserver::shared::utils::create_conn;
use courseserver::storage::{ObjectStorage, PassthroughTranscoder, S3Storage};
use courseserver::structure::configure_structure_routes;
use courseserver::views::configure_view_routes;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("courseserver=info,tower_http=info")),
        )
        .init();

    let config = AppConfig::from_env();
    courseserver::shared::error::set_debug_errors(config.debug_errors);
    let conn = create_conn(&config.database_url())?;
    tracing::info!("database pool ready");

    let storage: Option<Arc<dyn ObjectStorage>> = match &config.storage {
        Some(cfg) => {
            let s3 = S3Storage::new(cfg).await;
            tracing::info!("object storage configured for bucket {}", cfg.bucket);
            Some(Arc::new(s3))
        }
        None => {
            tracing::warn!("DRIVE_SERVER not set, file uploads disabled");
            None
        }
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState {
        conn,
        config,
        storage,
        transcoder: Arc::new(PassthroughTranscoder),
    });

    let app = Router::new()
        .merge(configure_hierarchy_routes())
        .merge(configure_pedagogy_routes())
        .merge(configure_cascade_routes())
        .merge(configure_duplicate_routes())
        .merge(configure_grading_routes())
        .merge(configure_structure_routes())
        .merge(configure_view_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("courseserver listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
