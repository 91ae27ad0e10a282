mod api;
mod clients;
mod config;
mod error;
mod ffmpeg;
mod models;
mod pipeline;
mod store;
mod subtitles;
mod wav;

use crate::api::AppState;
use crate::clients::{HttpSeparatorClient, HttpTtsClient, Simplifier};
use crate::config::Config;
use crate::pipeline::{hls_publisher, Collaborators};
use crate::store::StoreGateway;
use axum::{
    http::{header, Method},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dub_streamer=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    let db = PgPoolOptions::new()
        .max_connections(50)
        .connect(&config.database_url)
        .await?;
    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations").run(&db).await?;
    tracing::info!("Database migrations completed");

    let objects = store::object_store::build(&config.object_store).await;
    let gateway = Arc::new(StoreGateway::new(db, objects));

    let tts_client: Arc<dyn clients::TtsClient> = Arc::new(HttpTtsClient::new(
        config.tts_endpoint.clone(),
        config.tts_api_key.clone().unwrap_or_default(),
    ));

    let separator_client: Option<Arc<dyn clients::SeparatorClient>> =
        config.separator_endpoint.clone().map(|endpoint| {
            Arc::new(HttpSeparatorClient::new(
                endpoint,
                config.separator_api_key.clone().unwrap_or_default(),
            )) as Arc<dyn clients::SeparatorClient>
        });

    let simplifier = match Simplifier::from_config(&config) {
        Ok(s) => Some(Arc::new(s)),
        Err(e) => {
            tracing::warn!("simplifier unavailable, over-speed sentences will not be retried: {e}");
            None
        }
    };

    let config = Arc::new(config);
    let upload_semaphore = hls_publisher::new_upload_semaphore(&config);

    let collaborators = Collaborators {
        gateway,
        tts_client,
        separator_client,
        simplifier,
        config: config.clone(),
        upload_semaphore,
    };

    let app_state = Arc::new(AppState { collaborators });

    let app = Router::new()
        .merge(api::root_routes().with_state(app_state.clone()))
        .nest("/api", api::tts_routes().merge(api::health_routes()).with_state(app_state.clone()))
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE]),
        );

    let addr = format!("{}:{}", config.server_host, config.server_port);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
