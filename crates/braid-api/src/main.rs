use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use braid_api::{
    account::AccountServiceClient,
    config::Config,
    middleware::logging,
    routes::{branch, health, modify, prompt, threads},
    state::AppState,
};
use braid_llm::{CompletionClient, OpenRouterClient};
use braid_persist::PersistClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let config = Config::load()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    init_logging(&config);

    tracing::info!("Starting Braid API server");
    tracing::info!("Config loaded: {}:{}", config.server.host, config.server.port);

    tracing::info!("Initializing completion client");
    let completions: Arc<dyn CompletionClient> = Arc::new(
        OpenRouterClient::new(
            config.openrouter_api_key.clone(),
            config.upstream.referer.clone(),
            config.upstream.title.clone(),
        )?
        .with_base_url(config.upstream.base_url.clone()),
    );

    let account = Arc::new(AccountServiceClient::new(config.account.base_url.clone())?);

    tracing::info!("Connecting to MongoDB");
    let persist = PersistClient::new(&config.mongodb_uri, &config.mongodb.database).await?;
    tracing::info!("MongoDB connected");

    let state = Arc::new(AppState::new(
        config.clone(),
        persist,
        completions,
        account.clone(),
        account,
    ));

    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health
        .route("/health", get(health::health_check))
        // Relay pipeline
        .route("/prompt", post(prompt::prompt))
        .route("/branch", post(branch::branch))
        .route("/modify", post(modify::modify))
        // Threads
        .route("/threads", get(threads::list_threads))
        .route("/threads/:thread_id/messages", get(threads::list_messages));

    Router::new()
        .merge(api_routes)
        .layer(middleware::from_fn(logging::log_request))
        .layer(TimeoutLayer::new(std::time::Duration::from_secs(30)))
        .layer(CompressionLayer::new())
        .layer(build_cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    if config.cors.enabled {
        let mut cors = CorsLayer::new()
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers(Any);

        if config.cors.origins.iter().any(|o| o == "*") {
            cors = cors.allow_origin(Any);
        } else {
            for origin in &config.cors.origins {
                if let Ok(parsed_origin) = origin.parse::<axum::http::HeaderValue>() {
                    cors = cors.allow_origin(parsed_origin);
                }
            }
        }

        cors
    } else {
        CorsLayer::permissive()
    }
}

fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.logging.format.as_str() {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }
}
