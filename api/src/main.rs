use api::auth::ApiKeyValidator;
use api::probe::spawn_ping_scheduler;
use api::routes::routes;
use api::state::AppState;
use api::ws::router::EventRouter;
use api::ws::ws_routes;
use axum::Router;
use db::store::{SeaOrmStore, Store};
use migration::Migrator;
use sea_orm_migration::MigratorTrait;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_appender::rolling;
use util::{config, ws::Broadcaster};

#[tokio::main]
async fn main() {
    // Load configuration and initialize logging
    let _log_guard = init_logging(&config::log_file());

    // Database and schema
    let db = db::connect().await;
    Migrator::up(&db, None).await.expect("Migrations failed");

    // Set up dependencies; the event router is constructed exactly once
    let ws = Broadcaster::new();
    let store: Arc<dyn Store> = Arc::new(SeaOrmStore::new(db));
    let validator = Arc::new(ApiKeyValidator::new(Arc::clone(&store)));
    let router = Arc::new(EventRouter::new(
        ws.clone(),
        Arc::clone(&store),
        validator,
        config::heartbeat_interval_seconds(),
    ));
    let app_state = AppState::new(ws.clone(), store.clone(), router);

    // Spawn the periodic ping reconciliation sweep
    spawn_ping_scheduler(store, ws);

    // Build app router
    let cors = CorsLayer::very_permissive();
    let app = Router::new()
        .nest("/api", routes())
        .nest("/ws", ws_routes())
        .layer(cors)
        .with_state(app_state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config::host(), config::port())
        .parse()
        .expect("Invalid address");

    println!(
        "Starting {} on http://{}:{}",
        config::project_name(),
        config::host(),
        config::port()
    );

    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server crashed");
}

fn init_logging(log_file: &str) -> tracing_appender::non_blocking::WorkerGuard {
    use std::fs;
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    fs::create_dir_all("logs").ok();

    let file_appender = rolling::daily("logs", log_file);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true);

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_target(true)
        .with_thread_ids(true);

    let env_filter =
        EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("api=info"));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    if config::log_to_stdout() {
        registry.with(stdout_layer).init();
    } else {
        registry.init();
    }

    guard
}
