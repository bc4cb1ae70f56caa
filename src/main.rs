use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use std::time::Duration;

use paybridge::config::Config;
use paybridge::db::{create_pool, init_db, queries, AppState};
use paybridge::gateway::GatewayClient;
use paybridge::handlers;
use paybridge::models::CreateProject;
use paybridge::reconcile::reconcile_transaction;
use paybridge::webhook::WebhookDispatcher;

#[derive(Parser, Debug)]
#[command(name = "paybridge")]
#[command(about = "Payment gateway broker for merchants")]
struct Cli {
    /// Seed the database with dev data (project + API key)
    #[arg(long)]
    seed: bool,

    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

/// Seeds the database with dev data for testing.
/// Creates a project with an API key. Only runs when the database is empty.
fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))
        .expect("Failed to count projects");
    if count > 0 {
        tracing::info!("Database already has data, skipping seed");
        return;
    }

    let project = queries::create_project(
        &conn,
        &CreateProject {
            name: "Dev Project".to_string(),
            app_slug: "dev-project".to_string(),
            webhook_url: Some("http://localhost:4020/webhook".to_string()),
            webhook_secret: None,
        },
    )
    .expect("Failed to create dev project");

    let (_, api_key) =
        queries::create_api_key(&conn, &project.id).expect("Failed to create dev API key");

    tracing::info!("============================================");
    tracing::info!("DEV DATA SEEDED");
    tracing::info!("Project: {} (id: {})", project.name, project.id);
    tracing::info!("API Key: {}", api_key);
    tracing::info!("============================================");
    tracing::info!("SAVE THIS API KEY - IT WILL NOT BE SHOWN AGAIN");
    tracing::info!("============================================");

    // Copy-paste friendly output (no log formatting)
    println!();
    println!("--- COPY FROM HERE ---");
    println!("  project_id: {}", project.id);
    println!("  api_key: {}", api_key);
    println!("--- END COPY ---");
    println!();
}

/// Spawns a background task that periodically reconciles stale pending
/// transactions, catching payments whose gateway callback never arrived.
fn spawn_reconcile_poller(state: AppState, interval_secs: u64) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(interval_secs.max(30));

        loop {
            tokio::time::sleep(interval).await;

            let stale_before = chrono::Utc::now().timestamp() - interval.as_secs() as i64;
            let ids = match state.db.get() {
                Ok(conn) => {
                    match queries::list_stale_pending_transaction_ids(&conn, stale_before, 50) {
                        Ok(ids) => ids,
                        Err(e) => {
                            tracing::warn!("Failed to list stale pending transactions: {}", e);
                            continue;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to get db connection for poller: {}", e);
                    continue;
                }
            };

            if ids.is_empty() {
                continue;
            }
            tracing::debug!("Poller reconciling {} stale pending transactions", ids.len());

            for id in ids {
                if let Err(e) = reconcile_transaction(&state, &id).await {
                    tracing::warn!("Poller reconciliation failed for {}: {}", id, e);
                }
            }
        }
    });

    tracing::info!(
        "Background reconcile poller started (runs every {} seconds)",
        interval_secs.max(30)
    );
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paybridge=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }
    if !config.gateway.is_configured() {
        tracing::warn!(
            "Gateway credentials are not configured; transaction creation will fail"
        );
    }

    // Create database connection pool and initialize schema
    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let state = AppState {
        db: db_pool,
        base_url: config.base_url.clone(),
        gateway: GatewayClient::new(config.gateway.clone()),
        webhooks: WebhookDispatcher::new(),
        platform_fee: config.platform_fee,
    };

    // Seed dev data if --seed flag is passed (only in dev mode)
    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set PAYBRIDGE_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    // Start background poller for stale pending transactions
    spawn_reconcile_poller(state.clone(), config.poller_interval_secs);

    // Build the application router
    let app = Router::new()
        .merge(handlers::health_router())
        // Merchant API (bearer key auth, per-tenant rate limits)
        .merge(handlers::merchant::router(state.clone()))
        // Gateway callback (shared-secret token auth, per-IP rate limit)
        .merge(handlers::internal::router(config.callback_rate_limit_rpm))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start the server
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    // Track if we should clean up on exit
    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();

    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: database will be deleted on exit");
    }

    tracing::info!("PayBridge server listening on {}", addr);

    // Run server with graceful shutdown
    // Use into_make_service_with_connect_info to enable IP-based rate limiting
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    // Cleanup on exit if ephemeral mode
    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral database...");
        if let Err(e) = std::fs::remove_file(&db_path) {
            tracing::warn!("Failed to remove {}: {}", db_path, e);
        } else {
            tracing::info!("Removed {}", db_path);
        }
        // Also remove WAL and SHM files if they exist
        let _ = std::fs::remove_file(format!("{}-wal", db_path));
        let _ = std::fs::remove_file(format!("{}-shm", db_path));
        tracing::info!("Ephemeral cleanup complete");
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
