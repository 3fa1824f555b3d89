use clinicdesk::{db, router, AppState, Config};
use dotenvy::dotenv;
use envconfig::Envconfig;
use tokio::net::TcpListener;

type Error = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize the logger with "info" unless RUST_LOG says otherwise
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    log::info!("Starting the clinic service...");

    // Load environment variables from a .env file if present
    dotenv().ok();

    let config = Config::init_from_env()?;

    // Open (or create) the SQLite database and apply migrations
    let pool = db::init_db(&config.database_url).await?;

    let state = AppState::new(pool.clone(), &config);
    let app = router::build(state);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    log::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    log::info!("Shutting down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl+C: {}", e);
    }
}
