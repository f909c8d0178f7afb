use pulse::config::PulseConfig;
use pulse::server;
use pulse::shutdown::ShutdownSignal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // 1. Initialize Logging (after .env so RUST_LOG can live there)
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 2. Load Configuration
    let config = match PulseConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    // 3. Install signal handlers
    let shutdown = ShutdownSignal::new();
    shutdown.listen_for_os_signals();

    // 4. Serve until shutdown
    info!(version = env!("CARGO_PKG_VERSION"), "Starting Pulse");
    if let Err(e) = server::run(config, shutdown).await {
        error!(error = %e, "Server exited with error");
        std::process::exit(1);
    }
}
