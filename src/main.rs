use metrics_exporter_prometheus::PrometheusBuilder;
use racoder::{
    config::Config,
    logging,
    server::{self, ShutdownOutcome},
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Configuration errors are fatal and happen before logging is set up
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init_logging(config.log_level, &config.timezone) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    info!(
        "🚀 Starting Racoder v{} (log level {}, timezone {})",
        env!("CARGO_PKG_VERSION"),
        config.log_level,
        config.timezone
    );

    let metrics_handle = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics disabled: {}", e);
            None
        }
    };

    match server::start(config, metrics_handle).await {
        Ok(ShutdownOutcome::Drained) => info!("Server stopped"),
        Ok(ShutdownOutcome::TimedOut { remaining }) => {
            error!(
                "Drain deadline exceeded with {} session(s) still active, forcing exit",
                remaining
            );
            std::process::exit(1);
        }
        Err(e) => {
            error!("Server failed: {}", e);
            std::process::exit(1);
        }
    }
}
