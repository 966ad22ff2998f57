use std::sync::Arc;

use dashgate::config::{load_config, print_schema};
use dashgate::startup::run;
use dashgate::utils::logger::init_logging;
use tracing::error;

#[tokio::main]
async fn main() {
    if std::env::args().any(|arg| arg == "--schema") {
        print_schema();
        return;
    }

    let config = load_config();

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Could not initialise logging: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(Arc::new(config)).await {
        error!(
            event_name = "startup.failed",
            event_domain = "startup",
            error = %e,
            "Server stopped"
        );
        std::process::exit(1);
    }
}
