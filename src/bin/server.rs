use log::{error, info, warn};
use tokio::io::BufReader;

use rusty_relay::config::ServerConfig;
use rusty_relay::constants::SHUTDOWN_NOTICE;
use rusty_relay::core::{build_runtime, notify_and_stop, RelayServer};

fn main() {
    // Initialize env
    let dotenv_result = dotenvy::dotenv();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match dotenv_result {
        Ok(path) => info!("Environment variables loaded from {}", path.display()),
        Err(e) => warn!("Failed to load .env file: {}", e),
    };

    // Load config from .env
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Configuration: host={}, port={}, max_clients={}, cooldown={:?}",
        config.host, config.port, config.max_clients, config.rate_limit_cooldown
    );

    let runtime = match build_runtime(&config) {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let stop_keyword = config.stop_keyword.clone();
    let result = runtime.block_on(async move {
        let server = RelayServer::bind(config).await?;

        // Ctrl-C behaves like the operator stop keyword
        let registry = server.registry();
        let signal = server.shutdown_signal();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, shutting down");
                if let Err(e) = notify_and_stop(&registry, &signal, SHUTDOWN_NOTICE) {
                    warn!("Shutdown notice could not be sent: {}", e);
                }
            }
        });

        println!("Server's main thread");
        println!("Type '{}' to close the server and exit the program", stop_keyword);

        server.run(BufReader::new(tokio::io::stdin())).await
    });

    // A pending stdin read would otherwise hold the runtime open
    runtime.shutdown_background();

    match result {
        Ok(outcomes) => info!("Server stopped after {} sessions finished", outcomes.len()),
        Err(e) => {
            error!("Server error: {}", e);
            std::process::exit(1);
        }
    }
}
