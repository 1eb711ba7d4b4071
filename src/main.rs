use tracing::{error, info, warn};

use chunkdrive::{Config, Database, Drive};

const CONFIG_PATH: &str = "chunkdrive.toml";

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load_with_env(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {CONFIG_PATH}: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = chunkdrive::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        if let Err(e) = chunkdrive::logging::init_console_only(&config.logging.level) {
            eprintln!("Failed to initialize console logging: {e}");
        }
    }

    info!("chunkdrive {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    let db = match Database::open(&config.database.path).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };
    match db.schema_version().await {
        Ok(version) => info!("Database ready (schema version {})", version),
        Err(e) => warn!("Could not read schema version: {}", e),
    }

    let drive = match Drive::connect(db, &config) {
        Ok(drive) => drive,
        Err(e) => {
            error!("Failed to set up transport: {}", e);
            std::process::exit(1);
        }
    };

    if config.transport.has_credentials() {
        info!(
            "Transport configured for channel {} via {}",
            config.transport.channel_id, config.transport.api_base
        );
    } else {
        warn!("Transport credentials missing; uploads will fail until a bot token and channel id are set");
    }
    if config.auth.jwt_secret.is_empty() {
        warn!("auth.jwt_secret is not set; bearer tokens cannot be verified");
    }

    info!(
        "Chunk size {} bytes, bulk delete batches of {}",
        config.transport.chunk_size_bytes, config.bulk_delete.batch_size
    );
    drive.database().pool().close().await;
}
