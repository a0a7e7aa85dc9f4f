//! Olaf server binary

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

use olaf::{
    addons,
    auth::JwtValidator,
    config::{Args, StoreBackend},
    db::{DocumentStore, MemoryStore, MongoStore},
    logging,
    modules::{self, Addon},
    server::{self, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    logging::init(&args.log_level, args.log_format);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Olaf");
    info!("  version {} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_COMMIT_SHORT"));
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("App URL: {}", args.app_url);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Store: {:?}", args.store);
    if args.store == StoreBackend::Mongo {
        info!("MongoDB: {} (database '{}')", args.mongodb_uri, args.mongodb_name);
    }
    info!(
        "Addons path: {}",
        args.addons_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none)".to_string())
    );
    info!("Token lifetime: {}s", args.jwt_expiration_time);
    info!("======================================");

    let store: Arc<dyn DocumentStore> = match args.store {
        StoreBackend::Memory => {
            warn!("Using the in-memory store, data is lost on exit");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Mongo => {
            match MongoStore::connect(&args.mongodb_uri, &args.mongodb_name, args.mongodb_timeout_ms)
                .await
            {
                Ok(store) => {
                    info!("MongoDB connected successfully");
                    Arc::new(store)
                }
                Err(e) if args.dev_mode => {
                    warn!("MongoDB connection failed (dev mode, falling back to memory): {}", e);
                    Arc::new(MemoryStore::new())
                }
                Err(e) => {
                    error!("MongoDB connection failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
    };

    let mut addons: Vec<Box<dyn Addon>> = addons::builtin()?;
    if let Some(path) = &args.addons_path {
        for addon in modules::discover_addons(path)? {
            addons.push(Box::new(addon));
        }
    }

    let root_password = args.root_password().map_err(anyhow::Error::msg)?;
    let registry = modules::bootstrap(store.clone(), addons, &root_password).await?;

    let secret = args.jwt_secret().map_err(anyhow::Error::msg)?;
    let jwt = if args.dev_mode {
        JwtValidator::new_dev(secret, args.jwt_expiration_time)?
    } else {
        JwtValidator::new(secret, args.jwt_expiration_time)?
    };

    let state = Arc::new(AppState::new(args, registry, store, jwt));
    server::run(state).await?;
    Ok(())
}
