//! cfp-web - Call for Papers service
//!
//! Serves the JSON API by default; `create-superuser` bootstraps the first
//! administrator account.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cfp_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};
use cfp_common::db::settings;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

use cfp_web::mailer::LogMailer;
use cfp_web::AppState;

/// Command-line arguments for cfp-web
#[derive(Parser, Debug)]
#[command(name = "cfp-web")]
#[command(about = "Conference Call for Papers service")]
#[command(version)]
struct Cli {
    /// Root folder holding the database, uploads and cfp.toml
    #[arg(short, long, global = true)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Port to listen on, overriding cfp.toml
        #[arg(short, long, env = "CFP_PORT")]
        port: Option<u16>,
    },
    /// Create an active superuser account
    CreateSuperuser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "CFP_SUPERUSER_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG wins; otherwise the level from cfp.toml is applied once loaded
    let env_filter = EnvFilter::try_from_default_env().ok();
    let from_env = env_filter.is_some();
    let (filter, filter_handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| EnvFilter::new("info")));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting cfp-web v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let cli = Cli::parse();

    // Step 1: Resolve root folder
    let root_folder = RootFolderResolver::new("cfp-web")
        .with_cli_arg(cli.root_folder.clone())
        .resolve();

    // Step 2: Create root folder layout
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    // Step 3: Bootstrap configuration
    let config = TomlConfig::load(initializer.root_folder()).context("Failed to load configuration")?;
    if !from_env {
        match EnvFilter::try_new(&config.logging.level) {
            Ok(level) => {
                if let Err(e) = filter_handle.modify(|filter| *filter = level) {
                    warn!("Could not apply configured log level: {}", e);
                }
            }
            Err(e) => warn!("Invalid log level '{}' in configuration: {}", config.logging.level, e),
        }
    }

    // Step 4: Open or create database
    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db = cfp_common::db::init_database(&db_path)
        .await
        .context("Failed to open database")?;

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::CreateSuperuser {
            username,
            email,
            password,
        } => {
            let user = cfp_web::api::create_superuser(&db, &config, &username, &email, &password)
                .await
                .context("Failed to create superuser")?;
            info!("Superuser '{}' created", user.username);
            Ok(())
        }
        Command::Serve { port } => serve(db, config, initializer, port).await,
    }
}

async fn serve(
    db: sqlx::SqlitePool,
    mut config: TomlConfig,
    initializer: RootFolderInitializer,
    port: Option<u16>,
) -> Result<()> {
    if let Some(port) = port {
        config.port = port;
    }

    let secret_key = match &config.secret_key {
        Some(key) => key.clone(),
        None => settings::load_or_init_secret_key(&db)
            .await
            .context("Failed to load secret key")?,
    };

    let purged = cfp_web::db::sessions::purge_expired(&db, cfp_common::time::now()).await?;
    if purged > 0 {
        info!("Removed {} expired sessions", purged);
    }

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.bind_address, config.port))?;

    let state = AppState::new(
        db,
        config,
        secret_key,
        initializer.uploads_path(),
        Arc::new(LogMailer),
    );
    let app = cfp_web::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
