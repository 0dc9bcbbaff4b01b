//! stopcast-server - passenger-demand notification service
//!
//! Startup order: tracing, configuration, database, model (load or train),
//! today's predictions, daily scheduler, HTTP listener.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use stopcast_common::config::Config;
use stopcast_common::db::init_database;
use stopcast_common::time::today;
use stopcast_server::scheduler::DailyScheduler;
use stopcast_server::{build_router, jobs, AppState};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "stopcast-server")]
#[command(about = "Passenger-demand forecasting and notification service")]
#[command(version)]
struct Args {
    /// Config file (TOML); falls back to STOPCAST_CONFIG, then the per-user file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "STOPCAST_PORT")]
    port: Option<u16>,

    /// Directory for the database, dataset, model and uploads
    #[arg(short, long, env = "STOPCAST_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Address to bind
    #[arg(short, long, env = "STOPCAST_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "stopcast_server=info,stopcast_forecast=info,stopcast_common=info,tower_http=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting stopcast-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.host = bind;
    }
    if let Some(data_dir) = args.data_dir {
        config.storage.data_dir = data_dir;
    }
    let run_at = config.schedule.daily_time()?;
    let addr = config.bind_address()?;

    let db_path = config.storage.database_path();
    info!("Database path: {}", db_path.display());
    let pool = init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let state = AppState::new(pool, config.clone()).context("Failed to create application state")?;

    match jobs::ensure_model(&state).await {
        Ok(true) => info!("✓ Forecasting model ready"),
        Ok(false) => {}
        Err(e) => warn!(error = %e, "Model unavailable, predictions will use the heuristic"),
    }

    if config.schedule.run_on_startup {
        if let Err(e) = jobs::ensure_predictions_for(&state, today()).await {
            error!(error = %e, "Failed to generate today's predictions at startup");
        }
    }

    if config.schedule.enabled {
        DailyScheduler::new(state.clone(), run_at).spawn();
    } else {
        info!("Daily scheduler disabled");
    }

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("stopcast-server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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
