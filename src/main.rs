use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use expiring_image_host::config::Config;
use expiring_image_host::lifecycle::{spawn_sweeper, ImageHost};
use expiring_image_host::server::{self, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "expiring-image-host")]
#[command(about = "Host uploaded images behind short links that expire")]
struct CliArgs {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve uploads and downloads over HTTP (default).
    Serve {
        /// Listen address, overrides BIND_ADDR.
        #[arg(long, value_name = "ADDR")]
        bind: Option<SocketAddr>,

        /// Do not run the periodic expiry sweep in this process.
        #[arg(long)]
        no_sweeper: bool,
    },
    /// Run a single expiry sweep and print the report as JSON.
    Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "expiring_image_host=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();
    let command = args.command.unwrap_or(Command::Serve {
        bind: None,
        no_sweeper: false,
    });

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let host = match ImageHost::from_config(&config).await {
        Ok(host) => Arc::new(host),
        Err(e) => {
            error!("Failed to initialize stores: {}", e);
            std::process::exit(1);
        }
    };

    match command {
        Command::Serve { bind, no_sweeper } => serve(config, host, bind, no_sweeper).await,
        Command::Sweep => {
            let report = host.sweep().await.context("sweep failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_clean() {
                std::process::exit(2);
            }
            Ok(())
        }
    }
}

async fn serve(
    config: Config,
    host: Arc<ImageHost>,
    bind: Option<SocketAddr>,
    no_sweeper: bool,
) -> Result<()> {
    let sweeper = if no_sweeper {
        info!("Expiry sweep disabled for this process");
        None
    } else {
        info!("Sweeping expired images every {:?}", config.sweep_interval);
        Some(spawn_sweeper(host.clone(), config.sweep_interval))
    };

    let state = AppState::new(host, &config.public_base_url, config.max_upload_bytes);
    let app = server::router(state);

    let addr = bind.unwrap_or(config.bind_addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    info!("Shut down");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT"),
        () = terminate => info!("Received SIGTERM"),
    }
}
