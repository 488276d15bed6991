//! doppio - an in-memory key-value cache server
//!
//! # Startup Sequence
//! 1. Initialize tracing subscriber for logging
//! 2. Load configuration from flags and environment variables
//! 3. Build the runtime for the selected concurrency mode
//! 4. Create the cache and bind the listener
//! 5. Serve until SHUTDOWN, Ctrl+C or SIGTERM

use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::runtime::{Builder, Runtime};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use doppio::api::{serve_admin, AppState};
use doppio::cache::{Cache, CacheConfig};
use doppio::config::{format_bytes, Args, Config, ServeMode};
use doppio::server::{self, ServerContext};

fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doppio=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_args(Args::parse()).context("Failed to load configuration")?;
    let runtime = build_runtime(config.mode).context("Failed to start runtime")?;
    runtime.block_on(run(config))
}

/// The pooled server needs a worker pool; event loops own their threads
/// and only the acceptor runs here.
fn build_runtime(mode: ServeMode) -> std::io::Result<Runtime> {
    match mode {
        ServeMode::Pooled { workers } => Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name("doppio-worker")
            .enable_all()
            .build(),
        ServeMode::EventLoop { .. } => Builder::new_current_thread().enable_all().build(),
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let cache = Cache::with_config(CacheConfig::from_config(&config));
    let ctx = ServerContext::new(cache);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;

    print_mast();
    let threads = match config.mode.threads() {
        1 => "single-threaded".to_string(),
        n => format!("{} threads", n),
    };
    info!(
        "Server started on port {} ({}/{}, {}, {} capacity)",
        config.port,
        std::env::consts::OS,
        std::env::consts::ARCH,
        threads,
        format_bytes(config.capacity)
    );

    if let Some(port) = config.admin_port {
        let admin = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port)))
            .await
            .with_context(|| format!("Failed to bind admin port {}", port))?;
        let state = AppState::new(ctx.cache.clone());
        let shutdown = ctx.shutdown.clone();
        tokio::spawn(async move {
            if let Err(err) = serve_admin(admin, state, shutdown).await {
                error!(error = %err, "Admin server failed");
            }
        });
    }

    tokio::select! {
        result = server::serve(listener, config.mode, ctx.clone()) => result?,
        _ = shutdown_signal() => {}
    }

    if ctx.shutdown.is_triggered() {
        info!("Shutting server down, bye bye");
    }
    ctx.shutdown.trigger();
    Ok(())
}

fn print_mast() {
    println!(
        "\n{}\n",
        [
            "d8888b.  .d88b.  d8888b. d8888b. d888888b  .d88b.  ",
            "88  `8D .8P  Y8. 88  `8D 88  `8D   `88'   .8P  Y8. ",
            "88   88 88    88 88oodD' 88oodD'    88    88    88 ",
            "88  .8D `8b  d8' 88      88        .88.   `8b  d8' ",
            "Y8888D'  `Y88P'  88      88      Y888888P  `Y88P'  ",
        ]
        .join("\n")
    );
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
