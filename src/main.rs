use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

use mcp_sandbox::config::ServiceConfig;
use mcp_sandbox::dispatcher::AppState;
use mcp_sandbox::executor::Executor;
use mcp_sandbox::http::build_router;
use mcp_sandbox::manager::Manager;
use mcp_sandbox::registry::RunnerCatalog;

/// Remote code-execution service speaking JSON-RPC 2.0 over `/mcp`.
///
/// Configuration is read from the environment (see README / SPEC_FULL.md §6);
/// `--addr` exists only to override `MCP_HTTP_ADDR` for local development,
/// the way the teacher's `clap` CLI exposes overrides for its subcommands.
#[derive(Parser)]
#[command(name = "mcp-sandbox", about = "Remote code-execution MCP service")]
struct Cli {
    /// Override the listen address (otherwise read from MCP_HTTP_ADDR).
    #[arg(long)]
    addr: Option<String>,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    if let Err(err) = run().await {
        log::error!("{err:#}");
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = ServiceConfig::from_env().context("failed to load configuration")?;
    if let Some(addr) = cli.addr {
        config.http_addr = addr;
    }

    let docker = match &config.docker_host {
        Some(host) => bollard::Docker::connect_with_http(host, 120, bollard::API_DEFAULT_VERSION)
            .context("failed to connect to Docker daemon via DOCKER_HOST")?,
        None => bollard::Docker::connect_with_local_defaults()
            .context("failed to connect to local Docker daemon")?,
    };
    docker.ping().await.context("Docker daemon did not respond to ping")?;

    let registry = RunnerCatalog::discover(&docker)
        .await
        .context("failed to discover runner images")?;
    log::info!("discovered {} runner language(s)", registry.list().len());

    let manager = Manager::new(
        config.sandbox_root.clone(),
        config.sandbox_host_path.clone(),
        config.file_secret.clone(),
    );
    let executor = Executor::new(docker);

    let state = Arc::new(AppState {
        manager,
        registry,
        executor,
        public_base_url: config.public_base_url.clone(),
        file_secret: config.file_secret.clone(),
        exec_timeout: Duration::from_secs(config.exec_timeout_secs),
        cleanup_timeout: Duration::from_secs(config.cleanup_timeout_secs),
    });

    let router = build_router(state, config.api_token.clone());

    let addr = normalize_addr(&config.http_addr);
    log::info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    Ok(())
}

/// Wait for ctrl-c or SIGTERM, whichever comes first, so in-flight requests
/// get a chance to finish instead of the process being killed mid-response.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("received ctrl-c, shutting down"),
        _ = terminate => log::info!("received SIGTERM, shutting down"),
    }
}

/// `MCP_HTTP_ADDR` follows the Go convention of a bare `:8080` meaning
/// "all interfaces, port 8080"; translate that to `0.0.0.0:8080` for
/// `tokio::net::TcpListener::bind`.
fn normalize_addr(addr: &str) -> String {
    if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        addr.to_string()
    }
}
