#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! HTTP server for the MailBag web mail client

use anyhow::Context;
use clap::Parser;
use mailbag::{AppState, ContactStore, ServerConfig, router};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mailbag-server")]
#[command(about = "REST backend for the MailBag web mail client")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "MAILBAG_LISTEN", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// IMAP/SMTP account file
    #[arg(long, env = "MAILBAG_SERVER_INFO", default_value = "serverInfo.json")]
    server_info: PathBuf,

    /// Contact list file (created on first write)
    #[arg(long, env = "MAILBAG_CONTACTS", default_value = "contacts.json")]
    contacts: PathBuf,

    /// Directory with the pre-built client application
    #[arg(long, env = "MAILBAG_STATIC_DIR")]
    static_dir: Option<PathBuf>,

    /// Answer every request with 200, errors included
    #[arg(long, env = "MAILBAG_LEGACY_STATUS")]
    legacy_status: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = ServerConfig::load(&args.server_info)
        .with_context(|| format!("loading {}", args.server_info.display()))?;

    if let Some(dir) = &args.static_dir {
        info!("Serving client application from {}", dir.display());
    }

    let state = AppState::new(config, ContactStore::new(&args.contacts))
        .with_legacy_status(args.legacy_status)
        .with_static_dir(args.static_dir);
    let app = router(state);

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    info!("MailBag listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("MailBag stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
