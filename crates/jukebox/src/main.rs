//! Jukebox binary: serve a directory of MIDI files as playback sequences.

use anyhow::Result;
use clap::Parser;
use jukebox::library::SongLibrary;
use jukebox::web::{router, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Jukebox - compiles MIDI songs into note-block playback sequences
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Directory of MIDI files to serve
    #[arg(short, long, default_value = "./midi")]
    library: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let library = SongLibrary::new(&args.library);
    match library.list().await {
        Ok(songs) => info!(
            library = %args.library.display(),
            songs = songs.len(),
            "Jukebox starting"
        ),
        Err(err) => tracing::warn!(
            library = %args.library.display(),
            error = %err,
            "Jukebox starting with unreadable library"
        ),
    }

    let state = AppState {
        library: Arc::new(library),
        started: Instant::now(),
    };

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Jukebox shutdown complete");
    Ok(())
}

/// Resolve on SIGINT (Ctrl+C) or SIGTERM (systemd, cargo-watch, etc.)
async fn shutdown_signal() {
    let terminate = async {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(_) => std::future::pending::<()>().await,
            }
        }
        #[cfg(not(unix))]
        std::future::pending::<()>().await;
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down gracefully"),
        _ = terminate => info!("Received SIGTERM, shutting down gracefully"),
    }
}
