//! Subcommand implementations
//!
//! Generic over [`Transport`] so they run the same against a fake device.

use std::io::Write;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use evc_core::{
    render, CurrentTarget, DeviceSnapshot, Orchestrator, OutputFormat, Transport, WriteReport,
};

use crate::api::{router, AppState};

/// Poll once and write the rendered snapshot to `out`
pub async fn read<T: Transport>(
    orchestrator: &mut Orchestrator<T>,
    format: OutputFormat,
    out: &mut impl Write,
) -> Result<DeviceSnapshot> {
    let snapshot = orchestrator.poll().await?;
    emit(out, &render(&snapshot, format))?;
    Ok(snapshot)
}

/// Write the limit, report the read-back, then render a fresh poll
pub async fn set_current<T: Transport>(
    orchestrator: &mut Orchestrator<T>,
    target: CurrentTarget,
    amperes: i32,
    format: OutputFormat,
    out: &mut impl Write,
) -> Result<WriteReport> {
    let report = orchestrator.set_current(target, amperes).await?;
    for readback in &report.readback {
        let value = readback
            .value
            .map_or_else(|| "unconfirmed".to_string(), |v| format!("{} A", v));
        // Confirmation goes to stderr so piped json/prometheus stays parseable
        eprintln!(
            "Set {} current (register {}) to {} A, read back {}",
            readback.target, readback.address, report.amperes, value
        );
    }

    let snapshot = orchestrator.poll().await?;
    emit(out, &render(&snapshot, format))?;
    Ok(report)
}

fn emit(out: &mut impl Write, text: &str) -> Result<()> {
    out.write_all(text.as_bytes())?;
    if !text.ends_with('\n') {
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

/// Serve the HTTP API until `shutdown` is cancelled
pub async fn serve<T: Transport + 'static>(
    orchestrator: Orchestrator<T>,
    bind: &str,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("Invalid bind address: {}", bind))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    serve_on(listener, orchestrator, shutdown).await
}

pub async fn serve_on<T: Transport + 'static>(
    listener: TcpListener,
    orchestrator: Orchestrator<T>,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = router(AppState::new(orchestrator));
    let addr = listener.local_addr()?;
    info!("API server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| {
            error!("Server error: {}", e);
            anyhow::Error::from(e)
        })?;

    info!("API server stopped");
    Ok(())
}
