use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app;
mod writer;

fn main() -> Result<()> {
    // RUST_LOG=debug for per-ioctl and per-marker detail.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("FrameLink grab v{}", env!("CARGO_PKG_VERSION"));

    match app::run() {
        Ok(()) => {
            info!("Capture finished cleanly.");
            Ok(())
        }
        Err(e) => {
            error!("Fatal error: {:#}", e);
            Err(e)
        }
    }
}
