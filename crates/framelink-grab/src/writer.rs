//! Verbatim dump of one captured buffer.

use std::fs::File;
use std::io::Write;

use anyhow::{Context, Result};
use tracing::info;

/// Write `data` sequentially to `path`, replacing any existing file.
pub fn dump(path: &str, data: &[u8]) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("Creating {path}"))?;
    file.write_all(data).context("Writing capture bytes")?;
    info!("Wrote {} bytes to {}", data.len(), path);
    Ok(())
}
