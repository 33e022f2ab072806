//! Single-shot grab flow.
//!
//! 1. Open the capture device and negotiate geometry / pixel format
//! 2. Allocate and map the kernel buffer pool
//! 3. Queue every buffer and start streaming
//! 4. Wait for readiness, with bounded retries on timeout
//! 5. Dequeue one filled buffer, dump it verbatim, scan it for FPGA frames
//! 6. Requeue, stop streaming, tear down

use anyhow::{bail, Context, Result};
use framelink_capture::{CaptureSession, V4l2Device, WaitStatus};
use framelink_core::GrabConfig;
use framelink_protocol::{scan_all, ParsedFrame, ScanPolicy};
use tracing::{info, warn};

use crate::writer;

pub fn run() -> Result<()> {
    let config = load_config()?;
    info!(
        "Capturing from {} at {} ({})",
        config.device, config.geometry, config.pixel_format
    );

    let mut session = CaptureSession::open(&config.device)?;
    let effective = session.configure(config.geometry, config.pixel_format)?;
    info!(
        "Negotiated {} ({}), {} bytes per plane",
        effective.geometry, effective.fourcc, effective.size_image
    );

    let granted = session.allocate_buffers(config.buffer_count)?;
    info!("Buffer pool ready: {granted} buffers");

    session.start_streaming()?;
    wait_for_frame(&mut session, &config)?;

    let filled = session.dequeue()?;
    info!(
        "Dequeued buffer {} ({} bytes, sequence {})",
        filled.index, filled.bytes_used, filled.sequence
    );
    let snapshot = session.snapshot(&filled)?;

    writer::dump(&config.output, &snapshot)
        .with_context(|| format!("Writing {}", config.output))?;

    let policy = if config.strict_scan {
        ScanPolicy::Strict
    } else {
        ScanPolicy::Permissive
    };
    report_frames(&snapshot, policy);

    session.requeue(filled.index)?;
    session.stop_streaming()?;
    session.teardown()?;
    Ok(())
}

fn load_config() -> Result<GrabConfig> {
    let config = match std::env::var("FRAMELINK_CONFIG") {
        Ok(path) => GrabConfig::load(&path).with_context(|| format!("Loading config {path}"))?,
        Err(_) => GrabConfig::default(),
    };
    Ok(config.apply_env())
}

fn wait_for_frame(session: &mut CaptureSession<V4l2Device>, config: &GrabConfig) -> Result<()> {
    let timeout = config.wait_timeout();
    let attempts = config.wait_retries + 1;
    for attempt in 1..=attempts {
        match session.wait_ready(timeout)? {
            WaitStatus::Ready => return Ok(()),
            WaitStatus::TimedOut => warn!(
                "No buffer ready after {:?} (attempt {attempt}/{attempts})",
                timeout
            ),
        }
    }
    bail!("Device produced no frame in {attempts} readiness waits");
}

fn report_frames(data: &[u8], policy: ScanPolicy) {
    let mut frames = 0usize;
    for item in scan_all(data, policy) {
        match item {
            Ok(frame) => {
                log_frame(&frame);
                frames += 1;
                if !frame.end_matched() {
                    warn!(
                        "Frame at offset {:#x} has a mismatched end marker; scan stopped",
                        frame.offset
                    );
                    break;
                }
            }
            Err(e) => {
                warn!("Frame scan aborted: {e}");
                break;
            }
        }
    }
    if frames == 0 {
        warn!("No FPGA frames found in the captured buffer");
    } else {
        info!("Decoded {frames} FPGA frame(s)");
    }
}

fn log_frame(frame: &ParsedFrame) {
    info!(
        "Frame @ {:#x}: sof={:#014x} app_id={:#04x} data_length={} mask={:#04x} reserved={:#04x}",
        frame.offset,
        frame.header.start_marker,
        frame.header.app_id,
        frame.header.data_length,
        frame.header.mask,
        frame.header.reserved
    );
    for (i, record) in frame.records.iter().enumerate() {
        info!("  data[{i}] = {record:#014x}");
    }
    info!(
        "  end marker {:#014x} ({})",
        frame.end_marker,
        if frame.end_matched() { "ok" } else { "mismatch" }
    );
}
