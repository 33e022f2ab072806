use std::io;

use thiserror::Error;

use crate::types::FourCc;

/// Failures raised by the capture session and its device backend.
///
/// Resource acquisition failures (`Open`, `Allocation`, `Mmap`) are fatal and
/// terminate the session after everything already acquired is released.
/// `Wait` and a timed-out readiness wait are left to caller policy.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Cannot open capture device {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Device rejected pixel format {requested}, offered {granted}")]
    UnsupportedFormat { requested: FourCc, granted: FourCc },

    #[error("Buffer allocation failed: {reason}")]
    Allocation { reason: String },

    #[error("Mapping buffer {index} failed: {source}")]
    Mmap {
        index: u32,
        #[source]
        source: io::Error,
    },

    #[error("Unmapping buffer region failed: {source}")]
    Unmap {
        #[source]
        source: io::Error,
    },

    #[error("Readiness wait failed: {source}")]
    Wait {
        #[source]
        source: io::Error,
    },

    #[error("Dequeue rejected: {reason}")]
    Dequeue { reason: String },

    #[error("Requeue rejected for buffer {index}: {reason}")]
    Requeue { index: u32, reason: String },

    #[error("Stream-{transition} failed: {source}")]
    Stream {
        transition: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{name} failed: {source}")]
    Ioctl {
        name: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Protocol-level decode failures.
///
/// An end-marker mismatch is deliberately not represented here: the decoder
/// carries whatever end marker it read inside the parsed frame and leaves
/// the verdict to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame at offset {offset} truncated: needs {needed} bytes, buffer holds {available}")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
}
