//! framelink-capture — V4L2 multi-planar frame capture.
//!
//! Owns the device handle and the kernel buffer pool, and drives the
//! enqueue → wait → dequeue → requeue cycle that produces the raw bytes the
//! FPGA frame decoder scans.
//!
//! # Buffer ownership
//!
//! ```text
//! UNMAPPED ──map──► IDLE ──queue──► QUEUED (driver) ──dequeue──► DEQUEUED (app)
//!     ▲                                   ▲                          │
//!     └──────────── teardown ─────────────┴────────── requeue ──────┘
//! ```
//!
//! Exactly one buffer is application-owned between dequeue and requeue; the
//! driver owns the rest. The application never touches a region it has not
//! dequeued, and every mapped region is unmapped exactly once at teardown.
//!
//! The driver contract lives behind [`CaptureDevice`] so the session logic
//! can be exercised against a scripted in-memory device; the real backend is
//! [`V4l2Device`].

pub mod device;
pub mod session;
pub mod sys;
pub mod v4l2;

#[cfg(test)]
pub mod mock;

pub use device::{BufferDescriptor, CaptureDevice, FormatRequest, MappedRegion, WaitStatus};
pub use session::{CaptureSession, FilledBuffer};
pub use v4l2::V4l2Device;
