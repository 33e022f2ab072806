//! Driver-facing contract for multi-planar capture devices.

use std::ptr::NonNull;
use std::slice;
use std::time::Duration;

use framelink_core::{CaptureError, EffectiveFormat, FourCc, FrameGeometry};

/// Format negotiation request handed to the driver.
#[derive(Debug, Clone, Copy)]
pub struct FormatRequest {
    pub geometry: FrameGeometry,
    pub fourcc: FourCc,
}

/// Scalar buffer metadata exchanged with the driver.
///
/// These are exactly the fields the single-plane/multi-plane adapter copies
/// in both directions on every descriptor exchange.
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferDescriptor {
    pub index: u32,
    pub length: u32,
    pub bytes_used: u32,
    pub mem_offset: u32,
    pub flags: u32,
    pub sequence: u32,
    pub timestamp_us: u64,
}

/// Outcome of a readiness wait. A timeout is not an error; retry policy
/// belongs to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    Ready,
    TimedOut,
}

/// A driver-owned memory span mapped into this process.
///
/// Regions are created and released only by the device that produced them
/// (`mmap`/`munmap` on the real backend, heap storage on the test mock), and
/// are valid strictly between those two calls.
#[derive(Debug)]
pub struct MappedRegion {
    ptr: NonNull<u8>,
    len: usize,
}

impl MappedRegion {
    /// # Safety
    ///
    /// `ptr` must point to `len` readable bytes that remain valid until the
    /// owning device unmaps the region.
    pub unsafe fn from_raw(ptr: NonNull<u8>, len: usize) -> Self {
        Self { ptr, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }
}

/// Capture driver contract.
///
/// Mirrors the streaming I/O ioctl surface of a V4L2 multi-planar capture
/// device: negotiate a format, request and map kernel buffers, queue and
/// dequeue them, gate streaming, and wait for readiness.
pub trait CaptureDevice {
    /// Negotiate geometry and pixel format. The driver may substitute the
    /// geometry (reported through the returned format); a substituted pixel
    /// format must surface as [`CaptureError::UnsupportedFormat`].
    fn set_format(&mut self, request: &FormatRequest) -> Result<EffectiveFormat, CaptureError>;

    /// Request `count` kernel buffers. Returns the granted count, which may
    /// be lower than requested.
    fn request_buffers(&mut self, count: u32) -> Result<u32, CaptureError>;

    /// Query length and mapping offset for buffer `index`.
    fn query_buffer(&mut self, index: u32) -> Result<BufferDescriptor, CaptureError>;

    /// Map the buffer described by `desc` into this process.
    fn map_buffer(&mut self, desc: &BufferDescriptor) -> Result<MappedRegion, CaptureError>;

    /// Release a region previously returned by [`CaptureDevice::map_buffer`].
    fn unmap_buffer(&mut self, region: MappedRegion) -> Result<(), CaptureError>;

    /// Hand buffer `index` to the driver for filling.
    fn queue_buffer(&mut self, index: u32) -> Result<(), CaptureError>;

    /// Take one filled buffer back from the driver.
    fn dequeue_buffer(&mut self) -> Result<BufferDescriptor, CaptureError>;

    fn stream_on(&mut self) -> Result<(), CaptureError>;

    fn stream_off(&mut self) -> Result<(), CaptureError>;

    /// Block until at least one buffer is ready to dequeue, or `timeout`
    /// elapses. `None` blocks indefinitely.
    fn wait_ready(&mut self, timeout: Option<Duration>) -> Result<WaitStatus, CaptureError>;
}
