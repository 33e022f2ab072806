//! Scripted in-memory capture driver used by the session tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::ptr::NonNull;
use std::rc::Rc;
use std::time::Duration;

use framelink_core::{CaptureError, EffectiveFormat};

use crate::device::{BufferDescriptor, CaptureDevice, FormatRequest, MappedRegion, WaitStatus};

#[derive(Default)]
struct StatsInner {
    maps: usize,
    unmaps: usize,
}

/// Map/unmap counters, shared so tests can inspect them after the device
/// has been moved into a session.
#[derive(Clone, Default)]
pub struct MockStats(Rc<RefCell<StatsInner>>);

impl MockStats {
    pub fn maps(&self) -> usize {
        self.0.borrow().maps
    }

    pub fn unmaps(&self) -> usize {
        self.0.borrow().unmaps
    }
}

/// Fake driver with heap-backed buffer storage.
///
/// Grants at most `grant` buffers, deposits `fill` into a buffer when it is
/// dequeued, and can be scripted to fail mapping at a given index.
pub struct MockDevice {
    grant: u32,
    buffer_len: usize,
    fill: Vec<u8>,
    fail_map_at: Option<u32>,
    stats: MockStats,
    storage: Vec<*mut u8>,
    queued: VecDeque<u32>,
    streaming: bool,
    sequence: u32,
}

impl MockDevice {
    pub fn new(grant: u32, buffer_len: usize) -> Self {
        Self {
            grant,
            buffer_len,
            fill: Vec::new(),
            fail_map_at: None,
            stats: MockStats::default(),
            storage: Vec::new(),
            queued: VecDeque::new(),
            streaming: false,
            sequence: 0,
        }
    }

    pub fn with_fill(mut self, fill: Vec<u8>) -> Self {
        self.fill = fill;
        self
    }

    pub fn fail_map_at(mut self, index: u32) -> Self {
        self.fail_map_at = Some(index);
        self
    }

    pub fn stats(&self) -> MockStats {
        self.stats.clone()
    }

    fn alloc(len: usize) -> *mut u8 {
        Box::into_raw(vec![0u8; len].into_boxed_slice()) as *mut u8
    }

    unsafe fn free(ptr: *mut u8, len: usize) {
        drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr, len)));
    }
}

impl CaptureDevice for MockDevice {
    fn set_format(&mut self, request: &FormatRequest) -> Result<EffectiveFormat, CaptureError> {
        Ok(EffectiveFormat {
            geometry: request.geometry,
            fourcc: request.fourcc,
            size_image: self.buffer_len as u32,
        })
    }

    fn request_buffers(&mut self, count: u32) -> Result<u32, CaptureError> {
        let granted = count.min(self.grant);
        self.storage = (0..granted).map(|_| Self::alloc(self.buffer_len)).collect();
        Ok(granted)
    }

    fn query_buffer(&mut self, index: u32) -> Result<BufferDescriptor, CaptureError> {
        if index as usize >= self.storage.len() {
            return Err(CaptureError::Allocation {
                reason: format!("query of unallocated buffer {index}"),
            });
        }
        Ok(BufferDescriptor {
            index,
            length: self.buffer_len as u32,
            mem_offset: index * self.buffer_len as u32,
            ..Default::default()
        })
    }

    fn map_buffer(&mut self, desc: &BufferDescriptor) -> Result<MappedRegion, CaptureError> {
        if self.fail_map_at == Some(desc.index) {
            return Err(CaptureError::Mmap {
                index: desc.index,
                source: io::Error::new(io::ErrorKind::Other, "scripted mmap failure"),
            });
        }
        self.stats.0.borrow_mut().maps += 1;
        let ptr = NonNull::new(self.storage[desc.index as usize]).expect("mock storage pointer");
        Ok(unsafe { MappedRegion::from_raw(ptr, self.buffer_len) })
    }

    fn unmap_buffer(&mut self, _region: MappedRegion) -> Result<(), CaptureError> {
        self.stats.0.borrow_mut().unmaps += 1;
        Ok(())
    }

    fn queue_buffer(&mut self, index: u32) -> Result<(), CaptureError> {
        self.queued.push_back(index);
        Ok(())
    }

    fn dequeue_buffer(&mut self) -> Result<BufferDescriptor, CaptureError> {
        let index = self.queued.pop_front().ok_or_else(|| CaptureError::Dequeue {
            reason: "no queued buffer".into(),
        })?;
        let used = self.fill.len().min(self.buffer_len);
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.fill.as_ptr(),
                self.storage[index as usize],
                used,
            );
        }
        self.sequence += 1;
        Ok(BufferDescriptor {
            index,
            length: self.buffer_len as u32,
            bytes_used: used as u32,
            sequence: self.sequence,
            ..Default::default()
        })
    }

    fn stream_on(&mut self) -> Result<(), CaptureError> {
        self.streaming = true;
        Ok(())
    }

    fn stream_off(&mut self) -> Result<(), CaptureError> {
        self.streaming = false;
        Ok(())
    }

    fn wait_ready(&mut self, _timeout: Option<Duration>) -> Result<WaitStatus, CaptureError> {
        if self.queued.is_empty() {
            Ok(WaitStatus::TimedOut)
        } else {
            Ok(WaitStatus::Ready)
        }
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        for ptr in self.storage.drain(..) {
            unsafe { Self::free(ptr, self.buffer_len) };
        }
    }
}
