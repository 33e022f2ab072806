//! Capture session: fixed buffer pool plus the enqueue → wait → dequeue →
//! requeue cycle.

use std::time::Duration;

use bytes::Bytes;
use framelink_core::{CaptureError, EffectiveFormat, FourCc, FrameGeometry};
use tracing::{debug, info, warn};

use crate::device::{CaptureDevice, FormatRequest, MappedRegion, WaitStatus};
use crate::v4l2::V4l2Device;

/// Who owns a pool slot right now. The driver and the application never
/// touch the same region at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Idle,
    Queued,
    Dequeued,
}

struct Slot {
    region: MappedRegion,
    state: SlotState,
}

/// One filled buffer handed to the application by [`CaptureSession::dequeue`].
/// The slot index is the handle; the bytes stay inside the mapped pool.
#[derive(Debug, Clone, Copy)]
pub struct FilledBuffer {
    pub index: u32,
    pub bytes_used: usize,
    pub sequence: u32,
    pub timestamp_us: u64,
}

/// Owns the device and a fixed pool of mapped kernel buffers.
///
/// The pool is sized once at allocation and never resized; buffers are
/// addressed by their driver index. Every exit path — including early fatal
/// errors — unmaps all mapped regions exactly once and closes the device.
pub struct CaptureSession<D: CaptureDevice> {
    device: D,
    format: Option<EffectiveFormat>,
    pool: Vec<Slot>,
    streaming: bool,
}

impl CaptureSession<V4l2Device> {
    /// Open `path` and wrap it in a fresh session.
    pub fn open(path: &str) -> Result<Self, CaptureError> {
        Ok(Self::new(V4l2Device::open(path)?))
    }
}

impl<D: CaptureDevice> CaptureSession<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            format: None,
            pool: Vec::new(),
            streaming: false,
        }
    }

    pub fn format(&self) -> Option<&EffectiveFormat> {
        self.format.as_ref()
    }

    pub fn buffer_count(&self) -> usize {
        self.pool.len()
    }

    /// Negotiate geometry and pixel format. A substituted geometry is
    /// reported, not fatal; a substituted pixel format is.
    pub fn configure(
        &mut self,
        geometry: FrameGeometry,
        fourcc: FourCc,
    ) -> Result<EffectiveFormat, CaptureError> {
        let effective = self.device.set_format(&FormatRequest { geometry, fourcc })?;
        if effective.geometry != geometry {
            warn!(
                "Driver substituted geometry: asked {}, granted {}",
                geometry, effective.geometry
            );
        }
        self.format = Some(effective);
        Ok(effective)
    }

    /// Request `count` kernel buffers and map every granted one.
    ///
    /// The pool uses the granted count, which may be lower than requested.
    /// If any query or mapping fails, every region mapped so far is released
    /// before the error surfaces.
    pub fn allocate_buffers(&mut self, count: u32) -> Result<u32, CaptureError> {
        if !self.pool.is_empty() {
            return Err(CaptureError::Allocation {
                reason: "buffer pool already allocated".into(),
            });
        }

        let granted = self.device.request_buffers(count)?;
        if granted < count {
            info!("Driver granted {granted} of {count} requested buffers");
        }

        for index in 0..granted {
            let result = self
                .device
                .query_buffer(index)
                .and_then(|desc| self.device.map_buffer(&desc));
            match result {
                Ok(region) => self.pool.push(Slot {
                    region,
                    state: SlotState::Idle,
                }),
                Err(e) => {
                    self.release_pool();
                    return Err(e);
                }
            }
        }

        debug!("Mapped {} capture buffers", self.pool.len());
        Ok(granted)
    }

    /// Queue every buffer (ownership to the driver) and start streaming.
    pub fn start_streaming(&mut self) -> Result<(), CaptureError> {
        for index in 0..self.pool.len() as u32 {
            self.device.queue_buffer(index)?;
            self.pool[index as usize].state = SlotState::Queued;
        }
        self.device.stream_on()?;
        self.streaming = true;
        debug!("Streaming on, {} buffers queued", self.pool.len());
        Ok(())
    }

    /// Block until a buffer is ready or `timeout` elapses. A timeout is not
    /// fatal; the retry policy belongs to the caller.
    pub fn wait_ready(&mut self, timeout: Option<Duration>) -> Result<WaitStatus, CaptureError> {
        self.device.wait_ready(timeout)
    }

    /// Take ownership of one filled buffer from the driver.
    ///
    /// At most one buffer may be application-owned at a time; dequeuing
    /// again before [`CaptureSession::requeue`] fails.
    pub fn dequeue(&mut self) -> Result<FilledBuffer, CaptureError> {
        if let Some(held) = self.pool.iter().position(|s| s.state == SlotState::Dequeued) {
            return Err(CaptureError::Dequeue {
                reason: format!("buffer {held} is still application-owned; requeue it first"),
            });
        }

        let desc = self.device.dequeue_buffer()?;
        let slot = self
            .pool
            .get_mut(desc.index as usize)
            .ok_or_else(|| CaptureError::Dequeue {
                reason: format!("driver returned unknown buffer index {}", desc.index),
            })?;
        if slot.state != SlotState::Queued {
            return Err(CaptureError::Dequeue {
                reason: format!("buffer {} was not queued to the driver", desc.index),
            });
        }

        slot.state = SlotState::Dequeued;
        Ok(FilledBuffer {
            index: desc.index,
            bytes_used: desc.bytes_used as usize,
            sequence: desc.sequence,
            timestamp_us: desc.timestamp_us,
        })
    }

    /// Borrow the filled bytes. Valid only while the buffer is dequeued.
    pub fn data(&self, filled: &FilledBuffer) -> Result<&[u8], CaptureError> {
        let slot = self
            .pool
            .get(filled.index as usize)
            .ok_or_else(|| CaptureError::Dequeue {
                reason: format!("unknown buffer index {}", filled.index),
            })?;
        if slot.state != SlotState::Dequeued {
            return Err(CaptureError::Dequeue {
                reason: format!("buffer {} is not application-owned", filled.index),
            });
        }
        let used = filled.bytes_used.min(slot.region.len());
        Ok(&slot.region.as_slice()[..used])
    }

    /// Copy the filled bytes out of the mapped region.
    pub fn snapshot(&self, filled: &FilledBuffer) -> Result<Bytes, CaptureError> {
        Ok(Bytes::copy_from_slice(self.data(filled)?))
    }

    /// Return ownership of a dequeued buffer to the driver for refilling.
    pub fn requeue(&mut self, index: u32) -> Result<(), CaptureError> {
        match self.pool.get(index as usize).map(|s| s.state) {
            None => {
                return Err(CaptureError::Requeue {
                    index,
                    reason: "unknown buffer index".into(),
                })
            }
            Some(SlotState::Dequeued) => {}
            Some(_) => {
                return Err(CaptureError::Requeue {
                    index,
                    reason: "buffer is not application-owned".into(),
                })
            }
        }
        self.device.queue_buffer(index)?;
        self.pool[index as usize].state = SlotState::Queued;
        Ok(())
    }

    pub fn stop_streaming(&mut self) -> Result<(), CaptureError> {
        if self.streaming {
            self.device.stream_off()?;
            self.streaming = false;
            for slot in &mut self.pool {
                slot.state = SlotState::Idle;
            }
            debug!("Streaming off");
        }
        Ok(())
    }

    /// Stream off, unmap every buffer, close the device.
    ///
    /// The pool is released even when stream-off fails; `Drop` performs the
    /// same unwinding when a session goes out of scope early.
    pub fn teardown(mut self) -> Result<(), CaptureError> {
        let stopped = self.stop_streaming();
        self.release_pool();
        stopped
    }

    fn release_pool(&mut self) {
        for (index, slot) in self.pool.drain(..).enumerate() {
            if let Err(e) = self.device.unmap_buffer(slot.region) {
                warn!("Unmapping buffer {index} failed: {e}");
            }
        }
    }
}

impl<D: CaptureDevice> Drop for CaptureSession<D> {
    fn drop(&mut self) {
        if self.streaming {
            if let Err(e) = self.device.stream_off() {
                warn!("Stream-off during teardown failed: {e}");
            }
            self.streaming = false;
        }
        self.release_pool();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDevice;

    fn configured(device: MockDevice) -> CaptureSession<MockDevice> {
        let mut session = CaptureSession::new(device);
        session
            .configure(FrameGeometry::VGA, FourCc::RGB24)
            .expect("configure");
        session
    }

    #[test]
    fn pool_uses_granted_count_and_unmaps_once() {
        let device = MockDevice::new(3, 64);
        let stats = device.stats();
        let mut session = configured(device);

        let granted = session.allocate_buffers(8).expect("allocate");
        assert_eq!(granted, 3);
        assert_eq!(session.buffer_count(), 3);
        assert_eq!(stats.maps(), 3);

        session.teardown().expect("teardown");
        assert_eq!(stats.unmaps(), 3);
    }

    #[test]
    fn mapping_failure_releases_prior_mappings() {
        let device = MockDevice::new(4, 64).fail_map_at(2);
        let stats = device.stats();
        let mut session = configured(device);

        let err = session.allocate_buffers(4).expect_err("map should fail");
        assert!(matches!(err, CaptureError::Mmap { index: 2, .. }));
        assert_eq!(stats.maps(), 2);
        assert_eq!(stats.unmaps(), 2);
        assert_eq!(session.buffer_count(), 0);
    }

    #[test]
    fn dequeue_twice_without_requeue_fails() {
        let device = MockDevice::new(2, 64).with_fill(vec![0xAB; 16]);
        let mut session = configured(device);
        session.allocate_buffers(2).expect("allocate");
        session.start_streaming().expect("stream on");

        let filled = session.dequeue().expect("first dequeue");
        let err = session.dequeue().expect_err("second dequeue must fail");
        assert!(matches!(err, CaptureError::Dequeue { .. }));

        session.requeue(filled.index).expect("requeue");
        session.dequeue().expect("dequeue after requeue");
    }

    #[test]
    fn requeue_of_unowned_buffer_fails() {
        let device = MockDevice::new(2, 64);
        let mut session = configured(device);
        session.allocate_buffers(2).expect("allocate");

        let err = session.requeue(0).expect_err("requeue without dequeue");
        assert!(matches!(err, CaptureError::Requeue { index: 0, .. }));
        let err = session.requeue(9).expect_err("unknown index");
        assert!(matches!(err, CaptureError::Requeue { index: 9, .. }));
    }

    #[test]
    fn full_cycle_delivers_the_fill_pattern() {
        let fill = vec![0x5A; 24];
        let device = MockDevice::new(2, 64).with_fill(fill.clone());
        let mut session = configured(device);

        session.allocate_buffers(2).expect("allocate");
        session.start_streaming().expect("stream on");
        assert_eq!(
            session.wait_ready(None).expect("wait"),
            WaitStatus::Ready
        );

        let filled = session.dequeue().expect("dequeue");
        assert_eq!(filled.bytes_used, fill.len());
        assert_eq!(session.data(&filled).expect("data"), &fill[..]);
        let snapshot = session.snapshot(&filled).expect("snapshot");
        assert_eq!(&snapshot[..], &fill[..]);

        session.requeue(filled.index).expect("requeue");
        assert!(session.data(&filled).is_err());

        session.stop_streaming().expect("stream off");
        session.teardown().expect("teardown");
    }

    #[test]
    fn wait_reports_timeout_when_nothing_is_queued() {
        let device = MockDevice::new(1, 64);
        let mut session = configured(device);
        session.allocate_buffers(1).expect("allocate");
        assert_eq!(
            session.wait_ready(Some(Duration::from_millis(1))).expect("wait"),
            WaitStatus::TimedOut
        );
    }

    #[test]
    fn drop_unmaps_every_buffer() {
        let device = MockDevice::new(5, 64);
        let stats = device.stats();
        {
            let mut session = configured(device);
            session.allocate_buffers(5).expect("allocate");
            session.start_streaming().expect("stream on");
        }
        assert_eq!(stats.maps(), 5);
        assert_eq!(stats.unmaps(), 5);
    }
}
