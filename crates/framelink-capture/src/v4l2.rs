//! Real V4L2 backend: raw ioctls against a multi-planar capture device.

use std::ffi::CString;
use std::io;
use std::mem;
use std::os::unix::io::RawFd;
use std::ptr::{self, NonNull};
use std::time::Duration;

use framelink_core::{CaptureError, EffectiveFormat, FourCc, FrameGeometry};
use tracing::debug;

use crate::device::{BufferDescriptor, CaptureDevice, FormatRequest, MappedRegion, WaitStatus};
use crate::sys;

/// Multi-planar V4L2 capture device, opened non-blocking.
pub struct V4l2Device {
    fd: RawFd,
    path: String,
}

impl V4l2Device {
    pub fn open(path: &str) -> Result<Self, CaptureError> {
        let cpath = CString::new(path).map_err(|_| CaptureError::Open {
            path: path.into(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"),
        })?;

        let fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDWR | libc::O_NONBLOCK) };
        if fd < 0 {
            return Err(CaptureError::Open {
                path: path.into(),
                source: io::Error::last_os_error(),
            });
        }

        debug!("Opened {} (fd {})", path, fd);
        Ok(Self {
            fd,
            path: path.to_owned(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// ioctl with the retry loop capture drivers expect: EINTR and EAGAIN
    /// are transient while streaming is spinning up.
    fn xioctl(&self, request: libc::c_ulong, arg: *mut libc::c_void) -> io::Result<()> {
        loop {
            let r = unsafe { libc::ioctl(self.fd, request, arg) };
            if r != -1 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) | Some(libc::EAGAIN) => continue,
                _ => return Err(err),
            }
        }
    }

    /// Single-plane ↔ multi-plane descriptor adapter.
    ///
    /// The driver class is multi-planar, so every `v4l2_buffer` exchanged
    /// with it must carry a plane array even though this device only ever
    /// uses one plane. Wraps a one-element array around `desc`, issues the
    /// ioctl, and copies the scalar fields back out — in both directions,
    /// for QUERYBUF, QBUF and DQBUF alike.
    fn plane_ioctl(&self, request: libc::c_ulong, desc: &mut BufferDescriptor) -> io::Result<()> {
        let mut plane: sys::v4l2_plane = unsafe { mem::zeroed() };
        plane.length = desc.length;
        plane.bytesused = desc.bytes_used;
        plane.m = sys::v4l2_plane_m {
            mem_offset: desc.mem_offset,
        };

        let mut buf: sys::v4l2_buffer = unsafe { mem::zeroed() };
        buf.type_ = sys::V4L2_BUF_TYPE_VIDEO_CAPTURE_MPLANE;
        buf.memory = sys::V4L2_MEMORY_MMAP;
        buf.index = desc.index;
        buf.flags = desc.flags;
        buf.m = sys::v4l2_buffer_m { planes: &mut plane };
        buf.length = 1;

        self.xioctl(request, &mut buf as *mut _ as *mut libc::c_void)?;

        desc.index = buf.index;
        desc.flags = buf.flags;
        desc.sequence = buf.sequence;
        desc.timestamp_us =
            buf.timestamp.tv_sec as u64 * 1_000_000 + buf.timestamp.tv_usec as u64;
        desc.length = plane.length;
        desc.bytes_used = plane.bytesused;
        desc.mem_offset = unsafe { plane.m.mem_offset };
        Ok(())
    }

    fn stream_ioctl(&self, transition: &'static str, request: libc::c_ulong) -> Result<(), CaptureError> {
        let mut buf_type: libc::c_int = sys::V4L2_BUF_TYPE_VIDEO_CAPTURE_MPLANE as libc::c_int;
        self.xioctl(request, &mut buf_type as *mut _ as *mut libc::c_void)
            .map_err(|source| CaptureError::Stream { transition, source })
    }
}

impl CaptureDevice for V4l2Device {
    fn set_format(&mut self, request: &FormatRequest) -> Result<EffectiveFormat, CaptureError> {
        let mut pix: sys::v4l2_pix_format_mplane = unsafe { mem::zeroed() };
        pix.width = request.geometry.width;
        pix.height = request.geometry.height;
        pix.pixelformat = request.fourcc.0;
        pix.field = sys::V4L2_FIELD_INTERLACED;

        let mut fmt: sys::v4l2_format = unsafe { mem::zeroed() };
        fmt.type_ = sys::V4L2_BUF_TYPE_VIDEO_CAPTURE_MPLANE;
        fmt.fmt = sys::v4l2_format_fmt { pix_mp: pix };

        self.xioctl(sys::VIDIOC_S_FMT, &mut fmt as *mut _ as *mut libc::c_void)
            .map_err(|source| CaptureError::Ioctl {
                name: "VIDIOC_S_FMT",
                source,
            })?;

        let granted = unsafe { fmt.fmt.pix_mp };
        if granted.pixelformat != request.fourcc.0 {
            return Err(CaptureError::UnsupportedFormat {
                requested: request.fourcc,
                granted: FourCc(granted.pixelformat),
            });
        }

        let plane_fmt = granted.plane_fmt;
        Ok(EffectiveFormat {
            geometry: FrameGeometry::new(granted.width, granted.height),
            fourcc: request.fourcc,
            size_image: plane_fmt[0].sizeimage,
        })
    }

    fn request_buffers(&mut self, count: u32) -> Result<u32, CaptureError> {
        let mut req: sys::v4l2_requestbuffers = unsafe { mem::zeroed() };
        req.count = count;
        req.type_ = sys::V4L2_BUF_TYPE_VIDEO_CAPTURE_MPLANE;
        req.memory = sys::V4L2_MEMORY_MMAP;

        self.xioctl(sys::VIDIOC_REQBUFS, &mut req as *mut _ as *mut libc::c_void)
            .map_err(|source| CaptureError::Allocation {
                reason: format!("VIDIOC_REQBUFS failed: {source}"),
            })?;

        if req.count == 0 {
            return Err(CaptureError::Allocation {
                reason: "driver granted zero buffers".into(),
            });
        }
        Ok(req.count)
    }

    fn query_buffer(&mut self, index: u32) -> Result<BufferDescriptor, CaptureError> {
        let mut desc = BufferDescriptor {
            index,
            ..Default::default()
        };
        self.plane_ioctl(sys::VIDIOC_QUERYBUF, &mut desc)
            .map_err(|source| CaptureError::Ioctl {
                name: "VIDIOC_QUERYBUF",
                source,
            })?;
        Ok(desc)
    }

    fn map_buffer(&mut self, desc: &BufferDescriptor) -> Result<MappedRegion, CaptureError> {
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                desc.length as usize,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.fd,
                desc.mem_offset as libc::off_t,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(CaptureError::Mmap {
                index: desc.index,
                source: io::Error::last_os_error(),
            });
        }

        let ptr = NonNull::new(ptr as *mut u8).ok_or_else(|| CaptureError::Mmap {
            index: desc.index,
            source: io::Error::new(io::ErrorKind::Other, "mmap returned NULL"),
        })?;
        Ok(unsafe { MappedRegion::from_raw(ptr, desc.length as usize) })
    }

    fn unmap_buffer(&mut self, region: MappedRegion) -> Result<(), CaptureError> {
        let r = unsafe { libc::munmap(region.as_ptr() as *mut libc::c_void, region.len()) };
        if r != 0 {
            return Err(CaptureError::Unmap {
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    fn queue_buffer(&mut self, index: u32) -> Result<(), CaptureError> {
        let mut desc = BufferDescriptor {
            index,
            ..Default::default()
        };
        self.plane_ioctl(sys::VIDIOC_QBUF, &mut desc)
            .map_err(|source| CaptureError::Ioctl {
                name: "VIDIOC_QBUF",
                source,
            })
    }

    fn dequeue_buffer(&mut self) -> Result<BufferDescriptor, CaptureError> {
        let mut desc = BufferDescriptor::default();
        self.plane_ioctl(sys::VIDIOC_DQBUF, &mut desc)
            .map_err(|source| CaptureError::Dequeue {
                reason: format!("VIDIOC_DQBUF failed: {source}"),
            })?;
        Ok(desc)
    }

    fn stream_on(&mut self) -> Result<(), CaptureError> {
        self.stream_ioctl("on", sys::VIDIOC_STREAMON)
    }

    fn stream_off(&mut self) -> Result<(), CaptureError> {
        self.stream_ioctl("off", sys::VIDIOC_STREAMOFF)
    }

    fn wait_ready(&mut self, timeout: Option<Duration>) -> Result<WaitStatus, CaptureError> {
        let mut tv = libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        let tv_ptr = match timeout {
            Some(t) => {
                tv.tv_sec = t.as_secs() as libc::time_t;
                tv.tv_usec = t.subsec_micros() as libc::suseconds_t;
                &mut tv as *mut libc::timeval
            }
            None => ptr::null_mut(),
        };

        let r = unsafe {
            let mut fds: libc::fd_set = mem::zeroed();
            libc::FD_ZERO(&mut fds);
            libc::FD_SET(self.fd, &mut fds);
            libc::select(
                self.fd + 1,
                &mut fds,
                ptr::null_mut(),
                ptr::null_mut(),
                tv_ptr,
            )
        };

        match r {
            -1 => Err(CaptureError::Wait {
                source: io::Error::last_os_error(),
            }),
            0 => Ok(WaitStatus::TimedOut),
            _ => Ok(WaitStatus::Ready),
        }
    }
}

impl Drop for V4l2Device {
    fn drop(&mut self) {
        debug!("Closing {}", self.path);
        unsafe {
            libc::close(self.fd);
        }
    }
}
