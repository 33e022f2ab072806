//! Minimal V4L2 ABI surface used by the capture backend.
//!
//! Only the multi-planar streaming-capture subset is declared. Layouts match
//! `<linux/videodev2.h>` on 64-bit Linux; the size assertions below pin the
//! ioctl request codes to the kernel's.

#![allow(non_camel_case_types)]

use std::mem;

pub const VIDEO_MAX_PLANES: usize = 8;

pub const V4L2_BUF_TYPE_VIDEO_CAPTURE_MPLANE: u32 = 9;
pub const V4L2_MEMORY_MMAP: u32 = 1;
pub const V4L2_FIELD_INTERLACED: u32 = 4;

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct v4l2_plane_pix_format {
    pub sizeimage: u32,
    pub bytesperline: u32,
    pub reserved: [u16; 6],
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct v4l2_pix_format_mplane {
    pub width: u32,
    pub height: u32,
    pub pixelformat: u32,
    pub field: u32,
    pub colorspace: u32,
    pub plane_fmt: [v4l2_plane_pix_format; VIDEO_MAX_PLANES],
    pub num_planes: u8,
    pub flags: u8,
    pub ycbcr_enc: u8,
    pub quantization: u8,
    pub xfer_func: u8,
    pub reserved: [u8; 7],
}

// The kernel union also carries window/VBI formats with pointer members, so
// it is 8-aligned even though pix_mp itself is packed.
#[repr(C, align(8))]
#[derive(Clone, Copy)]
pub union v4l2_format_fmt {
    pub pix_mp: v4l2_pix_format_mplane,
    pub raw_data: [u8; 200],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_format {
    pub type_: u32,
    pub fmt: v4l2_format_fmt,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_requestbuffers {
    pub count: u32,
    pub type_: u32,
    pub memory: u32,
    pub reserved: [u32; 2],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_timecode {
    pub type_: u32,
    pub flags: u32,
    pub frames: u8,
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub userbits: [u8; 4],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union v4l2_plane_m {
    pub mem_offset: u32,
    pub userptr: libc::c_ulong,
    pub fd: i32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_plane {
    pub bytesused: u32,
    pub length: u32,
    pub m: v4l2_plane_m,
    pub data_offset: u32,
    pub reserved: [u32; 11],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union v4l2_buffer_m {
    pub offset: u32,
    pub userptr: libc::c_ulong,
    pub planes: *mut v4l2_plane,
    pub fd: i32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_buffer {
    pub index: u32,
    pub type_: u32,
    pub bytesused: u32,
    pub flags: u32,
    pub field: u32,
    pub timestamp: libc::timeval,
    pub timecode: v4l2_timecode,
    pub sequence: u32,
    pub memory: u32,
    pub m: v4l2_buffer_m,
    pub length: u32,
    pub reserved2: u32,
    pub request_fd: i32,
}

// ── ioctl request codes ───────────────────────────────────────────────────────

const _IOC_WRITE: u64 = 1;
const _IOC_READ: u64 = 2;

const fn ioc(dir: u64, nr: u64, size: usize) -> libc::c_ulong {
    ((dir << 30) | ((size as u64) << 16) | ((b'V' as u64) << 8) | nr) as libc::c_ulong
}

pub const VIDIOC_S_FMT: libc::c_ulong =
    ioc(_IOC_READ | _IOC_WRITE, 5, mem::size_of::<v4l2_format>());
pub const VIDIOC_REQBUFS: libc::c_ulong =
    ioc(_IOC_READ | _IOC_WRITE, 8, mem::size_of::<v4l2_requestbuffers>());
pub const VIDIOC_QUERYBUF: libc::c_ulong =
    ioc(_IOC_READ | _IOC_WRITE, 9, mem::size_of::<v4l2_buffer>());
pub const VIDIOC_QBUF: libc::c_ulong =
    ioc(_IOC_READ | _IOC_WRITE, 15, mem::size_of::<v4l2_buffer>());
pub const VIDIOC_DQBUF: libc::c_ulong =
    ioc(_IOC_READ | _IOC_WRITE, 17, mem::size_of::<v4l2_buffer>());
pub const VIDIOC_STREAMON: libc::c_ulong = ioc(_IOC_WRITE, 18, mem::size_of::<libc::c_int>());
pub const VIDIOC_STREAMOFF: libc::c_ulong = ioc(_IOC_WRITE, 19, mem::size_of::<libc::c_int>());
