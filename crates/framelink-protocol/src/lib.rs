//! framelink-protocol — the FPGA frame wire format.
//!
//! The capture hardware interleaves self-delimited binary records ("FPGA
//! frames") into the raw byte stream delivered by the video interface. This
//! crate scans a captured buffer for those frames and decodes them; it knows
//! nothing about the device that produced the bytes.
//!
//! # Frame layout
//!
//! ```text
//! [0..6]    start marker   u48 rev  0xEAFF99DEADFF
//! [6]       app_id         u8
//! [7..10]   data_length    u24 rev  record count declared by the encoder
//! [10]      mask           u8
//! [11]      reserved       u8
//! [12..]    data records   data_length × u48 rev,
//!                          advancing 12 + data_length + 1 bytes per record
//! [..+6]    end marker     u48 rev  0xEAFF99DEADAA
//! ```
//!
//! Every multi-byte field arrives byte-reversed: the decoder reads the
//! declared bytes, reverses them, and interprets the result big-endian. The
//! end marker is read but never enforced here — [`ParsedFrame`] carries it
//! for the caller to judge.

pub mod decode;
pub mod wire;

pub use decode::{
    decode_frame, find_start_marker, scan_all, FrameHeader, FrameScanner, ParsedFrame, ScanPolicy,
};
pub use wire::{encode_frame, END_MARKER, START_MARKER};
