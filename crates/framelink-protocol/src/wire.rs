//! Wire-level constants and helpers shared by the decoder and the frame
//! synthesiser.

/// 48-bit start-of-frame sentinel.
pub const START_MARKER: u64 = 0xEAFF_99DE_ADFF;
/// 48-bit end-of-frame sentinel.
pub const END_MARKER: u64 = 0xEAFF_99DE_ADAA;

/// Bytes occupied by a marker or a data record on the wire.
pub const MARKER_LEN: usize = 6;
/// Start marker plus the fixed header fields.
pub const HEADER_LEN: usize = 12;

/// First wire byte of the start marker — the cheap scan filter.
pub(crate) const START_MARKER_LEAD: u8 = START_MARKER.to_le_bytes()[0];

/// Read `bytes` as a byte-reversed unsigned integer: reverse, then interpret
/// big-endian.
pub fn read_reversed(bytes: &[u8]) -> u64 {
    debug_assert!(bytes.len() <= 8);
    let mut value = 0u64;
    for &byte in bytes.iter().rev() {
        value = (value << 8) | u64::from(byte);
    }
    value
}

/// Append the low `len` bytes of `value` to `out` in wire order (reversed).
pub fn write_reversed(out: &mut Vec<u8>, value: u64, len: usize) {
    out.extend_from_slice(&value.to_le_bytes()[..len]);
}

/// Byte advance between successive data records.
///
/// The FPGA encoder folds the record count into the stride; kept exactly as
/// the hardware emits it so decoded output stays bit-compatible. Swap the
/// formula here if the encoder ever changes.
pub fn record_stride(data_length: u32) -> usize {
    12 + data_length as usize + 1
}

/// Synthesise one frame in wire order, stride-faithful, with the end marker
/// in the record slot that follows the last record.
pub fn encode_frame(app_id: u8, mask: u8, records: &[u64]) -> Vec<u8> {
    let data_length = records.len() as u32;
    let stride = record_stride(data_length);

    let mut out = Vec::new();
    write_reversed(&mut out, START_MARKER, MARKER_LEN);
    out.push(app_id);
    write_reversed(&mut out, u64::from(data_length), 3);
    out.push(mask);
    out.push(0); // reserved

    let mut cursor = 0usize;
    for &record in records {
        put_reversed(&mut out, cursor + HEADER_LEN, record);
        cursor += stride;
    }
    put_reversed(&mut out, cursor + HEADER_LEN, END_MARKER);
    out
}

fn put_reversed(out: &mut Vec<u8>, at: usize, value: u64) {
    let end = at + MARKER_LEN;
    if out.len() < end {
        out.resize(end, 0);
    }
    out[at..end].copy_from_slice(&value.to_le_bytes()[..MARKER_LEN]);
}
