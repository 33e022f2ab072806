//! Scanning and decoding of FPGA frames from a captured byte buffer.

use framelink_core::FrameError;
use tracing::debug;

use crate::wire::{self, END_MARKER, HEADER_LEN, MARKER_LEN, START_MARKER};

/// Start marker plus the fixed header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// The 48-bit marker value as re-read from the wire.
    pub start_marker: u64,
    pub app_id: u8,
    /// Record count declared by the encoder; bounds the data section.
    pub data_length: u32,
    pub mask: u8,
    pub reserved: u8,
}

/// One decoded frame.
///
/// `end_marker` carries whatever the producer wrote in the closing slot;
/// the caller decides what a mismatch means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFrame {
    /// Offset of the start marker inside the scanned buffer.
    pub offset: usize,
    pub header: FrameHeader,
    pub records: Vec<u64>,
    pub end_marker: u64,
}

impl ParsedFrame {
    pub fn end_matched(&self) -> bool {
        self.end_marker == END_MARKER
    }
}

/// How the scanner treats a frame that runs past the end of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanPolicy {
    /// Surface the truncation as a final error item.
    Strict,
    /// End the scan quietly.
    #[default]
    Permissive,
}

/// Find the next start marker at or after `from`.
///
/// Scans byte-by-byte up to `len - 6` so the full marker read never leaves
/// the buffer; anything shorter than a marker yields `None` outright.
pub fn find_start_marker(data: &[u8], from: usize) -> Option<usize> {
    let last = data.len().saturating_sub(MARKER_LEN);
    for offset in from..last {
        if data[offset] != wire::START_MARKER_LEAD {
            continue;
        }
        if wire::read_reversed(&data[offset..offset + MARKER_LEN]) == START_MARKER {
            return Some(offset);
        }
    }
    None
}

/// Decode one frame whose start marker is confirmed at `offset`.
///
/// Every read is bounded: a declared data length that runs past the buffer
/// yields [`FrameError::Truncated`] instead of reading out of range. Output
/// is unchanged for well-formed input.
pub fn decode_frame(data: &[u8], offset: usize) -> Result<ParsedFrame, FrameError> {
    let header = FrameHeader {
        start_marker: read_field(data, offset, offset, MARKER_LEN)?,
        app_id: read_byte(data, offset, offset + 6)?,
        data_length: read_field(data, offset, offset + 7, 3)? as u32,
        mask: read_byte(data, offset, offset + 10)?,
        reserved: read_byte(data, offset, offset + 11)?,
    };

    let stride = wire::record_stride(header.data_length);
    let mut records = Vec::new();
    let mut cursor = offset;
    for _ in 0..header.data_length {
        records.push(read_field(data, offset, cursor + HEADER_LEN, MARKER_LEN)?);
        cursor += stride;
    }

    let end_marker = read_field(data, offset, cursor + HEADER_LEN, MARKER_LEN)?;
    Ok(ParsedFrame {
        offset,
        header,
        records,
        end_marker,
    })
}

/// Lazy frame iterator over one captured buffer.
///
/// Finite: ends when no further start marker exists (or a frame truncates,
/// per policy). Not restartable mid-scan — a fresh [`scan_all`] call begins
/// again from the head of the buffer.
pub struct FrameScanner<'a> {
    data: &'a [u8],
    cursor: usize,
    policy: ScanPolicy,
    done: bool,
}

/// Scan `data` for every decodable frame under the given policy.
pub fn scan_all(data: &[u8], policy: ScanPolicy) -> FrameScanner<'_> {
    FrameScanner {
        data,
        cursor: 0,
        policy,
        done: false,
    }
}

impl<'a> Iterator for FrameScanner<'a> {
    type Item = Result<ParsedFrame, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let offset = match find_start_marker(self.data, self.cursor) {
            Some(offset) => offset,
            None => {
                self.done = true;
                return None;
            }
        };
        debug!("Start marker at offset {offset}");
        // Resume one byte past the marker so later candidates are not skipped.
        self.cursor = offset + 1;

        match decode_frame(self.data, offset) {
            Ok(frame) => Some(Ok(frame)),
            Err(e) => {
                self.done = true;
                match self.policy {
                    ScanPolicy::Strict => Some(Err(e)),
                    ScanPolicy::Permissive => None,
                }
            }
        }
    }
}

fn read_byte(data: &[u8], frame: usize, at: usize) -> Result<u8, FrameError> {
    if at >= data.len() {
        return Err(truncated(data, frame, at + 1));
    }
    Ok(data[at])
}

fn read_field(data: &[u8], frame: usize, at: usize, len: usize) -> Result<u64, FrameError> {
    let end = at.saturating_add(len);
    if end > data.len() {
        return Err(truncated(data, frame, end));
    }
    Ok(wire::read_reversed(&data[at..end]))
}

fn truncated(data: &[u8], frame: usize, needed_end: usize) -> FrameError {
    FrameError::Truncated {
        offset: frame,
        needed: needed_end - frame,
        available: data.len().saturating_sub(frame),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::encode_frame;
    use proptest::prelude::*;

    #[test]
    fn short_buffers_yield_no_marker() {
        for len in 0..MARKER_LEN {
            let data = vec![0xFF; len];
            assert_eq!(find_start_marker(&data, 0), None);
        }
    }

    #[test]
    fn marker_is_found_after_leading_noise() {
        let mut data = vec![0x00, 0xFF, 0x13];
        data.extend_from_slice(&encode_frame(0x01, 0x00, &[]));
        data.push(0x00);
        assert_eq!(find_start_marker(&data, 0), Some(3));
        assert_eq!(find_start_marker(&data, 4), None);
    }

    #[test]
    fn empty_frame_round_trips() {
        let data = encode_frame(0x42, 0x0F, &[]);
        let frame = decode_frame(&data, 0).expect("decode");
        assert_eq!(frame.header.start_marker, START_MARKER);
        assert_eq!(frame.header.app_id, 0x42);
        assert_eq!(frame.header.data_length, 0);
        assert_eq!(frame.header.mask, 0x0F);
        assert!(frame.records.is_empty());
        assert!(frame.end_matched());
    }

    #[test]
    fn records_sit_at_the_declared_stride() {
        let records = [0x0000_1111_2222, 0x0000_3333_4444];
        let data = encode_frame(0x05, 0x00, &records);

        // data_length = 2 → stride 15: record slots at 12 and 27, end at 42.
        assert_eq!(wire::read_reversed(&data[12..18]), records[0]);
        assert_eq!(wire::read_reversed(&data[27..33]), records[1]);
        assert_eq!(wire::read_reversed(&data[42..48]), END_MARKER);

        let frame = decode_frame(&data, 0).expect("decode");
        assert_eq!(frame.records, records);
        assert!(frame.end_matched());
    }

    #[test]
    fn padded_buffer_yields_exactly_one_frame() {
        // One zero-record frame (18 bytes) padded to 24 with zeros.
        let mut data = encode_frame(0x42, 0x00, &[]);
        data.resize(24, 0);

        let mut scanner = scan_all(&data, ScanPolicy::Permissive);
        let frame = scanner.next().expect("one frame").expect("decodes");
        assert_eq!(frame.offset, 0);
        assert!(frame.records.is_empty());
        assert!(frame.end_matched());
        assert!(scanner.next().is_none());
    }

    #[test]
    fn end_marker_mismatch_is_carried_not_raised() {
        let mut data = encode_frame(0x01, 0x00, &[]);
        data[12] ^= 0xFF;

        let frame = decode_frame(&data, 0).expect("decode still succeeds");
        assert!(!frame.end_matched());
        assert_ne!(frame.end_marker, END_MARKER);
    }

    #[test]
    fn truncated_frame_respects_the_scan_policy() {
        let mut data = encode_frame(0x01, 0x00, &[]);
        data.truncate(15);

        let strict: Vec<_> = scan_all(&data, ScanPolicy::Strict).collect();
        assert_eq!(strict.len(), 1);
        assert!(matches!(
            strict[0],
            Err(FrameError::Truncated { offset: 0, .. })
        ));

        let permissive: Vec<_> = scan_all(&data, ScanPolicy::Permissive).collect();
        assert!(permissive.is_empty());
    }

    #[test]
    fn back_to_back_frames_are_all_found() {
        let mut data = encode_frame(0x01, 0x00, &[]);
        data.extend_from_slice(&encode_frame(0x02, 0x00, &[0x0000_DEAD_BEEF]));

        let frames: Vec<_> = scan_all(&data, ScanPolicy::Strict)
            .collect::<Result<_, _>>()
            .expect("both frames decode");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].header.app_id, 0x01);
        assert_eq!(frames[1].header.app_id, 0x02);
        assert_eq!(frames[1].records, vec![0x0000_DEAD_BEEF]);
    }

    proptest! {
        #[test]
        fn scanning_arbitrary_buffers_stays_in_bounds(
            data in proptest::collection::vec(any::<u8>(), 0..512)
        ) {
            if let Some(offset) = find_start_marker(&data, 0) {
                prop_assert!(offset + MARKER_LEN <= data.len());
            }
            // The scan must terminate without panicking whatever the bytes.
            for item in scan_all(&data, ScanPolicy::Permissive) {
                prop_assert!(item.is_ok());
            }
        }
    }
}
