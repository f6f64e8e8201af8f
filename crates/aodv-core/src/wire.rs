//! Text wire templates
//!
//! Every packet is a fixed-size text frame. Numeric fields are exactly two
//! characters, right aligned and space padded (`" 5"`, `"42"`), so every
//! field sits at a fixed byte offset that follows from the template:
//!
//! ```text
//! DATA;DEST:NN;PAYLOAD:<10 bytes text><NUL>                 32 bytes
//! ROUTE_REQUEST;REQ_ID:NN;DEST:NN;SRC:NN;                   39 bytes
//! ROUTE_REPLY;REQ_ID:NN;DEST:NN;SRC:NN;HOPS:NN;             45 bytes
//! ```

use crate::error::{AodvError, Result};
use crate::types::MAX_WIRE_VALUE;

pub const ITEM_SEP: &str = ";";

pub const DATA_HEADER: &str = "DATA";
pub const RREQ_HEADER: &str = "ROUTE_REQUEST";
pub const RREP_HEADER: &str = "ROUTE_REPLY";

pub const REQ_ID_KEY: &str = "REQ_ID:";
pub const DEST_KEY: &str = "DEST:";
pub const SRC_KEY: &str = "SRC:";
pub const HOPS_KEY: &str = "HOPS:";
pub const PAYLOAD_KEY: &str = "PAYLOAD:";

/// Width of every numeric field
pub const FIELD_WIDTH: usize = 2;

/// Payload slot on the wire, including the terminating NUL
pub const DATA_PAYLOAD_LEN: usize = 11;

/// Usable payload text
pub const PAYLOAD_TEXT_LEN: usize = DATA_PAYLOAD_LEN - 1;

const SEP: usize = ITEM_SEP.len();

pub const DATA_DEST_AT: usize = DATA_HEADER.len() + SEP + DEST_KEY.len();
pub const DATA_PAYLOAD_AT: usize = DATA_DEST_AT + FIELD_WIDTH + SEP + PAYLOAD_KEY.len();
pub const DATA_FRAME_LEN: usize = DATA_PAYLOAD_AT + DATA_PAYLOAD_LEN;

pub const RREQ_REQ_ID_AT: usize = RREQ_HEADER.len() + SEP + REQ_ID_KEY.len();
pub const RREQ_DEST_AT: usize = RREQ_REQ_ID_AT + FIELD_WIDTH + SEP + DEST_KEY.len();
pub const RREQ_SRC_AT: usize = RREQ_DEST_AT + FIELD_WIDTH + SEP + SRC_KEY.len();
pub const RREQ_FRAME_LEN: usize = RREQ_SRC_AT + FIELD_WIDTH + SEP;

pub const RREP_REQ_ID_AT: usize = RREP_HEADER.len() + SEP + REQ_ID_KEY.len();
pub const RREP_DEST_AT: usize = RREP_REQ_ID_AT + FIELD_WIDTH + SEP + DEST_KEY.len();
pub const RREP_SRC_AT: usize = RREP_DEST_AT + FIELD_WIDTH + SEP + SRC_KEY.len();
pub const RREP_HOPS_AT: usize = RREP_SRC_AT + FIELD_WIDTH + SEP + HOPS_KEY.len();
pub const RREP_FRAME_LEN: usize = RREP_HOPS_AT + FIELD_WIDTH + SEP;

/// Sequential writer filling a fixed-size frame
pub(crate) struct FrameWriter<const N: usize> {
    buf: [u8; N],
    pos: usize,
}

impl<const N: usize> FrameWriter<N> {
    pub fn new() -> Self {
        Self { buf: [0; N], pos: 0 }
    }

    /// Append template text
    pub fn literal(mut self, text: &str) -> Self {
        self.put(text.as_bytes());
        self
    }

    /// Append a two-character numeric field
    pub fn number(mut self, field: &'static str, value: u8) -> Result<Self> {
        if value > MAX_WIRE_VALUE {
            return Err(AodvError::FieldOutOfRange {
                field,
                value: value as u32,
            });
        }
        let tens = if value >= 10 { b'0' + value / 10 } else { b' ' };
        self.put(&[tens, b'0' + value % 10]);
        Ok(self)
    }

    /// Append raw bytes into a slot of `width` bytes, zero padded
    pub fn slot(mut self, bytes: &[u8], width: usize) -> Self {
        let len = bytes.len().min(width);
        self.put(&bytes[..len]);
        self.pos += width - len;
        self
    }

    pub fn finish(self) -> [u8; N] {
        debug_assert_eq!(self.pos, N, "frame template does not fill the buffer");
        self.buf
    }

    fn put(&mut self, bytes: &[u8]) {
        let end = self.pos + bytes.len();
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
    }
}

/// Check that `buf` is a complete frame of kind `header`
///
/// The header is compared first so that foreign packets report as
/// unrecognized rather than truncated.
pub(crate) fn check_frame(buf: &[u8], header: &str, frame_len: usize) -> Result<()> {
    if !buf.starts_with(header.as_bytes()) {
        return Err(AodvError::UnrecognizedPacket(preview(buf)));
    }
    if buf.len() < frame_len {
        return Err(AodvError::TruncatedFrame {
            expected: frame_len,
            actual: buf.len(),
        });
    }
    Ok(())
}

/// Verify the template text (`;KEY:`) that precedes a field at `field_at`
pub(crate) fn expect_key(buf: &[u8], field_at: usize, key: &'static str) -> Result<()> {
    let start = field_at - key.len() - SEP;
    let found = &buf[start..field_at];
    let (sep, name) = found.split_at(SEP);
    if sep != ITEM_SEP.as_bytes() || name != key.as_bytes() {
        return Err(AodvError::MalformedField {
            field: key.trim_end_matches(':'),
            reason: format!("expected {:?}, found {:?}", expected_text(key), preview(found)),
        });
    }
    Ok(())
}

/// Read the two-character numeric field at `at`
///
/// Accepts `"NN"` and `" N"`; anything else is malformed.
pub(crate) fn read_number(buf: &[u8], at: usize, field: &'static str) -> Result<u8> {
    let (hi, lo) = (buf[at], buf[at + 1]);
    let tens = match hi {
        b' ' => 0,
        b'0'..=b'9' => hi - b'0',
        _ => return Err(malformed_number(field, hi, lo)),
    };
    if !lo.is_ascii_digit() {
        return Err(malformed_number(field, hi, lo));
    }
    Ok(tens * 10 + (lo - b'0'))
}

fn malformed_number(field: &'static str, hi: u8, lo: u8) -> AodvError {
    AodvError::MalformedField {
        field,
        reason: format!("{:?} is not a two-character number", preview(&[hi, lo])),
    }
}

fn expected_text(key: &str) -> String {
    format!("{}{}", ITEM_SEP, key)
}

/// Printable excerpt of a frame for error messages
pub(crate) fn preview(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len()).min(48);
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_lengths() {
        assert_eq!(DATA_DEST_AT, 10);
        assert_eq!(DATA_PAYLOAD_AT, 21);
        assert_eq!(DATA_FRAME_LEN, 32);
        assert_eq!(RREQ_FRAME_LEN, 39);
        assert_eq!(RREP_FRAME_LEN, 45);
        assert_eq!(RREP_HOPS_AT, 42);
    }

    #[test]
    fn test_number_padding() {
        let buf: [u8; 4] = FrameWriter::new()
            .number("X", 5)
            .unwrap()
            .number("X", 42)
            .unwrap()
            .finish();
        assert_eq!(&buf, b" 542");
        assert_eq!(read_number(&buf, 0, "X").unwrap(), 5);
        assert_eq!(read_number(&buf, 2, "X").unwrap(), 42);
    }

    #[test]
    fn test_number_out_of_range() {
        assert!(FrameWriter::<2>::new().number("HOPS", 100).is_err());
    }

    #[test]
    fn test_read_number_rejects_garbage() {
        assert!(read_number(b"  ", 0, "X").is_err());
        assert!(read_number(b"4x", 0, "X").is_err());
        assert!(read_number(b"-1", 0, "X").is_err());
        assert_eq!(read_number(b"07", 0, "X").unwrap(), 7);
    }

    #[test]
    fn test_check_frame_header_before_length() {
        assert!(matches!(
            check_frame(b"HELLO", RREQ_HEADER, RREQ_FRAME_LEN),
            Err(AodvError::UnrecognizedPacket(_))
        ));
        assert!(matches!(
            check_frame(b"ROUTE_REQUEST;", RREQ_HEADER, RREQ_FRAME_LEN),
            Err(AodvError::TruncatedFrame { expected: 39, actual: 14 })
        ));
    }
}
