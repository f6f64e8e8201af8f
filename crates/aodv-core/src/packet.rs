//! Packet types and the text codec
//!
//! Three packet kinds travel between nodes:
//!
//! - [`DataPacket`]: application data addressed to a destination
//! - [`RouteRequest`] (RREQ): flooded to discover a route
//! - [`RouteReply`] (RREP): unicast back along the reverse path, counting hops
//!
//! Encoding fills a fixed-size buffer from the template in [`crate::wire`];
//! decoding checks the header, reads each field at its fixed offset and never
//! allocates on success.

use crate::error::{AodvError, Result};
use crate::traits::Channel;
use crate::types::{NodeId, RequestId};
use crate::wire::{
    check_frame, expect_key, preview, read_number, FrameWriter, DATA_DEST_AT, DATA_FRAME_LEN,
    DATA_HEADER, DATA_PAYLOAD_AT, DATA_PAYLOAD_LEN, DEST_KEY, HOPS_KEY, ITEM_SEP,
    PAYLOAD_KEY, PAYLOAD_TEXT_LEN, REQ_ID_KEY, RREP_DEST_AT, RREP_FRAME_LEN, RREP_HEADER,
    RREP_HOPS_AT, RREP_REQ_ID_AT, RREP_SRC_AT, RREQ_DEST_AT, RREQ_FRAME_LEN, RREQ_HEADER,
    RREQ_REQ_ID_AT, RREQ_SRC_AT, SRC_KEY,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-length payload text, at most ten bytes
///
/// Unused bytes are kept zeroed so that equality compares only the text.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Payload {
    text: [u8; PAYLOAD_TEXT_LEN],
    len: u8,
}

impl Payload {
    /// Maximum payload text in bytes
    pub const MAX_LEN: usize = PAYLOAD_TEXT_LEN;

    /// Build a payload from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > Self::MAX_LEN {
            return Err(AodvError::PayloadTooLong {
                len: bytes.len(),
                max: Self::MAX_LEN,
            });
        }
        if bytes.contains(&0) {
            return Err(AodvError::InvalidPayload(
                "NUL terminates the payload slot".into(),
            ));
        }
        let mut text = [0u8; PAYLOAD_TEXT_LEN];
        text[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            text,
            len: bytes.len() as u8,
        })
    }

    /// Build a payload from text
    pub fn new(text: &str) -> Result<Self> {
        Self::from_bytes(text.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.text[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl TryFrom<String> for Payload {
    type Error = AodvError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<Payload> for String {
    fn from(payload: Payload) -> String {
        payload.to_string()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload({:?})", self.to_string())
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}

/// Application data addressed to `dest`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPacket {
    pub dest: NodeId,
    pub payload: Payload,
}

impl DataPacket {
    /// Wire size of a data frame
    pub const FRAME_LEN: usize = DATA_FRAME_LEN;

    pub fn new(dest: NodeId, payload: Payload) -> Self {
        Self { dest, payload }
    }

    pub fn encode(&self) -> Result<[u8; DATA_FRAME_LEN]> {
        Ok(FrameWriter::new()
            .literal(DATA_HEADER)
            .literal(ITEM_SEP)
            .literal(DEST_KEY)
            .number("DEST", self.dest.get())?
            .literal(ITEM_SEP)
            .literal(PAYLOAD_KEY)
            .slot(self.payload.as_bytes(), DATA_PAYLOAD_LEN)
            .finish())
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        check_frame(buf, DATA_HEADER, DATA_FRAME_LEN)?;
        expect_key(buf, DATA_DEST_AT, DEST_KEY)?;
        expect_key(buf, DATA_PAYLOAD_AT, PAYLOAD_KEY)?;
        let dest = node_field(buf, DATA_DEST_AT, "DEST")?;

        let slot = &buf[DATA_PAYLOAD_AT..DATA_PAYLOAD_AT + PAYLOAD_TEXT_LEN];
        let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
        let payload = Payload::from_bytes(&slot[..end])?;

        Ok(Self { dest, payload })
    }
}

impl fmt::Display for DataPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Dest:{}, Payload:{{{}}}]", self.dest, self.payload)
    }
}

/// Flooded request for a route from `src` to `dest`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteRequest {
    pub req_id: RequestId,
    pub dest: NodeId,
    pub src: NodeId,
}

impl RouteRequest {
    /// Wire size of a route request frame
    pub const FRAME_LEN: usize = RREQ_FRAME_LEN;

    pub fn new(req_id: RequestId, src: NodeId, dest: NodeId) -> Self {
        Self { req_id, dest, src }
    }

    pub fn encode(&self) -> Result<[u8; RREQ_FRAME_LEN]> {
        Ok(FrameWriter::new()
            .literal(RREQ_HEADER)
            .literal(ITEM_SEP)
            .literal(REQ_ID_KEY)
            .number("REQ_ID", self.req_id.get())?
            .literal(ITEM_SEP)
            .literal(DEST_KEY)
            .number("DEST", self.dest.get())?
            .literal(ITEM_SEP)
            .literal(SRC_KEY)
            .number("SRC", self.src.get())?
            .literal(ITEM_SEP)
            .finish())
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        check_frame(buf, RREQ_HEADER, RREQ_FRAME_LEN)?;
        expect_key(buf, RREQ_REQ_ID_AT, REQ_ID_KEY)?;
        expect_key(buf, RREQ_DEST_AT, DEST_KEY)?;
        expect_key(buf, RREQ_SRC_AT, SRC_KEY)?;
        Ok(Self {
            req_id: request_field(buf, RREQ_REQ_ID_AT)?,
            dest: node_field(buf, RREQ_DEST_AT, "DEST")?,
            src: node_field(buf, RREQ_SRC_AT, "SRC")?,
        })
    }
}

impl fmt::Display for RouteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ID:{}, Dest:{}, Src:{}]", self.req_id, self.dest, self.src)
    }
}

/// Reply travelling back toward `src`, counting relays in `hops`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteReply {
    pub req_id: RequestId,
    pub dest: NodeId,
    pub src: NodeId,
    pub hops: u8,
}

impl RouteReply {
    /// Wire size of a route reply frame
    pub const FRAME_LEN: usize = RREP_FRAME_LEN;

    /// Reply issued by the destination itself
    pub fn answer(request: &RouteRequest) -> Self {
        Self {
            req_id: request.req_id,
            dest: request.dest,
            src: request.src,
            hops: 0,
        }
    }

    /// The same reply one relay further from the destination
    pub fn forwarded(&self) -> Result<Self> {
        let hops = self.hops + 1;
        if hops > crate::types::MAX_WIRE_VALUE {
            return Err(AodvError::FieldOutOfRange {
                field: "HOPS",
                value: hops as u32,
            });
        }
        Ok(Self { hops, ..*self })
    }

    pub fn encode(&self) -> Result<[u8; RREP_FRAME_LEN]> {
        Ok(FrameWriter::new()
            .literal(RREP_HEADER)
            .literal(ITEM_SEP)
            .literal(REQ_ID_KEY)
            .number("REQ_ID", self.req_id.get())?
            .literal(ITEM_SEP)
            .literal(DEST_KEY)
            .number("DEST", self.dest.get())?
            .literal(ITEM_SEP)
            .literal(SRC_KEY)
            .number("SRC", self.src.get())?
            .literal(ITEM_SEP)
            .literal(HOPS_KEY)
            .number("HOPS", self.hops)?
            .literal(ITEM_SEP)
            .finish())
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        check_frame(buf, RREP_HEADER, RREP_FRAME_LEN)?;
        expect_key(buf, RREP_REQ_ID_AT, REQ_ID_KEY)?;
        expect_key(buf, RREP_DEST_AT, DEST_KEY)?;
        expect_key(buf, RREP_SRC_AT, SRC_KEY)?;
        expect_key(buf, RREP_HOPS_AT, HOPS_KEY)?;
        Ok(Self {
            req_id: request_field(buf, RREP_REQ_ID_AT)?,
            dest: node_field(buf, RREP_DEST_AT, "DEST")?,
            src: node_field(buf, RREP_SRC_AT, "SRC")?,
            hops: read_number(buf, RREP_HOPS_AT, "HOPS")?,
        })
    }
}

impl fmt::Display for RouteReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[ID:{}, Dest:{}, Src:{}, Hops:{}]",
            self.req_id, self.dest, self.src, self.hops
        )
    }
}

/// Packet kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketKind {
    Data,
    RouteRequest,
    RouteReply,
}

impl PacketKind {
    const ALL: [PacketKind; 3] = [
        PacketKind::Data,
        PacketKind::RouteRequest,
        PacketKind::RouteReply,
    ];

    /// Kind named by the header a frame opens with
    pub fn of_frame(buf: &[u8]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| buf.starts_with(kind.header().as_bytes()))
    }

    /// Logical channel frames of this kind travel on
    pub fn channel(&self) -> Channel {
        match self {
            PacketKind::Data => Channel::Data,
            PacketKind::RouteRequest => Channel::RouteRequest,
            PacketKind::RouteReply => Channel::RouteReply,
        }
    }

    /// Literal header that opens frames of this kind
    pub fn header(&self) -> &'static str {
        match self {
            PacketKind::Data => DATA_HEADER,
            PacketKind::RouteRequest => RREQ_HEADER,
            PacketKind::RouteReply => RREP_HEADER,
        }
    }

    /// Fixed frame length for this kind
    pub fn frame_len(&self) -> usize {
        match self {
            PacketKind::Data => DATA_FRAME_LEN,
            PacketKind::RouteRequest => RREQ_FRAME_LEN,
            PacketKind::RouteReply => RREP_FRAME_LEN,
        }
    }
}

/// Any decoded packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Packet {
    Data(DataPacket),
    RouteRequest(RouteRequest),
    RouteReply(RouteReply),
}

impl Packet {
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::Data(_) => PacketKind::Data,
            Packet::RouteRequest(_) => PacketKind::RouteRequest,
            Packet::RouteReply(_) => PacketKind::RouteReply,
        }
    }

    /// Decode a frame of any kind, picking the decoder by header
    pub fn decode(buf: &[u8]) -> Result<Self> {
        match PacketKind::of_frame(buf) {
            Some(PacketKind::Data) => DataPacket::decode(buf).map(Packet::Data),
            Some(PacketKind::RouteRequest) => RouteRequest::decode(buf).map(Packet::RouteRequest),
            Some(PacketKind::RouteReply) => RouteReply::decode(buf).map(Packet::RouteReply),
            None => Err(AodvError::UnrecognizedPacket(preview(buf))),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(match self {
            Packet::Data(p) => p.encode()?.to_vec(),
            Packet::RouteRequest(p) => p.encode()?.to_vec(),
            Packet::RouteReply(p) => p.encode()?.to_vec(),
        })
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Packet::Data(p) => write!(f, "DATA {}", p),
            Packet::RouteRequest(p) => write!(f, "ROUTE_REQUEST {}", p),
            Packet::RouteReply(p) => write!(f, "ROUTE_REPLY {}", p),
        }
    }
}

fn node_field(buf: &[u8], at: usize, field: &'static str) -> Result<NodeId> {
    let value = read_number(buf, at, field)?;
    NodeId::new(value).map_err(|_| AodvError::MalformedField {
        field,
        reason: format!("{} is not a node id", value),
    })
}

fn request_field(buf: &[u8], at: usize) -> Result<RequestId> {
    // Two digits never exceed 99, so this cannot fail once read_number succeeds
    RequestId::new(read_number(buf, at, "REQ_ID")?)
}
