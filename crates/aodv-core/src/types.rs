//! Node and request identifiers
//!
//! Both identifiers travel on the wire as two-character decimal fields, so
//! their value range is bounded by the codec: node ids are `1..=99` and
//! request ids are `0..=99`.

use crate::error::{AodvError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hop count sentinel meaning "unreachable"
pub const HOP_INFINITY: u8 = 50;

/// Largest value a two-character wire field can carry
pub const MAX_WIRE_VALUE: u8 = 99;

/// Node identifier in `1..=99`
///
/// Table slots are indexed by `id - 1`. The value zero is reserved for "no
/// node" and is represented as `Option<NodeId>` instead.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct NodeId(u8);

impl NodeId {
    /// Create a node id, rejecting zero and anything the wire cannot carry
    pub fn new(id: u8) -> Result<Self> {
        if id == 0 || id > MAX_WIRE_VALUE {
            return Err(AodvError::FieldOutOfRange {
                field: "node",
                value: id as u32,
            });
        }
        Ok(NodeId(id))
    }

    /// Node id for a zero-based table slot
    pub fn from_index(index: usize) -> Result<Self> {
        u8::try_from(index + 1)
            .map_err(|_| AodvError::FieldOutOfRange {
                field: "node",
                value: (index + 1) as u32,
            })
            .and_then(Self::new)
    }

    /// Raw identifier
    pub fn get(&self) -> u8 {
        self.0
    }

    /// Zero-based table slot
    pub fn index(&self) -> usize {
        self.0 as usize - 1
    }
}

impl TryFrom<u8> for NodeId {
    type Error = AodvError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<NodeId> for u8 {
    fn from(id: NodeId) -> u8 {
        id.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Route request identifier, scoped to the originating node
///
/// Not globally unique: two sources may use the same value at the same time.
/// Locally allocated ids cycle through `1..=99`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct RequestId(u8);

impl RequestId {
    /// First id handed out by a freshly started node
    pub const FIRST: RequestId = RequestId(1);

    /// Create a request id in `0..=99`
    pub fn new(id: u8) -> Result<Self> {
        if id > MAX_WIRE_VALUE {
            return Err(AodvError::FieldOutOfRange {
                field: "REQ_ID",
                value: id as u32,
            });
        }
        Ok(RequestId(id))
    }

    /// Raw identifier
    pub fn get(&self) -> u8 {
        self.0
    }

    /// The id following this one; 99 wraps to 1
    pub fn next(&self) -> Self {
        if self.0 < MAX_WIRE_VALUE {
            RequestId(self.0 + 1)
        } else {
            Self::FIRST
        }
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::FIRST
    }
}

impl TryFrom<u8> for RequestId {
    type Error = AodvError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<RequestId> for u8 {
    fn from(id: RequestId) -> u8 {
        id.0
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_range() {
        assert!(NodeId::new(0).is_err());
        assert!(NodeId::new(100).is_err());
        let id = NodeId::new(7).unwrap();
        assert_eq!(id.get(), 7);
        assert_eq!(id.index(), 6);
        assert_eq!(NodeId::from_index(6).unwrap(), id);
    }

    #[test]
    fn test_request_id_wraps_to_one() {
        let id = RequestId::new(98).unwrap();
        assert_eq!(id.next().get(), 99);
        assert_eq!(id.next().next(), RequestId::FIRST);
        assert!(RequestId::new(0).is_ok());
        assert!(RequestId::new(100).is_err());
    }

    #[test]
    fn test_node_id_serde_rejects_zero() {
        let id: NodeId = serde_json::from_str("5").unwrap();
        assert_eq!(id.get(), 5);
        assert!(serde_json::from_str::<NodeId>("0").is_err());
    }
}
