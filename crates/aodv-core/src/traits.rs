//! Link seam
//!
//! The engine never talks to a radio directly. It hands encoded frames to a
//! [`Link`] together with the channel number and, for unicast, the neighbor
//! that should receive them. Whatever delivers frames to the engine reports
//! the channel number and the immediate sender alongside the bytes.
//!
//! Channel numbers come from [`ProtocolConfig`]; [`Channel`] is the logical
//! view the engine maps them to and from.

use crate::config::ProtocolConfig;
use crate::error::{AodvError, Result};
use crate::types::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical channels a node listens on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Flooded route requests
    RouteRequest,
    /// Unicast route replies
    RouteReply,
    /// Unicast data
    Data,
}

impl Channel {
    const ALL: [Channel; 3] = [Channel::RouteRequest, Channel::RouteReply, Channel::Data];

    /// Whether frames on this channel go to every neighbor
    pub fn is_broadcast(&self) -> bool {
        matches!(self, Channel::RouteRequest)
    }

    /// Channel number used for this channel under `config`
    pub fn number(&self, config: &ProtocolConfig) -> u16 {
        match self {
            Channel::RouteRequest => config.broadcast_channel,
            Channel::RouteReply => config.reply_channel,
            Channel::Data => config.data_channel,
        }
    }

    /// Logical channel for a channel number under `config`
    pub fn from_number(number: u16, config: &ProtocolConfig) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|channel| channel.number(config) == number)
            .ok_or_else(|| AodvError::UnknownChannel(number.to_string()))
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::RouteRequest => write!(f, "rreq"),
            Channel::RouteReply => write!(f, "rrep"),
            Channel::Data => write!(f, "data"),
        }
    }
}

/// Outbound side of the link layer
pub trait Link {
    /// Transmit `frame` on channel number `channel`
    ///
    /// `dest` is `None` for broadcasts and the next hop for unicast frames.
    fn send(&mut self, channel: u16, frame: &[u8], dest: Option<NodeId>) -> Result<()>;
}

impl<L: Link + ?Sized> Link for Box<L> {
    fn send(&mut self, channel: u16, frame: &[u8], dest: Option<NodeId>) -> Result<()> {
        (**self).send(channel, frame, dest)
    }
}

/// A frame handed to the link by a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    /// Transmitting node
    pub from: NodeId,
    /// Channel number
    pub channel: u16,
    pub bytes: Vec<u8>,
    /// Unicast target, `None` for broadcast
    pub dest: Option<NodeId>,
}

/// A frame delivered to a node by the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    /// Channel number the frame arrived on
    pub channel: u16,
    /// Immediate sender
    pub from: NodeId,
    pub bytes: Vec<u8>,
}

impl OutboundFrame {
    /// The frame as seen by a receiving neighbor
    pub fn received(&self) -> InboundFrame {
        InboundFrame {
            channel: self.channel,
            from: self.from,
            bytes: self.bytes.clone(),
        }
    }
}

/// Link that records every frame instead of transmitting it
///
/// Used by the simulator and in tests; [`Outbox::take`] empties the record.
#[derive(Debug, Clone)]
pub struct Outbox {
    node: NodeId,
    frames: Vec<OutboundFrame>,
}

impl Outbox {
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            frames: Vec::new(),
        }
    }

    /// Frames recorded so far
    pub fn frames(&self) -> &[OutboundFrame] {
        &self.frames
    }

    /// Remove and return every recorded frame
    pub fn take(&mut self) -> Vec<OutboundFrame> {
        std::mem::take(&mut self.frames)
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Link for Outbox {
    fn send(&mut self, channel: u16, frame: &[u8], dest: Option<NodeId>) -> Result<()> {
        self.frames.push(OutboundFrame {
            from: self.node,
            channel,
            bytes: frame.to_vec(),
            dest,
        });
        Ok(())
    }
}
