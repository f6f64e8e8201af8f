//! # AODV Core
//!
//! On-demand distance-vector routing for multi-hop wireless mesh nodes.
//!
//! ## Overview
//!
//! Nodes discover routes lazily, only when they have data to send. Each node
//! keeps a small routing table of next hops; intermediate nodes cache the
//! routes they learn from passing replies and reuse them for their own
//! traffic. This crate implements:
//!
//! - **Packet codec**: fixed-width text frames for DATA, ROUTE_REQUEST and
//!   ROUTE_REPLY
//! - **Tables**: routing table, discovery table, outbound queue
//! - **Protocol engine**: request flooding with duplicate suppression, reply
//!   propagation along the reverse path, queue draining and aging
//! - **Simulation**: a deterministic multi-node simulator over a topology
//! - **Runtime**: tokio tasks running live nodes over an in-process air hub
//!
//! ## Discovery Flow
//!
//! ```text
//! origin ──RREQ──> relay ──RREQ──> destination
//!        <──RREP── relay <──RREP── (hops 0)
//!        ──DATA──> relay ──DATA──> destination
//! ```
//!
//! ## Example
//!
//! ```rust
//! use aodv_core::config::BROADCAST_CHANNEL;
//! use aodv_core::prelude::*;
//!
//! let me = NodeId::new(3).unwrap();
//! let mut engine = ProtocolEngine::new(me, ProtocolConfig::default(), Outbox::new(me)).unwrap();
//!
//! let packet = DataPacket::new(NodeId::new(5).unwrap(), Payload::new("hello").unwrap());
//! assert_eq!(engine.send_data(packet).unwrap(), SendOutcome::Queued);
//!
//! // No route yet: the engine flooded a route request
//! let frames = engine.link_mut().take();
//! assert_eq!(frames[0].channel, BROADCAST_CHANNEL);
//! ```

pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod packet;
pub mod queue;
pub mod routing;
pub mod runtime;
pub mod simulation;
pub mod topology;
pub mod traffic;
pub mod traits;
pub mod types;
pub mod wire;

// Re-export main types
pub use config::ProtocolConfig;
pub use discovery::{DiscoveryEntry, DiscoveryTable};
pub use engine::{EngineStats, Event, ProtocolEngine, SendOutcome};
pub use error::{AodvError, Result};
pub use packet::{DataPacket, Packet, PacketKind, Payload, RouteReply, RouteRequest};
pub use queue::{OutboundQueue, QueueEntry};
pub use routing::{RouteEntry, RoutingTable};
pub use simulation::{MeshSimulator, SimConfig};
pub use topology::{Topology, TopologyKind};
pub use traits::{Channel, InboundFrame, Link, OutboundFrame, Outbox};
pub use types::{NodeId, RequestId, HOP_INFINITY};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::ProtocolConfig;
    pub use crate::engine::{Event, ProtocolEngine, SendOutcome};
    pub use crate::error::{AodvError, Result};
    pub use crate::packet::{DataPacket, Packet, Payload, RouteReply, RouteRequest};
    pub use crate::traits::{Channel, InboundFrame, Link, Outbox};
    pub use crate::types::{NodeId, RequestId};
}
