//! Protocol configuration
//!
//! All values are fixed once an engine is built. Table capacities derive from
//! them at construction time and never grow afterwards.

use crate::error::{AodvError, Result};
use crate::types::{NodeId, MAX_WIRE_VALUE};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of nodes in the network
pub const DEFAULT_NETWORK_SIZE: u8 = 8;

/// Ticks a discovery record stays valid
///
/// A record made just before a tick boundary loses one tick at once, so two
/// ticks guarantee at least one full tick interval for the reply to return.
pub const ROUTE_DISCOVERY_TIME: u16 = 2;

/// Ticks a route stays valid after its last improvement
pub const ROUTE_EXPIRATION_TIME: u16 = 90;

/// Ticks a data packet may wait for a route before being discarded
pub const MAX_QUEUEING_TIME: u16 = 5;

/// Maximum data packets waiting for a route
pub const MAX_DATA_IN_QUEUE: usize = 10;

/// Ticks between generated data packets
pub const DATA_PACKAGE_DELTA_TIME: u16 = 30;

/// Link channel carrying flooded route requests
pub const BROADCAST_CHANNEL: u16 = 26;

/// Link channel carrying unicast route replies
pub const RREP_CHANNEL: u16 = 22;

/// Link channel carrying unicast data
pub const DATA_CHANNEL: u16 = 23;

/// Configuration for one protocol engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Number of nodes; valid ids are `1..=network_size`
    pub network_size: u8,
    /// Discovery record lifetime in ticks
    pub route_discovery_time: u16,
    /// Route lifetime in ticks
    pub route_expiration_time: u16,
    /// Queued data lifetime in ticks
    pub max_queueing_time: u16,
    /// Outbound queue slots
    pub queue_capacity: usize,
    /// Period of generated traffic in ticks
    pub data_interval: u16,
    /// Channel number for route requests (broadcast)
    pub broadcast_channel: u16,
    /// Channel number for route replies (unicast)
    pub reply_channel: u16,
    /// Channel number for data (unicast)
    pub data_channel: u16,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            network_size: DEFAULT_NETWORK_SIZE,
            route_discovery_time: ROUTE_DISCOVERY_TIME,
            route_expiration_time: ROUTE_EXPIRATION_TIME,
            max_queueing_time: MAX_QUEUEING_TIME,
            queue_capacity: MAX_DATA_IN_QUEUE,
            data_interval: DATA_PACKAGE_DELTA_TIME,
            broadcast_channel: BROADCAST_CHANNEL,
            reply_channel: RREP_CHANNEL,
            data_channel: DATA_CHANNEL,
        }
    }
}

impl ProtocolConfig {
    pub fn with_network_size(mut self, size: u8) -> Self {
        self.network_size = size;
        self
    }

    pub fn with_route_discovery_time(mut self, ticks: u16) -> Self {
        self.route_discovery_time = ticks;
        self
    }

    pub fn with_route_expiration_time(mut self, ticks: u16) -> Self {
        self.route_expiration_time = ticks;
        self
    }

    pub fn with_max_queueing_time(mut self, ticks: u16) -> Self {
        self.max_queueing_time = ticks;
        self
    }

    pub fn with_queue_capacity(mut self, slots: usize) -> Self {
        self.queue_capacity = slots;
        self
    }

    pub fn with_data_interval(mut self, ticks: u16) -> Self {
        self.data_interval = ticks;
        self
    }

    /// Discovery table slots: one per (destination, source) pair
    pub fn discovery_capacity(&self) -> usize {
        self.network_size as usize * self.network_size as usize
    }

    /// Whether `id` names a node of this network
    pub fn contains(&self, id: NodeId) -> bool {
        id.get() <= self.network_size
    }

    /// Every node id of the network, in order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (1..=self.network_size).filter_map(|id| NodeId::new(id).ok())
    }

    /// Check the configuration for values the protocol cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.network_size < 2 || self.network_size > MAX_WIRE_VALUE {
            return Err(AodvError::Config(format!(
                "network_size must be in 2..={}, got {}",
                MAX_WIRE_VALUE, self.network_size
            )));
        }
        if self.route_discovery_time == 0 {
            return Err(AodvError::Config(
                "route_discovery_time must be at least one tick".into(),
            ));
        }
        if self.route_expiration_time == 0 {
            return Err(AodvError::Config(
                "route_expiration_time must be at least one tick".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(AodvError::Config("queue_capacity must be non-zero".into()));
        }
        if self.data_interval == 0 {
            return Err(AodvError::Config("data_interval must be non-zero".into()));
        }
        let channels = [self.broadcast_channel, self.reply_channel, self.data_channel];
        if channels[0] == channels[1] || channels[0] == channels[2] || channels[1] == channels[2] {
            return Err(AodvError::Config(format!(
                "channel numbers must be distinct, got {:?}",
                channels
            )));
        }
        Ok(())
    }

    /// Load and validate a JSON configuration file
    ///
    /// Missing fields fall back to their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Pretty JSON rendering of the configuration
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
