//! Routing table
//!
//! One slot per possible destination, indexed by `id - 1`. A route is only
//! ever replaced by a strictly shorter one; ties keep the existing entry.
//! Routes age out after `route_expiration_time` maintenance ticks.

use crate::types::{NodeId, HOP_INFINITY};
use serde::Serialize;
use std::fmt;
use tracing::info;

/// A routing table slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouteEntry {
    /// Destination node
    pub dest: NodeId,
    /// Neighbor to hand packets for `dest` to
    pub next_hop: Option<NodeId>,
    /// Relays between this node and `dest`; `HOP_INFINITY` when unreachable
    pub hop_count: u8,
    /// Remaining lifetime in ticks
    pub age: u16,
    pub valid: bool,
}

impl RouteEntry {
    fn unreachable(dest: NodeId) -> Self {
        Self {
            dest,
            next_hop: None,
            hop_count: HOP_INFINITY,
            age: 0,
            valid: false,
        }
    }

    fn invalidate(&mut self) {
        self.valid = false;
        self.next_hop = None;
        self.hop_count = HOP_INFINITY;
    }
}

/// Fixed-size routing table
#[derive(Debug, Clone)]
pub struct RoutingTable {
    entries: Box<[RouteEntry]>,
    /// Lifetime given to a freshly improved route
    route_lifetime: u16,
}

impl RoutingTable {
    /// Create a table for `network_size` destinations, all unreachable
    pub fn new(network_size: u8, route_lifetime: u16) -> Self {
        let entries = (1..=network_size)
            .filter_map(|id| NodeId::new(id).ok())
            .map(RouteEntry::unreachable)
            .collect();
        Self {
            entries,
            route_lifetime,
        }
    }

    /// Next hop toward `dest`, if a valid route exists
    pub fn lookup(&self, dest: NodeId) -> Option<NodeId> {
        self.entries
            .get(dest.index())
            .filter(|entry| entry.valid)
            .and_then(|entry| entry.next_hop)
    }

    /// Install the candidate route iff it is strictly shorter than the current one
    ///
    /// Unreachable entries carry `HOP_INFINITY`, so the first candidate below
    /// that always wins. Returns whether the table changed.
    pub fn try_improve(&mut self, dest: NodeId, next_hop: NodeId, hops: u8) -> bool {
        let lifetime = self.route_lifetime;
        let Some(entry) = self.entries.get_mut(dest.index()) else {
            return false;
        };
        if hops >= entry.hop_count {
            return false;
        }
        *entry = RouteEntry {
            dest,
            next_hop: Some(next_hop),
            hop_count: hops,
            age: lifetime,
            valid: true,
        };
        true
    }

    /// Age every valid route by one tick and return the destinations that expired
    pub fn age_tick(&mut self) -> Vec<NodeId> {
        let mut expired = Vec::new();
        for entry in self.entries.iter_mut() {
            if entry.valid && entry.age > 0 {
                entry.age -= 1;
                if entry.age == 0 {
                    entry.invalidate();
                    info!(dest = %entry.dest, "route to {} has expired", entry.dest);
                    expired.push(entry.dest);
                }
            }
        }
        expired
    }

    /// Slot for `dest`, valid or not
    pub fn entry(&self, dest: NodeId) -> Option<&RouteEntry> {
        self.entries.get(dest.index())
    }

    /// All valid routes
    pub fn routes(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.iter().filter(|entry| entry.valid)
    }

    /// Number of valid routes
    pub fn len(&self) -> usize {
        self.routes().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of destinations the table can hold
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Forget every route
    pub fn clear(&mut self) {
        for entry in self.entries.iter_mut() {
            *entry = RouteEntry::unreachable(entry.dest);
        }
    }
}

impl fmt::Display for RoutingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "Routing Table is empty");
        }
        write!(f, "Routing Table")?;
        for entry in self.routes() {
            let next = entry.next_hop.map(|n| n.get()).unwrap_or(0);
            write!(
                f,
                "\n   {{Dest:{}; Next:{}; Hops:{}; Age:{}}}",
                entry.dest, next, entry.hop_count, entry.age
            )?;
        }
        Ok(())
    }
}
