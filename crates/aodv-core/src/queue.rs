//! Outbound queue
//!
//! Data packets whose destination has no route yet wait here for a bounded
//! number of maintenance ticks. Each tick either hands a packet to the link
//! (once a route exists) or ages it; a packet whose age drops below zero is
//! discarded.

use crate::packet::DataPacket;
use crate::routing::RoutingTable;
use crate::types::NodeId;
use serde::Serialize;
use std::fmt;

/// A queued data packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    pub packet: DataPacket,
    /// Remaining ticks; the packet is discarded once this goes negative
    pub age: i32,
}

/// Result of one pass over the queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Packets handed to the sender, with the next hop used
    pub sent: Vec<(DataPacket, NodeId)>,
    /// Packets discarded because no route appeared in time
    pub expired: Vec<DataPacket>,
}

impl DrainReport {
    pub fn is_empty(&self) -> bool {
        self.sent.is_empty() && self.expired.is_empty()
    }
}

/// Fixed-capacity queue of packets awaiting a route
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    slots: Box<[Option<QueueEntry>]>,
    /// Lifetime given to new entries
    max_age: i32,
}

impl OutboundQueue {
    pub fn new(capacity: usize, max_queueing_time: u16) -> Self {
        Self {
            slots: vec![None; capacity].into_boxed_slice(),
            max_age: max_queueing_time as i32,
        }
    }

    /// Park `packet` in the first free slot; `false` if the queue is full
    pub fn enqueue(&mut self, packet: DataPacket) -> bool {
        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(QueueEntry {
                    packet,
                    age: self.max_age,
                });
                true
            }
            None => false,
        }
    }

    /// Maintenance pass: send routable packets, age and expire the rest
    pub fn drain_tick<F>(&mut self, routes: &RoutingTable, mut send: F) -> DrainReport
    where
        F: FnMut(&DataPacket, NodeId),
    {
        let mut report = DrainReport::default();
        for slot in self.slots.iter_mut() {
            let Some(entry) = slot else { continue };
            if let Some(next) = routes.lookup(entry.packet.dest) {
                send(&entry.packet, next);
                report.sent.push((entry.packet, next));
                *slot = None;
            } else {
                entry.age -= 1;
                if entry.age < 0 {
                    report.expired.push(entry.packet);
                    *slot = None;
                }
            }
        }
        report
    }

    /// Send every packet that has a route, without aging the others
    ///
    /// Used when a discovery completes so queued data leaves immediately
    /// instead of waiting for the next tick.
    pub fn flush_routable<F>(&mut self, routes: &RoutingTable, mut send: F) -> Vec<(DataPacket, NodeId)>
    where
        F: FnMut(&DataPacket, NodeId),
    {
        let mut sent = Vec::new();
        for slot in self.slots.iter_mut() {
            let Some(entry) = slot else { continue };
            if let Some(next) = routes.lookup(entry.packet.dest) {
                send(&entry.packet, next);
                sent.push((entry.packet, next));
                *slot = None;
            }
        }
        sent
    }

    /// Queued packets in slot order
    pub fn entries(&self) -> impl Iterator<Item = &QueueEntry> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.entries().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }
}

impl fmt::Display for OutboundQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "Data Waiting Table is empty");
        }
        write!(f, "Data Waiting Table")?;
        for entry in self.entries() {
            write!(f, "\n    {{Dest:{}; Age:{};}}", entry.packet.dest, entry.age)?;
        }
        Ok(())
    }
}
