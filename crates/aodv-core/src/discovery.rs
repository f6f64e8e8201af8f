//! Discovery table
//!
//! Records every route request this node originated or relayed, so that a
//! reply can be sent back toward each neighbor that asked, and so that the
//! same flood is relayed only once. The slab holds `N * N` records, enough
//! for every (source, destination) pair to be in flight at once.

use crate::types::{NodeId, RequestId};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

/// A pending request: "answer (src, dest, req_id) toward `snd`"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiscoveryEntry {
    pub req_id: RequestId,
    /// Node that originated the request
    pub src: NodeId,
    /// Node whose route is being sought
    pub dest: NodeId,
    /// Neighbor the request arrived from, or this node if it originated here
    pub snd: NodeId,
    /// Remaining lifetime in ticks
    pub age: u16,
}

/// Fixed-capacity slab of discovery records
///
/// A slot holds a record exactly while it is live; answered and expired
/// records are removed.
#[derive(Debug, Clone)]
pub struct DiscoveryTable {
    slots: Box<[Option<DiscoveryEntry>]>,
    /// Lifetime given to new records
    lifetime: u16,
}

impl DiscoveryTable {
    pub fn new(capacity: usize, lifetime: u16) -> Self {
        Self {
            slots: vec![None; capacity].into_boxed_slice(),
            lifetime,
        }
    }

    /// Whether a live record for this exact request exists
    pub fn is_duplicate(&self, req_id: RequestId, src: NodeId, dest: NodeId) -> bool {
        self.entries()
            .any(|e| e.req_id == req_id && e.src == src && e.dest == dest)
    }

    /// Store a record in the first free slot
    ///
    /// Returns `false` when the table is full; nothing is recorded then.
    pub fn record(&mut self, req_id: RequestId, src: NodeId, dest: NodeId, snd: NodeId) -> bool {
        let Some(slot) = self.slots.iter_mut().find(|slot| slot.is_none()) else {
            return false;
        };
        *slot = Some(DiscoveryEntry {
            req_id,
            src,
            dest,
            snd,
            age: self.lifetime,
        });
        true
    }

    /// Neighbors waiting on `(req_id, dest)`; their records are removed
    ///
    /// Every matching record is answered, one per neighbor that forwarded the
    /// flood here.
    pub fn match_and_clear(&mut self, req_id: RequestId, dest: NodeId) -> Vec<NodeId> {
        let mut waiting = Vec::new();
        for slot in self.slots.iter_mut() {
            if !matches!(slot, Some(e) if e.req_id == req_id && e.dest == dest) {
                continue;
            }
            if let Some(entry) = slot.take() {
                waiting.push(entry.snd);
            }
        }
        waiting
    }

    /// Age every live record by one tick and return those that expired
    ///
    /// The age is decremented first and the record expires when it reaches
    /// zero, so a record lives exactly `lifetime` ticks.
    pub fn age_tick(&mut self) -> Vec<DiscoveryEntry> {
        let mut expired = Vec::new();
        for slot in self.slots.iter_mut() {
            let Some(entry) = slot.as_mut() else { continue };
            entry.age = entry.age.saturating_sub(1);
            if entry.age == 0 {
                info!(
                    src = %entry.src,
                    dest = %entry.dest,
                    req_id = %entry.req_id,
                    "ROUTE_REQUEST from {} to {} (ID:{}) has expired",
                    entry.src,
                    entry.dest,
                    entry.req_id
                );
                expired.push(*entry);
                *slot = None;
            }
        }
        if !expired.is_empty() {
            debug!("{}", self);
        }
        expired
    }

    /// Live records
    pub fn entries(&self) -> impl Iterator<Item = &DiscoveryEntry> {
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

impl fmt::Display for DiscoveryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "Discovery Table is empty");
        }
        write!(f, "Discovery Table")?;
        for e in self.entries() {
            write!(
                f,
                "\n    {{ID:{}; Src:{}; Dest:{}; Snd:{};}}",
                e.req_id, e.src, e.dest, e.snd
            )?;
        }
        Ok(())
    }
}
