//! Protocol engine
//!
//! One engine runs per node. It owns the three tables and is the only
//! component that encodes, decodes and hands frames to the link. Everything
//! that happens to a node arrives as an [`Event`] and runs to completion
//! before the next one is looked at.
//!
//! ## Flow
//!
//! ```text
//! send(dest) ── route? ──yes──> DATA to next hop
//!                  │
//!                  no ──> queue + RREQ broadcast
//!
//! RREQ ──> dest is me?  ──> RREP(hops 0) back to sender
//!      ──> seen before? ──> drop
//!      ──> record sender, re-broadcast
//!
//! RREP ──> shorter route? ──no──> drop
//!              │
//!              yes ──> src is me? ──no──> RREP(hops+1) to every waiting sender
//!                       │
//!                       └──> flush routable queued data
//! ```

use crate::config::ProtocolConfig;
use crate::discovery::{DiscoveryEntry, DiscoveryTable};
use crate::error::{AodvError, Result};
use crate::packet::{DataPacket, RouteReply, RouteRequest};
use crate::queue::{OutboundQueue, QueueEntry};
use crate::routing::{RouteEntry, RoutingTable};
use crate::traits::{Channel, InboundFrame, Link};
use crate::types::{NodeId, RequestId};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Something that happened to a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Local data to deliver to `packet.dest`
    SendData(DataPacket),
    /// Route request received from neighbor `from`
    RouteRequest { from: NodeId, packet: RouteRequest },
    /// Route reply received from neighbor `from`
    RouteReply { from: NodeId, packet: RouteReply },
    /// Data received from neighbor `from`
    Data { from: NodeId, packet: DataPacket },
    /// Periodic maintenance
    Tick,
}

/// What happened to a packet handed to [`ProtocolEngine::send_data`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Transmitted toward `next_hop`
    Sent { next_hop: NodeId },
    /// Parked until a route is found; a discovery was started
    Queued,
    /// No route and no queue slot; a discovery was still started
    QueueFull,
    /// Addressed to this node
    Delivered,
}

/// Per-node protocol counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub requests_originated: u64,
    pub requests_forwarded: u64,
    pub duplicates_dropped: u64,
    pub replies_sent: u64,
    pub replies_forwarded: u64,
    pub replies_rejected: u64,
    pub data_sent: u64,
    pub data_delivered: u64,
    pub data_relayed: u64,
    pub data_queued: u64,
    pub queue_full_drops: u64,
    pub data_timeouts: u64,
    pub routes_expired: u64,
    pub discoveries_expired: u64,
    pub discovery_full_drops: u64,
    pub malformed_packets: u64,
    pub link_errors: u64,
}

/// Routing protocol state machine for one node
#[derive(Debug)]
pub struct ProtocolEngine<L: Link> {
    id: NodeId,
    config: ProtocolConfig,
    routes: RoutingTable,
    discovery: DiscoveryTable,
    queue: OutboundQueue,
    next_req_id: RequestId,
    stats: EngineStats,
    link: L,
}

impl<L: Link> ProtocolEngine<L> {
    /// Create an engine for node `id`
    ///
    /// The configuration is validated and fixed for the engine's lifetime.
    pub fn new(id: NodeId, config: ProtocolConfig, link: L) -> Result<Self> {
        config.validate()?;
        if !config.contains(id) {
            return Err(AodvError::NodeOutOfRange {
                id: id.get(),
                network_size: config.network_size,
            });
        }
        Ok(Self {
            id,
            routes: RoutingTable::new(config.network_size, config.route_expiration_time),
            discovery: DiscoveryTable::new(config.discovery_capacity(), config.route_discovery_time),
            queue: OutboundQueue::new(config.queue_capacity, config.max_queueing_time),
            next_req_id: RequestId::FIRST,
            stats: EngineStats::default(),
            config,
            link,
        })
    }

    /// Decode a frame received on `frame.channel` and process it
    ///
    /// Frames that fail to decode, or that name nodes outside the network,
    /// are logged and dropped. Returns data delivered to this node.
    pub fn on_frame(&mut self, frame: &InboundFrame) -> Vec<DataPacket> {
        match self.decode_frame(frame) {
            Ok(event) => self.handle(event),
            Err(e) => {
                self.stats.malformed_packets += 1;
                warn!(
                    node = %self.id,
                    channel = %frame.channel,
                    from = %frame.from,
                    "dropping packet: {}",
                    e
                );
                Vec::new()
            }
        }
    }

    fn decode_frame(&self, frame: &InboundFrame) -> Result<Event> {
        let from = frame.from;
        self.check_node(from)?;
        let event = match Channel::from_number(frame.channel, &self.config)? {
            Channel::RouteRequest => {
                let packet = RouteRequest::decode(&frame.bytes)?;
                self.check_node(packet.src)?;
                self.check_node(packet.dest)?;
                Event::RouteRequest { from, packet }
            }
            Channel::RouteReply => {
                let packet = RouteReply::decode(&frame.bytes)?;
                self.check_node(packet.src)?;
                self.check_node(packet.dest)?;
                Event::RouteReply { from, packet }
            }
            Channel::Data => {
                let packet = DataPacket::decode(&frame.bytes)?;
                self.check_node(packet.dest)?;
                Event::Data { from, packet }
            }
        };
        Ok(event)
    }

    fn check_node(&self, id: NodeId) -> Result<()> {
        if self.config.contains(id) {
            Ok(())
        } else {
            Err(AodvError::NodeOutOfRange {
                id: id.get(),
                network_size: self.config.network_size,
            })
        }
    }

    /// Process one event; returns data delivered to this node
    pub fn handle(&mut self, event: Event) -> Vec<DataPacket> {
        match event {
            Event::SendData(packet) => {
                if let Err(e) = self.send_data(packet) {
                    warn!(node = %self.id, "cannot send {}: {}", packet, e);
                }
                Vec::new()
            }
            Event::RouteRequest { from, packet } => {
                self.on_route_request(from, packet);
                Vec::new()
            }
            Event::RouteReply { from, packet } => {
                self.on_route_reply(from, packet);
                Vec::new()
            }
            Event::Data { from, packet } => self.on_data(from, packet),
            Event::Tick => {
                self.tick();
                Vec::new()
            }
        }
    }

    /// Send local data, starting a discovery if no route is known
    pub fn send_data(&mut self, packet: DataPacket) -> Result<SendOutcome> {
        self.check_node(packet.dest)?;
        if packet.dest == self.id {
            debug!(node = %self.id, "data for self delivered locally: {}", packet);
            self.stats.data_delivered += 1;
            return Ok(SendOutcome::Delivered);
        }
        Ok(self.route_data(packet))
    }

    fn route_data(&mut self, packet: DataPacket) -> SendOutcome {
        if let Some(next_hop) = self.routes.lookup(packet.dest) {
            transmit_data(
                &mut self.link,
                &mut self.stats,
                &self.config,
                self.id,
                &packet,
                next_hop,
            );
            return SendOutcome::Sent { next_hop };
        }

        let queued = self.queue.enqueue(packet);
        if queued {
            self.stats.data_queued += 1;
            debug!(node = %self.id, dest = %packet.dest, "no route, data queued");
        } else {
            self.stats.queue_full_drops += 1;
            warn!(node = %self.id, dest = %packet.dest, "outbound queue full, dropping {}", packet);
        }
        self.originate_request(packet.dest);

        if queued {
            SendOutcome::Queued
        } else {
            SendOutcome::QueueFull
        }
    }

    fn originate_request(&mut self, dest: NodeId) {
        let req_id = self.next_req_id;
        self.next_req_id = req_id.next();

        let request = RouteRequest::new(req_id, self.id, dest);
        if !self.discovery.record(req_id, self.id, dest, self.id) {
            self.stats.discovery_full_drops += 1;
            warn!(node = %self.id, "discovery table full, request {} not recorded", request);
        }
        info!(
            node = %self.id,
            dest = %dest,
            req_id = %req_id,
            "broadcasting ROUTE_REQUEST {}",
            request
        );
        if self.broadcast_request(&request) {
            self.stats.requests_originated += 1;
        }
    }

    fn on_route_request(&mut self, from: NodeId, request: RouteRequest) {
        debug!(node = %self.id, from = %from, "ROUTE_REQUEST received {}", request);

        if request.src == self.id {
            self.stats.duplicates_dropped += 1;
            debug!(node = %self.id, "own ROUTE_REQUEST echoed back, discarded");
            return;
        }

        if request.dest == self.id {
            let reply = RouteReply::answer(&request);
            info!(
                node = %self.id,
                src = %request.src,
                next_hop = %from,
                "answering ROUTE_REQUEST {}",
                request
            );
            if self.send_reply(&reply, from) {
                self.stats.replies_sent += 1;
            }
            return;
        }

        if self
            .discovery
            .is_duplicate(request.req_id, request.src, request.dest)
        {
            self.stats.duplicates_dropped += 1;
            debug!(node = %self.id, "duplicated ROUTE_REQUEST {} discarded", request);
            return;
        }

        if !self
            .discovery
            .record(request.req_id, request.src, request.dest, from)
        {
            self.stats.discovery_full_drops += 1;
            warn!(node = %self.id, "discovery table full, not relaying {}", request);
            return;
        }

        debug!(node = %self.id, "{}", self.discovery);
        if self.broadcast_request(&request) {
            self.stats.requests_forwarded += 1;
        }
    }

    fn on_route_reply(&mut self, from: NodeId, reply: RouteReply) {
        debug!(node = %self.id, from = %from, "ROUTE_REPLY received {}", reply);

        if !self.routes.try_improve(reply.dest, from, reply.hops) {
            self.stats.replies_rejected += 1;
            debug!(node = %self.id, dest = %reply.dest, "better route already present");
            return;
        }
        info!(
            node = %self.id,
            dest = %reply.dest,
            next_hop = %from,
            hops = reply.hops,
            "improved route to {}: {} hops via {}",
            reply.dest,
            reply.hops,
            from
        );
        debug!(node = %self.id, "{}", self.routes);

        let waiting = self.discovery.match_and_clear(reply.req_id, reply.dest);

        let me = self.id;
        if reply.src != me {
            match reply.forwarded() {
                Ok(forwarded) => {
                    for snd in waiting.into_iter().filter(|&snd| snd != me) {
                        debug!(node = %self.id, next_hop = %snd, "forwarding ROUTE_REPLY {}", forwarded);
                        if self.send_reply(&forwarded, snd) {
                            self.stats.replies_forwarded += 1;
                        }
                    }
                }
                Err(e) => warn!(node = %self.id, "cannot forward {}: {}", reply, e),
            }
        }

        // Queued data for the new destination leaves now instead of at the
        // next tick
        let Self {
            queue,
            routes,
            link,
            stats,
            config,
            id,
            ..
        } = self;
        let sent = queue.flush_routable(routes, |packet, next| {
            transmit_data(link, stats, config, *id, packet, next);
        });
        if !sent.is_empty() {
            debug!(node = %self.id, "flushed {} queued packets", sent.len());
        }
    }

    fn on_data(&mut self, from: NodeId, packet: DataPacket) -> Vec<DataPacket> {
        if packet.dest == self.id {
            self.stats.data_delivered += 1;
            info!(node = %self.id, from = %from, "DATA RECEIVED: {{{}}}", packet.payload);
            return vec![packet];
        }
        debug!(node = %self.id, from = %from, dest = %packet.dest, "relaying DATA");
        self.stats.data_relayed += 1;
        self.route_data(packet);
        Vec::new()
    }

    /// Maintenance pass: age routes, age discovery records, drain the queue
    pub fn tick(&mut self) {
        let expired = self.routes.age_tick();
        if !expired.is_empty() {
            self.stats.routes_expired += expired.len() as u64;
            debug!(node = %self.id, "{}", self.routes);
        }

        let expired = self.discovery.age_tick();
        self.stats.discoveries_expired += expired.len() as u64;

        let Self {
            queue,
            routes,
            link,
            stats,
            config,
            id,
            ..
        } = self;
        let report = queue.drain_tick(routes, |packet, next| {
            transmit_data(link, stats, config, *id, packet, next);
        });
        for packet in &report.expired {
            self.stats.data_timeouts += 1;
            warn!(
                node = %self.id,
                dest = %packet.dest,
                "DATA to {} was discarded (no route found)",
                packet.dest
            );
        }
        if !report.is_empty() {
            debug!(node = %self.id, "{}", self.queue);
        }
    }

    fn broadcast_request(&mut self, request: &RouteRequest) -> bool {
        match request.encode() {
            Ok(frame) => transmit(
                &mut self.link,
                &mut self.stats,
                &self.config,
                self.id,
                Channel::RouteRequest,
                &frame,
                None,
            ),
            Err(e) => {
                warn!(node = %self.id, "cannot encode {}: {}", request, e);
                false
            }
        }
    }

    fn send_reply(&mut self, reply: &RouteReply, next_hop: NodeId) -> bool {
        match reply.encode() {
            Ok(frame) => transmit(
                &mut self.link,
                &mut self.stats,
                &self.config,
                self.id,
                Channel::RouteReply,
                &frame,
                Some(next_hop),
            ),
            Err(e) => {
                warn!(node = %self.id, "cannot encode {}: {}", reply, e);
                false
            }
        }
    }

    /// This node's identifier
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Next hop toward `dest`, if a valid route is known
    pub fn next_hop(&self, dest: NodeId) -> Option<NodeId> {
        self.routes.lookup(dest)
    }

    /// Request id the next originated discovery will use
    pub fn next_request_id(&self) -> RequestId {
        self.next_req_id
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.routes
    }

    pub fn discovery_table(&self) -> &DiscoveryTable {
        &self.discovery
    }

    pub fn queue(&self) -> &OutboundQueue {
        &self.queue
    }

    /// Valid routes
    pub fn routes(&self) -> Vec<RouteEntry> {
        self.routes.routes().copied().collect()
    }

    /// Live discovery records
    pub fn discoveries(&self) -> Vec<DiscoveryEntry> {
        self.discovery.entries().copied().collect()
    }

    /// Packets waiting for a route
    pub fn queued(&self) -> Vec<QueueEntry> {
        self.queue.entries().copied().collect()
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }
}

fn transmit_data<L: Link>(
    link: &mut L,
    stats: &mut EngineStats,
    config: &ProtocolConfig,
    node: NodeId,
    packet: &DataPacket,
    next_hop: NodeId,
) {
    let frame = match packet.encode() {
        Ok(frame) => frame,
        Err(e) => {
            warn!(node = %node, "cannot encode {}: {}", packet, e);
            return;
        }
    };
    if transmit(link, stats, config, node, Channel::Data, &frame, Some(next_hop)) {
        stats.data_sent += 1;
        info!(
            node = %node,
            dest = %packet.dest,
            next_hop = %next_hop,
            "sending DATA {{{}}} to {} via {}",
            packet.payload,
            packet.dest,
            next_hop
        );
    }
}

fn transmit<L: Link>(
    link: &mut L,
    stats: &mut EngineStats,
    config: &ProtocolConfig,
    node: NodeId,
    channel: Channel,
    frame: &[u8],
    dest: Option<NodeId>,
) -> bool {
    debug_assert_eq!(channel.is_broadcast(), dest.is_none());
    match link.send(channel.number(config), frame, dest) {
        Ok(()) => true,
        Err(e) => {
            stats.link_errors += 1;
            warn!(node = %node, channel = %channel, "link send failed: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BROADCAST_CHANNEL, DATA_CHANNEL, RREP_CHANNEL};
    use crate::packet::Payload;
    use crate::traits::{OutboundFrame, Outbox};

    fn node(id: u8) -> NodeId {
        NodeId::new(id).unwrap()
    }

    fn req(id: u8) -> RequestId {
        RequestId::new(id).unwrap()
    }

    fn engine(id: u8) -> ProtocolEngine<Outbox> {
        ProtocolEngine::new(node(id), ProtocolConfig::default(), Outbox::new(node(id))).unwrap()
    }

    fn data(dest: u8) -> DataPacket {
        DataPacket::new(node(dest), Payload::new("*** 42 ***").unwrap())
    }

    fn sent(engine: &mut ProtocolEngine<Outbox>) -> Vec<OutboundFrame> {
        engine.link_mut().take()
    }

    #[test]
    fn test_new_rejects_node_outside_network() {
        let result = ProtocolEngine::new(node(9), ProtocolConfig::default(), Outbox::new(node(9)));
        assert!(matches!(result, Err(AodvError::NodeOutOfRange { id: 9, network_size: 8 })));
    }

    #[test]
    fn test_send_without_route_queues_and_floods() {
        let mut engine = engine(3);
        assert_eq!(engine.send_data(data(5)).unwrap(), SendOutcome::Queued);

        let frames = sent(&mut engine);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].channel, BROADCAST_CHANNEL);
        assert_eq!(frames[0].dest, None);
        assert_eq!(
            RouteRequest::decode(&frames[0].bytes).unwrap(),
            RouteRequest::new(req(1), node(3), node(5))
        );
        assert_eq!(engine.queued().len(), 1);
        assert_eq!(engine.discoveries()[0].snd, node(3));
        assert_eq!(engine.next_request_id(), req(2));
    }

    #[test]
    fn test_request_ids_wrap() {
        let mut engine = engine(1);
        for _ in 0..99 {
            engine.handle(Event::SendData(data(2)));
            engine.discovery.clear();
            engine.queue.clear();
        }
        assert_eq!(engine.next_request_id(), req(1));
    }

    #[test]
    fn test_destination_answers_with_zero_hops() {
        let mut engine = engine(5);
        engine.handle(Event::RouteRequest {
            from: node(2),
            packet: RouteRequest::new(req(1), node(3), node(5)),
        });

        let frames = sent(&mut engine);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].channel, RREP_CHANNEL);
        assert_eq!(frames[0].dest, Some(node(2)));
        let reply = RouteReply::decode(&frames[0].bytes).unwrap();
        assert_eq!(reply.hops, 0);
        assert_eq!(reply.src, node(3));
        assert!(engine.discoveries().is_empty());
    }

    #[test]
    fn test_duplicate_request_not_rebroadcast() {
        let mut engine = engine(4);
        let request = RouteRequest::new(req(7), node(1), node(8));
        engine.handle(Event::RouteRequest { from: node(2), packet: request });
        engine.handle(Event::RouteRequest { from: node(3), packet: request });

        let frames = sent(&mut engine);
        assert_eq!(frames.len(), 1);
        assert_eq!(RouteRequest::decode(&frames[0].bytes).unwrap(), request);
        assert_eq!(engine.discoveries().len(), 1);
        assert_eq!(engine.stats().duplicates_dropped, 1);
    }

    #[test]
    fn test_own_request_echo_discarded() {
        let mut engine = engine(1);
        engine.send_data(data(6)).unwrap();
        sent(&mut engine);
        engine.tick();
        engine.tick();
        assert!(engine.discoveries().is_empty());

        engine.handle(Event::RouteRequest {
            from: node(2),
            packet: RouteRequest::new(req(1), node(1), node(6)),
        });
        assert!(sent(&mut engine).is_empty());
    }

    #[test]
    fn test_reply_forwarded_to_every_waiting_neighbor() {
        let mut engine = engine(4);
        let request = RouteRequest::new(req(7), node(1), node(8));
        engine.discovery.record(request.req_id, request.src, request.dest, node(2));
        engine.discovery.record(request.req_id, request.src, request.dest, node(3));

        engine.handle(Event::RouteReply {
            from: node(6),
            packet: RouteReply { req_id: req(7), dest: node(8), src: node(1), hops: 2 },
        });

        let frames = sent(&mut engine);
        let targets: Vec<_> = frames.iter().map(|f| f.dest).collect();
        assert_eq!(targets, vec![Some(node(2)), Some(node(3))]);
        for frame in &frames {
            assert_eq!(RouteReply::decode(&frame.bytes).unwrap().hops, 3);
        }
        assert_eq!(engine.next_hop(node(8)), Some(node(6)));
        assert!(engine.discoveries().is_empty());
    }

    #[test]
    fn test_reply_for_foreign_origin_flushes_own_queue() {
        // Node 2 and node 1 both used request id 1 toward node 5
        let mut engine = engine(2);
        engine.send_data(data(5)).unwrap();
        engine.handle(Event::RouteRequest {
            from: node(6),
            packet: RouteRequest::new(req(1), node(1), node(5)),
        });
        sent(&mut engine);

        engine.handle(Event::RouteReply {
            from: node(6),
            packet: RouteReply { req_id: req(1), dest: node(5), src: node(1), hops: 1 },
        });

        let frames = sent(&mut engine);
        let targets: Vec<_> = frames.iter().map(|f| (f.channel, f.dest)).collect();
        assert_eq!(
            targets,
            vec![
                (RREP_CHANNEL, Some(node(6))),
                (DATA_CHANNEL, Some(node(6))),
            ]
        );
        assert!(engine.queued().is_empty());
        assert!(engine.discoveries().is_empty());
    }

    #[test]
    fn test_worse_reply_rejected() {
        let mut engine = engine(4);
        engine.routes.try_improve(node(8), node(6), 1);
        engine.discovery.record(req(7), node(1), node(8), node(2));

        engine.handle(Event::RouteReply {
            from: node(5),
            packet: RouteReply { req_id: req(7), dest: node(8), src: node(1), hops: 3 },
        });
        assert!(sent(&mut engine).is_empty());
        assert_eq!(engine.next_hop(node(8)), Some(node(6)));
        assert_eq!(engine.stats().replies_rejected, 1);
        assert_eq!(engine.discoveries().len(), 1);
    }

    #[test]
    fn test_origin_flushes_queue_on_reply() {
        let mut engine = engine(3);
        engine.send_data(data(5)).unwrap();
        sent(&mut engine);

        engine.handle(Event::RouteReply {
            from: node(2),
            packet: RouteReply { req_id: req(1), dest: node(5), src: node(3), hops: 1 },
        });

        let frames = sent(&mut engine);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].channel, DATA_CHANNEL);
        assert_eq!(frames[0].dest, Some(node(2)));
        assert_eq!(DataPacket::decode(&frames[0].bytes).unwrap(), data(5));
        assert!(engine.queued().is_empty());
        assert!(engine.discoveries().is_empty());
    }

    #[test]
    fn test_data_delivered_or_relayed() {
        let mut engine = engine(2);
        let delivered = engine.handle(Event::Data { from: node(1), packet: data(2) });
        assert_eq!(delivered, vec![data(2)]);

        engine.routes.try_improve(node(5), node(3), 1);
        let delivered = engine.handle(Event::Data { from: node(1), packet: data(5) });
        assert!(delivered.is_empty());
        let frames = sent(&mut engine);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].dest, Some(node(3)));
        assert_eq!(engine.stats().data_relayed, 1);
    }

    #[test]
    fn test_malformed_frames_dropped() {
        let mut engine = engine(2);
        let frames = [
            InboundFrame { channel: DATA_CHANNEL, from: node(1), bytes: b"HELLO".to_vec() },
            InboundFrame {
                channel: BROADCAST_CHANNEL,
                from: node(1),
                bytes: b"ROUTE_REQUEST;REQ_ID: 1;DEST:12;SRC: 3;".to_vec(),
            },
            InboundFrame {
                channel: RREP_CHANNEL,
                from: node(1),
                bytes: b"ROUTE_REPLY;REQ_ID: 1;".to_vec(),
            },
        ];
        for frame in &frames {
            assert!(engine.on_frame(frame).is_empty());
        }
        assert_eq!(engine.stats().malformed_packets, 3);
        assert!(sent(&mut engine).is_empty());
    }

    #[test]
    fn test_frames_use_configured_channel_numbers() {
        let mut config = ProtocolConfig::default();
        config.broadcast_channel = 11;
        config.reply_channel = 12;
        config.data_channel = 13;
        let mut origin = ProtocolEngine::new(node(1), config.clone(), Outbox::new(node(1))).unwrap();
        let mut dest = ProtocolEngine::new(node(2), config, Outbox::new(node(2))).unwrap();

        origin.send_data(data(2)).unwrap();
        let request = sent(&mut origin);
        assert_eq!(request[0].channel, 11);

        dest.on_frame(&request[0].received());
        let reply = sent(&mut dest);
        assert_eq!(reply[0].channel, 12);

        origin.on_frame(&reply[0].received());
        let frames = sent(&mut origin);
        assert_eq!(frames[0].channel, 13);
        assert_eq!(dest.on_frame(&frames[0].received()), vec![data(2)]);
    }

    #[test]
    fn test_frame_on_unknown_channel_dropped() {
        let mut engine = engine(2);
        let request = RouteRequest::new(req(1), node(1), node(5)).encode().unwrap().to_vec();
        let frame = InboundFrame { channel: RREP_CHANNEL + 40, from: node(1), bytes: request };
        assert!(engine.on_frame(&frame).is_empty());
        assert_eq!(engine.stats().malformed_packets, 1);
        assert!(engine.discoveries().is_empty());
        assert!(sent(&mut engine).is_empty());
    }

    #[test]
    fn test_full_discovery_table_stops_relay() {
        let config = ProtocolConfig::default().with_network_size(3);
        let mut engine = ProtocolEngine::new(node(2), config, Outbox::new(node(2))).unwrap();
        for id in 1..=9 {
            assert!(engine.discovery.record(req(id), node(1), node(3), node(1)));
        }

        let bytes = RouteRequest::new(req(10), node(1), node(3)).encode().unwrap().to_vec();
        let frame = InboundFrame { channel: BROADCAST_CHANNEL, from: node(1), bytes };
        assert!(engine.on_frame(&frame).is_empty());

        assert!(sent(&mut engine).is_empty());
        assert_eq!(engine.stats().discovery_full_drops, 1);
        assert_eq!(engine.stats().requests_forwarded, 0);
        assert_eq!(engine.discoveries().len(), 9);
    }

    #[test]
    fn test_queue_full_still_originates() {
        let config = ProtocolConfig::default().with_queue_capacity(1);
        let mut engine = ProtocolEngine::new(node(1), config, Outbox::new(node(1))).unwrap();
        assert_eq!(engine.send_data(data(4)).unwrap(), SendOutcome::Queued);
        assert_eq!(engine.send_data(data(5)).unwrap(), SendOutcome::QueueFull);
        assert_eq!(sent(&mut engine).len(), 2);
        assert_eq!(engine.stats().queue_full_drops, 1);
    }

    #[test]
    fn test_send_outside_network_rejected() {
        let mut engine = engine(1);
        assert!(engine.send_data(data(12)).is_err());
        assert!(sent(&mut engine).is_empty());
    }
}
