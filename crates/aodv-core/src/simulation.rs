//! Multi-Node Mesh Simulation
//!
//! Runs a whole network of protocol engines in one thread without any real
//! link. It models:
//!
//! - Multiple nodes over a [`Topology`] (who hears whom)
//! - One hop of air time per simulation step
//! - Periodic maintenance ticks every [`SimConfig::steps_per_tick`] steps
//! - Optional generated traffic and random frame loss
//! - Message delivery statistics
//!
//! Everything is driven by a seeded RNG, so a run is reproducible.
//!
//! ## Example
//!
//! ```rust,no_run
//! use aodv_core::simulation::{MeshSimulator, SimConfig};
//! use aodv_core::topology::TopologyKind;
//!
//! let config = SimConfig::default()
//!     .with_network_size(6)
//!     .with_topology(TopologyKind::Line);
//! let mut sim = MeshSimulator::new(config).unwrap();
//!
//! sim.send_text(1, 6, "hello").unwrap();
//! sim.run(50);
//!
//! println!("Delivery rate: {:.1}%", sim.stats().delivery_rate() * 100.0);
//! ```

use crate::config::ProtocolConfig;
use crate::engine::{EngineStats, ProtocolEngine, SendOutcome};
use crate::error::{AodvError, Result};
use crate::packet::{DataPacket, Payload};
use crate::topology::{Topology, TopologyKind};
use crate::traffic;
use crate::traits::{OutboundFrame, Outbox};
use crate::types::NodeId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

/// Simulation configuration
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Protocol configuration shared by every node
    pub protocol: ProtocolConfig,
    /// Topology shape
    pub topology: TopologyKind,
    /// Random seed for topology, traffic and loss
    pub seed: u64,
    /// Simulation steps per maintenance tick; derived from the network size
    /// when unset
    pub steps_per_tick: Option<u64>,
    /// Whether nodes generate periodic traffic
    pub traffic: bool,
    /// Probability that a single frame delivery is lost
    pub loss_rate: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolConfig::default(),
            topology: TopologyKind::Line,
            seed: 42,
            steps_per_tick: None,
            traffic: false,
            loss_rate: 0.0,
        }
    }
}

impl SimConfig {
    pub fn with_protocol(mut self, protocol: ProtocolConfig) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_network_size(mut self, size: u8) -> Self {
        self.protocol.network_size = size;
        self
    }

    pub fn with_topology(mut self, topology: TopologyKind) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_steps_per_tick(mut self, steps: u64) -> Self {
        self.steps_per_tick = Some(steps);
        self
    }

    /// Steps between maintenance ticks
    ///
    /// Unless set explicitly this is `max(10, 2 * network_size)`. A discovery
    /// round trip takes at most `2 * (network_size - 1)` steps, so it always
    /// fits inside one tick interval.
    pub fn steps_per_tick(&self) -> u64 {
        self.steps_per_tick
            .unwrap_or_else(|| (2 * self.protocol.network_size as u64).max(10))
    }

    pub fn with_traffic(mut self, traffic: bool) -> Self {
        self.traffic = traffic;
        self
    }

    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate;
        self
    }

    fn validate(&self) -> Result<()> {
        self.protocol.validate()?;
        if self.steps_per_tick == Some(0) {
            return Err(AodvError::Config("steps_per_tick must be non-zero".into()));
        }
        if !(0.0..=1.0).contains(&self.loss_rate) {
            return Err(AodvError::Config(format!(
                "loss_rate must be in 0..=1, got {}",
                self.loss_rate
            )));
        }
        Ok(())
    }
}

/// Simulation statistics
#[derive(Debug, Clone, Default)]
pub struct SimStats {
    /// Data packets handed to an origin node
    pub messages_sent: u64,
    /// Data packets that reached their destination
    pub messages_delivered: u64,
    /// Frames put on the air
    pub packets_transmitted: u64,
    /// Frame receptions (one per receiving neighbor)
    pub packets_received: u64,
    /// Frame receptions lost to the loss model or a missing link
    pub packets_lost: u64,
    /// Maintenance ticks run
    pub ticks: u64,
}

impl SimStats {
    /// Message delivery rate (0.0 - 1.0)
    pub fn delivery_rate(&self) -> f64 {
        if self.messages_sent == 0 {
            0.0
        } else {
            self.messages_delivered as f64 / self.messages_sent as f64
        }
    }

    /// Frame reception success rate (0.0 - 1.0)
    pub fn packet_success_rate(&self) -> f64 {
        let attempts = self.packets_received + self.packets_lost;
        if attempts == 0 {
            0.0
        } else {
            self.packets_received as f64 / attempts as f64
        }
    }
}

/// A data packet that reached its destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Receiving node
    pub node: NodeId,
    /// Last relay
    pub from: NodeId,
    pub packet: DataPacket,
    /// Step at which it arrived
    pub step: u64,
}

/// Simulation events for logging
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    NodeJoined { node: NodeId, neighbors: Vec<NodeId> },
    MessageSent { node: NodeId, dest: NodeId, outcome: SendOutcome },
    PacketTransmitted { node: NodeId, channel: u16, dest: Option<NodeId> },
    PacketReceived { node: NodeId, from: NodeId, channel: u16 },
    PacketLost { from: NodeId, to: NodeId, reason: String },
    MessageDelivered { node: NodeId, packet: DataPacket, step: u64 },
    Tick { tick: u64 },
}

/// Simulated node wrapper
#[derive(Debug)]
struct SimNode {
    engine: ProtocolEngine<Outbox>,
    /// Tick at which the next generated packet is due
    next_data_tick: u64,
}

/// Multi-node mesh network simulator
#[derive(Debug)]
pub struct MeshSimulator {
    config: SimConfig,
    topology: Topology,
    nodes: Vec<SimNode>,
    /// Frames transmitted during the previous step
    in_flight: Vec<OutboundFrame>,
    step_count: u64,
    rng: StdRng,
    stats: SimStats,
    deliveries: Vec<Delivery>,
    event_log: Vec<SimEvent>,
}

impl MeshSimulator {
    /// Create a simulator, building the topology from `config.topology`
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;
        let topology = config
            .topology
            .build(config.protocol.network_size, config.seed)?;
        Self::with_topology(config, topology)
    }

    /// Create a simulator over an explicit topology
    pub fn with_topology(config: SimConfig, topology: Topology) -> Result<Self> {
        config.validate()?;
        if topology.size() != config.protocol.network_size {
            return Err(AodvError::Config(format!(
                "topology has {} nodes but network_size is {}",
                topology.size(),
                config.protocol.network_size
            )));
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut nodes = Vec::with_capacity(topology.size() as usize);
        let mut event_log = Vec::new();
        for id in config.protocol.node_ids() {
            let engine = ProtocolEngine::new(id, config.protocol.clone(), Outbox::new(id))?;
            let jitter = traffic::initial_jitter(&mut rng, config.protocol.data_interval);
            event_log.push(SimEvent::NodeJoined {
                node: id,
                neighbors: topology.neighbors(id).to_vec(),
            });
            nodes.push(SimNode {
                engine,
                next_data_tick: jitter as u64,
            });
        }
        info!(
            "initialized {} nodes over {} topology ({} links)",
            nodes.len(),
            config.topology,
            topology.edge_count()
        );

        Ok(Self {
            config,
            topology,
            nodes,
            in_flight: Vec::new(),
            step_count: 0,
            rng,
            stats: SimStats::default(),
            deliveries: Vec::new(),
            event_log,
        })
    }

    /// Run one simulation step
    pub fn step(&mut self) {
        self.step_count += 1;

        // 1. Frames sent last step reach their receivers
        self.propagate_frames();

        // 2. Maintenance tick and generated traffic
        if self.step_count % self.config.steps_per_tick() == 0 {
            self.maintenance_tick();
        }

        // 3. Whatever the nodes sent goes on the air for the next step
        self.collect_transmissions();
    }

    fn propagate_frames(&mut self) {
        let frames = std::mem::take(&mut self.in_flight);
        for frame in frames {
            let receivers: Vec<NodeId> = match frame.dest {
                None => self.topology.neighbors(frame.from).to_vec(),
                Some(dest) if self.topology.are_neighbors(frame.from, dest) => vec![dest],
                Some(dest) => {
                    self.record_loss(frame.from, dest, "not in range");
                    continue;
                }
            };
            for to in receivers {
                if self.config.loss_rate > 0.0 && self.rng.gen_bool(self.config.loss_rate) {
                    self.record_loss(frame.from, to, "lost on air");
                    continue;
                }
                self.deliver(to, &frame);
            }
        }
    }

    fn deliver(&mut self, to: NodeId, frame: &OutboundFrame) {
        let Some(node) = self.nodes.get_mut(to.index()) else {
            return;
        };
        self.stats.packets_received += 1;
        self.event_log.push(SimEvent::PacketReceived {
            node: to,
            from: frame.from,
            channel: frame.channel,
        });
        for packet in node.engine.on_frame(&frame.received()) {
            self.stats.messages_delivered += 1;
            debug!(step = self.step_count, "node {} received {}", to, packet);
            self.event_log.push(SimEvent::MessageDelivered {
                node: to,
                packet,
                step: self.step_count,
            });
            self.deliveries.push(Delivery {
                node: to,
                from: frame.from,
                packet,
                step: self.step_count,
            });
        }
    }

    fn record_loss(&mut self, from: NodeId, to: NodeId, reason: &str) {
        self.stats.packets_lost += 1;
        self.event_log.push(SimEvent::PacketLost {
            from,
            to,
            reason: reason.to_string(),
        });
    }

    fn maintenance_tick(&mut self) {
        self.stats.ticks += 1;
        let tick = self.stats.ticks;
        self.event_log.push(SimEvent::Tick { tick });

        for node in self.nodes.iter_mut() {
            node.engine.tick();
        }

        if !self.config.traffic {
            return;
        }
        let size = self.config.protocol.network_size;
        let interval = self.config.protocol.data_interval as u64;
        for i in 0..self.nodes.len() {
            if tick < self.nodes[i].next_data_tick {
                continue;
            }
            self.nodes[i].next_data_tick = tick + interval;
            let me = self.nodes[i].engine.id();
            let sent = traffic::random_packet(&mut self.rng, me, size)
                .and_then(|packet| self.originate(i, packet));
            if let Err(e) = sent {
                debug!("node {} cannot generate traffic: {}", me, e);
            }
        }
    }

    fn originate(&mut self, idx: usize, packet: DataPacket) -> Result<SendOutcome> {
        let node = &mut self.nodes[idx];
        let me = node.engine.id();
        let outcome = node.engine.send_data(packet)?;
        self.stats.messages_sent += 1;
        if outcome == SendOutcome::Delivered {
            self.stats.messages_delivered += 1;
        }
        self.event_log.push(SimEvent::MessageSent {
            node: me,
            dest: packet.dest,
            outcome,
        });
        Ok(outcome)
    }

    fn collect_transmissions(&mut self) {
        for node in self.nodes.iter_mut() {
            for frame in node.engine.link_mut().take() {
                self.stats.packets_transmitted += 1;
                self.event_log.push(SimEvent::PacketTransmitted {
                    node: frame.from,
                    channel: frame.channel,
                    dest: frame.dest,
                });
                self.in_flight.push(frame);
            }
        }
    }

    /// Hand `packet` to node `from` as local data
    ///
    /// Its first frames go on the air at the next step.
    pub fn send_message(&mut self, from: NodeId, packet: DataPacket) -> Result<SendOutcome> {
        let idx = from.index();
        if idx >= self.nodes.len() {
            return Err(AodvError::NodeOutOfRange {
                id: from.get(),
                network_size: self.config.protocol.network_size,
            });
        }
        let outcome = self.originate(idx, packet)?;
        self.collect_transmissions();
        Ok(outcome)
    }

    /// Send `text` from node `from` to node `to`
    pub fn send_text(&mut self, from: u8, to: u8, text: &str) -> Result<SendOutcome> {
        let packet = DataPacket::new(NodeId::new(to)?, Payload::new(text)?);
        self.send_message(NodeId::new(from)?, packet)
    }

    /// Run simulation for a number of steps
    pub fn run(&mut self, steps: u64) {
        for _ in 0..steps {
            self.step();
        }
    }

    /// Run `ticks` maintenance ticks worth of steps
    pub fn run_ticks(&mut self, ticks: u64) {
        self.run(ticks * self.config.steps_per_tick());
    }

    /// Run until a condition is met or max steps reached
    ///
    /// Returns whether the condition was met.
    pub fn run_until<F>(&mut self, max_steps: u64, condition: F) -> bool
    where
        F: Fn(&Self) -> bool,
    {
        for _ in 0..max_steps {
            self.step();
            if condition(self) {
                return true;
            }
        }
        false
    }

    /// Whether no frame is waiting to be delivered
    pub fn is_quiet(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Engine of node `id`
    pub fn engine(&self, id: NodeId) -> Option<&ProtocolEngine<Outbox>> {
        self.nodes.get(id.index()).map(|n| &n.engine)
    }

    /// Protocol counters of node `id`
    pub fn node_stats(&self, id: NodeId) -> Option<&EngineStats> {
        self.engine(id).map(|e| e.stats())
    }

    pub fn stats(&self) -> &SimStats {
        &self.stats
    }

    pub fn events(&self) -> &[SimEvent] {
        &self.event_log
    }

    /// Data that reached its destination, in arrival order
    pub fn deliveries(&self) -> &[Delivery] {
        &self.deliveries
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Mutable topology, for breaking or adding links mid-run
    pub fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Print a summary of the simulation
    pub fn print_summary(&self) {
        println!("\n=== AODV Simulation Summary ===");
        println!("Steps: {} ({} ticks)", self.step_count, self.stats.ticks);
        println!(
            "Nodes: {} ({} topology, {} links)",
            self.nodes.len(),
            self.config.topology,
            self.topology.edge_count()
        );
        println!();
        println!("Messages:");
        println!("  Sent: {}", self.stats.messages_sent);
        println!("  Delivered: {}", self.stats.messages_delivered);
        println!(
            "  Delivery rate: {:.1}%",
            self.stats.delivery_rate() * 100.0
        );
        println!();
        println!("Packets:");
        println!("  Transmitted: {}", self.stats.packets_transmitted);
        println!("  Received: {}", self.stats.packets_received);
        println!("  Lost: {}", self.stats.packets_lost);
        println!(
            "  Success rate: {:.1}%",
            self.stats.packet_success_rate() * 100.0
        );
        println!();
        println!("Per-node stats:");
        for node in &self.nodes {
            let s = node.engine.stats();
            println!(
                "  Node {:2}: RREQ={}/{} RREP={}/{} DATA tx={} rx={} relay={} dropped={} routes={}",
                node.engine.id(),
                s.requests_originated,
                s.requests_forwarded,
                s.replies_sent,
                s.replies_forwarded,
                s.data_sent,
                s.data_delivered,
                s.data_relayed,
                s.queue_full_drops + s.data_timeouts,
                node.engine.routing_table().len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u8) -> NodeId {
        NodeId::new(id).unwrap()
    }

    #[test]
    fn test_simulator_creation() {
        let sim = MeshSimulator::new(SimConfig::default().with_network_size(5)).unwrap();
        assert_eq!(sim.node_count(), 5);
        assert!(sim.is_quiet());
        assert_eq!(sim.events().len(), 5);
    }

    #[test]
    fn test_topology_size_mismatch() {
        let topo = Topology::line(4).unwrap();
        assert!(MeshSimulator::with_topology(SimConfig::default(), topo).is_err());
    }

    #[test]
    fn test_invalid_sim_config() {
        assert!(MeshSimulator::new(SimConfig::default().with_steps_per_tick(0)).is_err());
        assert!(MeshSimulator::new(SimConfig::default().with_loss_rate(2.0)).is_err());
    }

    #[test]
    fn test_steps_per_tick_grows_with_network() {
        assert_eq!(SimConfig::default().with_network_size(3).steps_per_tick(), 10);
        assert_eq!(SimConfig::default().with_network_size(8).steps_per_tick(), 16);
        assert_eq!(SimConfig::default().with_network_size(40).steps_per_tick(), 80);
        let config = SimConfig::default().with_network_size(40).with_steps_per_tick(7);
        assert_eq!(config.steps_per_tick(), 7);
    }

    #[test]
    fn test_neighbors_deliver_in_one_round_trip() {
        let config = SimConfig::default()
            .with_network_size(2)
            .with_topology(TopologyKind::Full);
        let mut sim = MeshSimulator::new(config).unwrap();

        assert_eq!(sim.send_text(1, 2, "hi").unwrap(), SendOutcome::Queued);
        // RREQ, RREP, DATA: one step each
        sim.run(3);

        assert_eq!(sim.deliveries().len(), 1);
        assert_eq!(sim.deliveries()[0].node, node(2));
        assert_eq!(sim.deliveries()[0].packet.payload.to_string(), "hi");
        assert_eq!(sim.stats().delivery_rate(), 1.0);
    }

    #[test]
    fn test_unicast_to_non_neighbor_is_lost() {
        let config = SimConfig::default()
            .with_network_size(3)
            .with_topology(TopologyKind::Full);
        let mut sim = MeshSimulator::new(config).unwrap();
        sim.send_text(1, 3, "x").unwrap();
        sim.run(2);
        assert_eq!(sim.engine(node(1)).unwrap().next_hop(node(3)), Some(node(3)));

        sim.topology_mut().disconnect(node(1), node(3));
        sim.send_text(1, 3, "y").unwrap();
        sim.run(1);
        assert!(sim
            .events()
            .iter()
            .any(|e| matches!(e, SimEvent::PacketLost { from, to, .. } if *from == node(1) && *to == node(3))));
    }

    #[test]
    fn test_generated_traffic_reproducible() {
        let config = SimConfig::default()
            .with_network_size(6)
            .with_topology(TopologyKind::Ring)
            .with_traffic(true)
            .with_steps_per_tick(5)
            .with_seed(11);
        let mut a = MeshSimulator::new(config.clone()).unwrap();
        let mut b = MeshSimulator::new(config).unwrap();
        a.run_ticks(40);
        b.run_ticks(40);

        assert!(a.stats().messages_sent >= 6);
        assert_eq!(a.stats().messages_sent, b.stats().messages_sent);
        assert_eq!(a.deliveries(), b.deliveries());
    }
}
