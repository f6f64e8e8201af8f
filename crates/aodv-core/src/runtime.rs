//! Async node runtime
//!
//! Runs one [`ProtocolEngine`] per tokio task. Each task owns its engine and
//! serializes every event onto a single `select!` loop:
//!
//! - inbound frames and local send requests from its inbox,
//! - the periodic maintenance tick,
//! - the generated-traffic timer (first firing delayed by random jitter).
//!
//! Frames leave through a [`ChannelLink`] into an in-process air hub
//! ([`run_air`]) that hands each frame to the transmitter's neighbors.

use crate::config::ProtocolConfig;
use crate::engine::ProtocolEngine;
use crate::error::{AodvError, Result};
use crate::packet::DataPacket;
use crate::topology::Topology;
use crate::traffic;
use crate::traits::{InboundFrame, Link, OutboundFrame};
use crate::types::NodeId;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Inbox depth per node
const INBOX_CAPACITY: usize = 256;

/// Shortest accepted tick
const MIN_TICK: Duration = Duration::from_millis(1);

/// Timing of a live node
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Wall-clock length of one maintenance tick
    pub tick: Duration,
    /// Whether the node generates periodic traffic
    pub traffic: bool,
    /// Seed for jitter, destinations and payloads
    pub seed: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            traffic: true,
            seed: 0,
        }
    }
}

impl RuntimeConfig {
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_traffic(mut self, traffic: bool) -> Self {
        self.traffic = traffic;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Input to a node task
#[derive(Debug, Clone)]
pub enum NodeInput {
    /// A frame heard on the air
    Frame(InboundFrame),
    /// Local data to send
    Send(DataPacket),
}

/// Data delivered to a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDelivery {
    pub node: NodeId,
    pub packet: DataPacket,
}

/// Link that forwards frames to the air hub
#[derive(Debug, Clone)]
pub struct ChannelLink {
    node: NodeId,
    air: mpsc::UnboundedSender<OutboundFrame>,
}

impl ChannelLink {
    pub fn new(node: NodeId, air: mpsc::UnboundedSender<OutboundFrame>) -> Self {
        Self { node, air }
    }
}

impl Link for ChannelLink {
    fn send(&mut self, channel: u16, frame: &[u8], dest: Option<NodeId>) -> Result<()> {
        self.air
            .send(OutboundFrame {
                from: self.node,
                channel,
                bytes: frame.to_vec(),
                dest,
            })
            .map_err(|_| AodvError::Link("air hub closed".into()))
    }
}

/// One node's event loop
pub struct NodeRuntime {
    engine: ProtocolEngine<ChannelLink>,
    inbox: mpsc::Receiver<NodeInput>,
    deliveries: Option<mpsc::UnboundedSender<NodeDelivery>>,
    shutdown: watch::Receiver<bool>,
    runtime: RuntimeConfig,
}

impl NodeRuntime {
    pub fn new(
        engine: ProtocolEngine<ChannelLink>,
        inbox: mpsc::Receiver<NodeInput>,
        shutdown: watch::Receiver<bool>,
        runtime: RuntimeConfig,
    ) -> Self {
        Self {
            engine,
            inbox,
            deliveries: None,
            shutdown,
            runtime,
        }
    }

    /// Report delivered data on `tx`
    pub fn with_deliveries(mut self, tx: mpsc::UnboundedSender<NodeDelivery>) -> Self {
        self.deliveries = Some(tx);
        self
    }

    /// Run until shutdown is signalled or the inbox closes
    ///
    /// Returns the engine so its final state can be inspected.
    pub async fn run(mut self) -> ProtocolEngine<ChannelLink> {
        let me = self.engine.id();
        let config = self.engine.config().clone();
        let mut rng = StdRng::seed_from_u64(self.runtime.seed ^ me.get() as u64);

        let tick = self.runtime.tick.max(MIN_TICK);
        let mut maintenance = interval(tick);
        maintenance.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Don't fire immediately
        maintenance.tick().await;

        let jitter = traffic::initial_jitter(&mut rng, config.data_interval);
        let mut data_timer = interval_at(
            Instant::now() + tick * jitter as u32,
            tick * config.data_interval as u32,
        );
        data_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let traffic_enabled = self.runtime.traffic;

        info!(node = %me, "node started (first data in {} ticks)", jitter);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.changed() => {
                    debug!(node = %me, "shutdown signal received");
                    break;
                }

                input = self.inbox.recv() => {
                    match input {
                        Some(NodeInput::Frame(frame)) => {
                            let delivered = self.engine.on_frame(&frame);
                            self.report(delivered);
                        }
                        Some(NodeInput::Send(packet)) => {
                            if let Err(e) = self.engine.send_data(packet) {
                                warn!(node = %me, "cannot send {}: {}", packet, e);
                            }
                        }
                        None => {
                            debug!(node = %me, "inbox closed, exiting");
                            break;
                        }
                    }
                }

                _ = maintenance.tick() => {
                    self.engine.tick();
                }

                _ = data_timer.tick(), if traffic_enabled => {
                    match traffic::random_packet(&mut rng, me, config.network_size) {
                        Ok(packet) => {
                            debug!(node = %me, "ready to send DATA to {}: {{{}}}", packet.dest, packet.payload);
                            if let Err(e) = self.engine.send_data(packet) {
                                warn!(node = %me, "cannot send {}: {}", packet, e);
                            }
                        }
                        Err(e) => warn!(node = %me, "cannot generate traffic: {}", e),
                    }
                }
            }
        }

        info!(node = %me, "node stopped");
        self.engine
    }

    fn report(&self, delivered: Vec<DataPacket>) {
        let Some(tx) = &self.deliveries else { return };
        for packet in delivered {
            let _ = tx.send(NodeDelivery {
                node: self.engine.id(),
                packet,
            });
        }
    }
}

/// Deliver frames from `air` to the transmitter's neighbors
///
/// Unicast frames reach their target only if it is a neighbor. Returns when
/// every [`ChannelLink`] has been dropped.
pub async fn run_air(
    topology: Topology,
    mut air: mpsc::UnboundedReceiver<OutboundFrame>,
    inboxes: HashMap<NodeId, mpsc::Sender<NodeInput>>,
) {
    while let Some(frame) = air.recv().await {
        let receivers: Vec<NodeId> = match frame.dest {
            None => topology.neighbors(frame.from).to_vec(),
            Some(dest) if topology.are_neighbors(frame.from, dest) => vec![dest],
            Some(dest) => {
                debug!(from = %frame.from, "unicast to {} not in range, lost", dest);
                continue;
            }
        };
        for to in receivers {
            let Some(inbox) = inboxes.get(&to) else { continue };
            if inbox.send(NodeInput::Frame(frame.received())).await.is_err() {
                debug!("node {} no longer listening", to);
            }
        }
    }
    debug!("air hub stopped");
}

/// A whole network of node tasks plus the air hub
pub struct LiveMesh {
    inboxes: HashMap<NodeId, mpsc::Sender<NodeInput>>,
    shutdown: watch::Sender<bool>,
    nodes: Vec<JoinHandle<ProtocolEngine<ChannelLink>>>,
    air: JoinHandle<()>,
}

impl LiveMesh {
    /// Spawn one task per node of `config` and the air hub over `topology`
    ///
    /// Delivered data is reported on the returned receiver.
    pub fn spawn(
        config: ProtocolConfig,
        topology: Topology,
        runtime: RuntimeConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<NodeDelivery>)> {
        config.validate()?;
        if topology.size() != config.network_size {
            return Err(AodvError::Config(format!(
                "topology has {} nodes but network_size is {}",
                topology.size(),
                config.network_size
            )));
        }
        if runtime.tick < MIN_TICK {
            return Err(AodvError::Config("tick must be at least 1ms".into()));
        }

        let (air_tx, air_rx) = mpsc::unbounded_channel();
        let (delivered_tx, delivered_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut inboxes = HashMap::new();
        let mut nodes = Vec::new();
        for id in config.node_ids() {
            let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
            let link = ChannelLink::new(id, air_tx.clone());
            let engine = ProtocolEngine::new(id, config.clone(), link)?;
            let node = NodeRuntime::new(engine, rx, shutdown_rx.clone(), runtime.clone())
                .with_deliveries(delivered_tx.clone());
            inboxes.insert(id, tx);
            nodes.push(tokio::spawn(node.run()));
        }
        drop(air_tx);

        let air = tokio::spawn(run_air(topology, air_rx, inboxes.clone()));
        info!("live mesh of {} nodes started", nodes.len());

        Ok((
            Self {
                inboxes,
                shutdown: shutdown_tx,
                nodes,
                air,
            },
            delivered_rx,
        ))
    }

    /// Ask node `from` to send `packet`
    pub async fn send(&self, from: NodeId, packet: DataPacket) -> Result<()> {
        let inbox = self.inboxes.get(&from).ok_or(AodvError::NodeOutOfRange {
            id: from.get(),
            network_size: self.inboxes.len() as u8,
        })?;
        inbox
            .send(NodeInput::Send(packet))
            .await
            .map_err(|_| AodvError::Link(format!("node {} has stopped", from)))
    }

    /// Stop every node and the hub; returns the final engines in id order
    pub async fn shutdown(self) -> Vec<ProtocolEngine<ChannelLink>> {
        let _ = self.shutdown.send(true);
        drop(self.inboxes);

        let mut engines = Vec::with_capacity(self.nodes.len());
        for handle in self.nodes {
            match handle.await {
                Ok(engine) => engines.push(engine),
                Err(e) => warn!("node task failed: {}", e),
            }
        }
        // The returned engines still hold link senders, so the hub would
        // never see its channel close
        self.air.abort();
        let _ = self.air.await;
        engines
    }
}
