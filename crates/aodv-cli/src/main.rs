//! AODV Mesh Routing Command-Line Interface
//!
//! This CLI provides tools for:
//! - Simulating route discovery over a topology, step by step
//! - Running a live in-process mesh of tokio node tasks
//! - Encoding and decoding wire frames
//! - Printing the effective protocol configuration

use anyhow::{Context, Result};
use aodv_core::runtime::{LiveMesh, RuntimeConfig};
use aodv_core::simulation::{MeshSimulator, SimConfig};
use aodv_core::topology::TopologyKind;
use aodv_core::{
    DataPacket, EngineStats, NodeId, Packet, PacketKind, Payload, ProtocolConfig, RequestId,
    RouteReply, RouteRequest,
};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "aodv")]
#[command(author, version, about = "AODV mesh routing CLI", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Protocol configuration file (JSON); missing fields use defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a deterministic step-by-step simulation
    Simulate {
        /// Number of nodes (overrides the config file)
        #[arg(short, long)]
        nodes: Option<u8>,

        /// Topology (line, ring, grid:W, full, random[:P])
        #[arg(short, long, default_value = "line")]
        topology: String,

        /// Number of maintenance ticks to simulate
        #[arg(long, default_value = "50")]
        ticks: u64,

        /// Simulation steps (hops of air time) per tick [default: max(10, 2 x nodes)]
        #[arg(long)]
        steps_per_tick: Option<u64>,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Let every node generate periodic traffic
        #[arg(long)]
        traffic: bool,

        /// Probability of losing a single frame delivery (0.0-1.0)
        #[arg(long, default_value = "0.0")]
        loss: f64,

        /// Send a message at start, as FROM:TO (repeatable)
        #[arg(short, long)]
        send: Vec<String>,

        /// Print every node's routing table at the end
        #[arg(long)]
        tables: bool,

        /// Print per-node statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a live mesh of node tasks in real time
    Run {
        /// Number of nodes (overrides the config file)
        #[arg(short, long)]
        nodes: Option<u8>,

        /// Topology (line, ring, grid:W, full, random[:P])
        #[arg(short, long, default_value = "line")]
        topology: String,

        /// Tick length in milliseconds
        #[arg(long, default_value = "1000")]
        tick_ms: u64,

        /// Run time in seconds (Ctrl+C stops earlier)
        #[arg(short, long, default_value = "60")]
        duration: u64,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Disable generated traffic
        #[arg(long)]
        no_traffic: bool,

        /// Send a message at start, as FROM:TO (repeatable)
        #[arg(short, long)]
        send: Vec<String>,
    },

    /// Encode a packet to its wire frame
    Encode {
        #[command(subcommand)]
        packet: EncodeCommand,
    },

    /// Decode a wire frame
    Decode {
        /// Frame text, e.g. "ROUTE_REQUEST;REQ_ID: 1;DEST: 5;SRC: 3;"
        frame: String,

        /// Print the decoded packet as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective protocol configuration as JSON
    Config,
}

#[derive(Subcommand)]
enum EncodeCommand {
    /// DATA frame
    Data {
        /// Destination node
        #[arg(short, long)]
        dest: u8,

        /// Payload text (at most 10 bytes)
        #[arg(short, long, default_value = "*** 17 ***")]
        payload: String,
    },

    /// ROUTE_REQUEST frame
    Rreq {
        /// Request id (1-99)
        #[arg(short, long, default_value = "1")]
        req_id: u8,

        /// Originating node
        #[arg(short, long)]
        src: u8,

        /// Sought destination
        #[arg(short, long)]
        dest: u8,
    },

    /// ROUTE_REPLY frame
    Rrep {
        /// Request id being answered (1-99)
        #[arg(short, long, default_value = "1")]
        req_id: u8,

        /// Destination the route leads to
        #[arg(short, long)]
        dest: u8,

        /// Origin of the discovery
        #[arg(short, long)]
        src: u8,

        /// Hops from the sender to the destination
        #[arg(long, default_value = "0")]
        hops: u8,
    },
}

fn load_config(path: Option<&PathBuf>, nodes: Option<u8>) -> Result<ProtocolConfig> {
    let mut config = match path {
        Some(path) => ProtocolConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ProtocolConfig::default(),
    };
    if let Some(nodes) = nodes {
        config = config.with_network_size(nodes);
    }
    config.validate().context("Invalid protocol configuration")?;
    Ok(config)
}

fn parse_topology(text: &str) -> Result<TopologyKind> {
    text.parse::<TopologyKind>()
        .with_context(|| format!("Invalid topology: {}", text))
}

/// Parse "FROM:TO" into a pair of node ids
fn parse_send(text: &str) -> Result<(NodeId, NodeId)> {
    let (from, to) = text
        .split_once(':')
        .with_context(|| format!("Expected FROM:TO, got '{}'", text))?;
    let from: u8 = from
        .trim()
        .parse()
        .with_context(|| format!("Invalid source node in '{}'", text))?;
    let to: u8 = to
        .trim()
        .parse()
        .with_context(|| format!("Invalid destination node in '{}'", text))?;
    Ok((NodeId::new(from)?, NodeId::new(to)?))
}

#[allow(clippy::too_many_arguments)]
fn cmd_simulate(
    config: ProtocolConfig,
    topology: String,
    ticks: u64,
    steps_per_tick: Option<u64>,
    seed: u64,
    traffic: bool,
    loss: f64,
    send: Vec<String>,
    tables: bool,
    json: bool,
) -> Result<()> {
    let kind = parse_topology(&topology)?;
    let mut sim_config = SimConfig::default()
        .with_protocol(config)
        .with_topology(kind)
        .with_seed(seed)
        .with_traffic(traffic)
        .with_loss_rate(loss);
    if let Some(steps) = steps_per_tick {
        sim_config = sim_config.with_steps_per_tick(steps);
    }

    let mut sim = MeshSimulator::new(sim_config).context("Failed to create simulator")?;

    println!("=== AODV Mesh Simulation ===");
    println!();
    println!("Nodes:     {}", sim.node_count());
    println!("Topology:  {} ({} links)", kind, sim.topology().edge_count());
    println!("Ticks:     {} x {} steps", ticks, sim.config().steps_per_tick());
    println!("Traffic:   {}", if traffic { "generated" } else { "manual" });
    println!("Loss:      {:.1}%", loss * 100.0);
    println!();

    for (i, pair) in send.iter().enumerate() {
        let (from, to) = parse_send(pair)?;
        let payload = Payload::new(&format!("msg {}", i + 1))?;
        let outcome = sim
            .send_message(from, DataPacket::new(to, payload))
            .with_context(|| format!("Failed to send {}", pair))?;
        println!("Sent {} -> {}: {:?}", from, to, outcome);
    }

    sim.run_ticks(ticks);

    println!();
    println!("Deliveries:");
    if sim.deliveries().is_empty() {
        println!("  (none)");
    }
    for delivery in sim.deliveries() {
        println!(
            "  step {:>5}: node {:>2} <- {:>2}  {{{}}}",
            delivery.step, delivery.node, delivery.from, delivery.packet.payload
        );
    }

    sim.print_summary();

    if tables {
        let links: Vec<String> = sim
            .topology()
            .edges()
            .iter()
            .map(|(a, b)| format!("{}-{}", a, b))
            .collect();
        println!();
        println!("Links: {}", links.join(" "));
        for id in sim.topology().nodes() {
            let Some(engine) = sim.engine(id) else { continue };
            println!();
            println!("--- Node {} ---", id);
            println!("{}", engine.routing_table());
            println!("{}", engine.queue());
        }
    }

    if json {
        let stats: BTreeMap<u8, &EngineStats> = sim
            .topology()
            .nodes()
            .filter_map(|id| sim.node_stats(id).map(|s| (id.get(), s)))
            .collect();
        println!();
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }

    Ok(())
}

fn cmd_run(
    config: ProtocolConfig,
    topology: String,
    tick_ms: u64,
    duration: u64,
    seed: u64,
    no_traffic: bool,
    send: Vec<String>,
) -> Result<()> {
    let kind = parse_topology(&topology)?;
    let topology = kind
        .build(config.network_size, seed)
        .context("Failed to build topology")?;
    let sends = send
        .iter()
        .map(|s| parse_send(s))
        .collect::<Result<Vec<_>>>()?;
    let runtime_config = RuntimeConfig::default()
        .with_tick(Duration::from_millis(tick_ms))
        .with_traffic(!no_traffic)
        .with_seed(seed);

    println!("=== AODV Live Mesh ===");
    println!();
    println!("Nodes:     {}", config.network_size);
    println!("Topology:  {} ({} links)", kind, topology.edge_count());
    println!("Tick:      {} ms", tick_ms);
    println!("Duration:  {} s", duration);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?;

    runtime.block_on(async move {
        let (mesh, mut deliveries) = LiveMesh::spawn(config, topology, runtime_config)
            .context("Failed to start mesh")?;

        for (i, (from, to)) in sends.into_iter().enumerate() {
            let payload = Payload::new(&format!("msg {}", i + 1))?;
            mesh.send(from, DataPacket::new(to, payload))
                .await
                .with_context(|| format!("Failed to send from node {}", from))?;
        }

        let deadline = tokio::time::sleep(Duration::from_secs(duration));
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(deadline, ctrl_c);
        let mut delivered = 0u64;
        loop {
            tokio::select! {
                _ = &mut deadline => {
                    info!("run time elapsed");
                    break;
                }
                result = &mut ctrl_c => {
                    if let Err(e) = result {
                        warn!("cannot listen for Ctrl+C: {}", e);
                    }
                    eprintln!("\nShutting down mesh...");
                    break;
                }
                delivery = deliveries.recv() => {
                    let Some(delivery) = delivery else { break };
                    delivered += 1;
                    println!("node {:>2} received {{{}}}", delivery.node, delivery.packet.payload);
                }
            }
        }

        let engines = mesh.shutdown().await;
        println!();
        println!("Delivered: {}", delivered);
        for engine in &engines {
            let stats = engine.stats();
            println!();
            println!(
                "--- Node {} (sent {}, relayed {}, delivered {}, timeouts {}) ---",
                engine.id(),
                stats.data_sent,
                stats.data_relayed,
                stats.data_delivered,
                stats.data_timeouts
            );
            println!("{}", engine.routing_table());
        }
        Ok::<(), anyhow::Error>(())
    })
}

fn cmd_encode(packet: EncodeCommand, config: &ProtocolConfig) -> Result<()> {
    let packet = match packet {
        EncodeCommand::Data { dest, payload } => {
            Packet::Data(DataPacket::new(NodeId::new(dest)?, Payload::new(&payload)?))
        }
        EncodeCommand::Rreq { req_id, src, dest } => Packet::RouteRequest(RouteRequest::new(
            RequestId::new(req_id)?,
            NodeId::new(src)?,
            NodeId::new(dest)?,
        )),
        EncodeCommand::Rrep {
            req_id,
            dest,
            src,
            hops,
        } => Packet::RouteReply(RouteReply {
            req_id: RequestId::new(req_id)?,
            dest: NodeId::new(dest)?,
            src: NodeId::new(src)?,
            hops,
        }),
    };
    let frame = packet.encode().context("Failed to encode packet")?;
    println!("{}", String::from_utf8_lossy(&frame));
    // Stderr, so the frame alone can be piped into `aodv decode`
    let channel = packet.kind().channel();
    eprintln!("Channel: {} ({})", channel.number(config), channel);
    Ok(())
}

/// Frame bytes from text typed at a shell
///
/// A DATA frame ends in a NUL nobody can type, so a short DATA frame is
/// zero-padded to its fixed length.
fn frame_bytes(text: &str) -> Vec<u8> {
    let mut bytes = text.as_bytes().to_vec();
    if let Some(kind @ PacketKind::Data) = PacketKind::of_frame(&bytes) {
        if bytes.len() < kind.frame_len() {
            bytes.resize(kind.frame_len(), 0);
        }
    }
    bytes
}

fn cmd_decode(frame: String, json: bool, config: &ProtocolConfig) -> Result<()> {
    let packet = Packet::decode(&frame_bytes(&frame)).context("Failed to decode frame")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&packet)?);
        return Ok(());
    }
    let channel = packet.kind().channel();
    println!("Kind:    {:?}", packet.kind());
    println!("Channel: {} ({})", channel.number(config), channel);
    match packet {
        Packet::Data(p) => {
            println!("Dest:    {}", p.dest);
            println!("Data:    {{{}}}", p.payload);
        }
        Packet::RouteRequest(p) => {
            println!("ReqId:   {}", p.req_id);
            println!("Src:     {}", p.src);
            println!("Dest:    {}", p.dest);
        }
        Packet::RouteReply(p) => {
            println!("ReqId:   {}", p.req_id);
            println!("Src:     {}", p.src);
            println!("Dest:    {}", p.dest);
            println!("Hops:    {}", p.hops);
        }
    }
    Ok(())
}

fn cmd_config(config: ProtocolConfig) -> Result<()> {
    println!("{}", config.to_json()?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Simulate {
            nodes,
            topology,
            ticks,
            steps_per_tick,
            seed,
            traffic,
            loss,
            send,
            tables,
            json,
        } => {
            let config = load_config(cli.config.as_ref(), nodes)?;
            cmd_simulate(
                config,
                topology,
                ticks,
                steps_per_tick,
                seed,
                traffic,
                loss,
                send,
                tables,
                json,
            )
        }
        Commands::Run {
            nodes,
            topology,
            tick_ms,
            duration,
            seed,
            no_traffic,
            send,
        } => {
            let config = load_config(cli.config.as_ref(), nodes)?;
            cmd_run(config, topology, tick_ms, duration, seed, no_traffic, send)
        }
        Commands::Encode { packet } => {
            cmd_encode(packet, &load_config(cli.config.as_ref(), None)?)
        }
        Commands::Decode { frame, json } => {
            cmd_decode(frame, json, &load_config(cli.config.as_ref(), None)?)
        }
        Commands::Config => cmd_config(load_config(cli.config.as_ref(), None)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_send() {
        let (from, to) = parse_send("1:5").unwrap();
        assert_eq!(from.get(), 1);
        assert_eq!(to.get(), 5);
        assert!(parse_send("15").is_err());
        assert!(parse_send("0:5").is_err());
        assert!(parse_send("a:5").is_err());
    }

    #[test]
    fn test_load_config_overrides_nodes() {
        let config = load_config(None, Some(12)).unwrap();
        assert_eq!(config.network_size, 12);
        assert!(load_config(None, Some(1)).is_err());
    }

    #[test]
    fn test_cli_parses_encode() {
        let cli = Cli::parse_from(["aodv", "encode", "rreq", "--src", "3", "--dest", "5"]);
        match cli.command {
            Commands::Encode {
                packet: EncodeCommand::Rreq { req_id, src, dest },
            } => {
                assert_eq!((req_id, src, dest), (1, 3, 5));
            }
            _ => panic!("expected encode rreq"),
        }
    }

    #[test]
    fn test_typed_data_frame_decodes() {
        let packet = DataPacket::new(NodeId::new(4).unwrap(), Payload::new("*** 17 ***").unwrap());
        let frame = packet.encode().unwrap();
        // What a shell passes on: everything but the trailing NUL
        let typed = std::str::from_utf8(&frame[..DataPacket::FRAME_LEN - 1]).unwrap();
        assert_eq!(typed.len(), 31);

        let bytes = frame_bytes(typed);
        assert_eq!(bytes.len(), DataPacket::FRAME_LEN);
        assert_eq!(Packet::decode(&bytes).unwrap(), Packet::Data(packet));
        assert!(cmd_decode(typed.to_string(), false, &ProtocolConfig::default()).is_ok());

        let short = frame_bytes("DATA;DEST: 4;PAYLOAD:hi");
        let decoded = DataPacket::decode(&short).unwrap();
        assert_eq!(decoded.payload.to_string(), "hi");
    }

    #[test]
    fn test_typed_request_frame_left_alone() {
        let typed = "ROUTE_REQUEST;REQ_ID: 1;DEST: 5;SRC: 3";
        assert_eq!(frame_bytes(typed), typed.as_bytes());
        assert!(cmd_decode(typed.to_string(), false, &ProtocolConfig::default()).is_err());
    }
}
