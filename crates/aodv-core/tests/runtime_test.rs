//! Live mesh tests on tokio's paused clock.

use aodv_core::runtime::{LiveMesh, NodeDelivery, RuntimeConfig};
use aodv_core::topology::Topology;
use aodv_core::{DataPacket, NodeId, Payload, ProtocolConfig};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep, timeout};

fn node(id: u8) -> NodeId {
    NodeId::new(id).unwrap()
}

fn quiet() -> RuntimeConfig {
    RuntimeConfig::default().with_traffic(false)
}

async fn next_delivery(rx: &mut UnboundedReceiver<NodeDelivery>) -> NodeDelivery {
    timeout(Duration::from_secs(30), rx.recv())
        .await
        .expect("no delivery in time")
        .expect("delivery channel closed")
}

#[tokio::test(start_paused = true)]
async fn test_live_discovery_over_relay() {
    let config = ProtocolConfig::default().with_network_size(3);
    let (mesh, mut delivered) = LiveMesh::spawn(config, Topology::line(3).unwrap(), quiet()).unwrap();

    let packet = DataPacket::new(node(3), Payload::new("*** 42 ***").unwrap());
    mesh.send(node(1), packet).await.unwrap();

    let delivery = next_delivery(&mut delivered).await;
    assert_eq!(delivery.node, node(3));
    assert_eq!(delivery.packet, packet);

    let engines = mesh.shutdown().await;
    assert_eq!(engines.len(), 3);
    assert_eq!(engines[0].next_hop(node(3)), Some(node(2)));
    assert_eq!(engines[1].next_hop(node(3)), Some(node(3)));
    assert_eq!(engines[1].stats().data_relayed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_live_routes_expire_with_ticks() {
    let config = ProtocolConfig::default()
        .with_network_size(2)
        .with_route_expiration_time(3);
    let (mesh, mut delivered) = LiveMesh::spawn(config, Topology::line(2).unwrap(), quiet()).unwrap();

    let packet = DataPacket::new(node(2), Payload::new("hi").unwrap());
    mesh.send(node(1), packet).await.unwrap();
    next_delivery(&mut delivered).await;

    sleep(Duration::from_secs(5)).await;
    let engines = mesh.shutdown().await;
    assert_eq!(engines[0].next_hop(node(2)), None);
    assert_eq!(engines[0].stats().routes_expired, 1);
}

#[tokio::test(start_paused = true)]
async fn test_live_generated_traffic() {
    let config = ProtocolConfig::default()
        .with_network_size(4)
        .with_data_interval(2);
    let runtime = RuntimeConfig::default()
        .with_tick(Duration::from_millis(100))
        .with_seed(3);
    let (mesh, mut delivered) = LiveMesh::spawn(config, Topology::full(4).unwrap(), runtime).unwrap();

    for _ in 0..4 {
        let delivery = next_delivery(&mut delivered).await;
        assert_eq!(delivery.packet.dest, delivery.node);
    }

    let engines = mesh.shutdown().await;
    let sent: u64 = engines.iter().map(|e| e.stats().data_sent).sum();
    assert!(sent >= 4);
}

#[tokio::test(start_paused = true)]
async fn test_live_mesh_rejects_bad_setup() {
    let config = ProtocolConfig::default().with_network_size(3);
    assert!(LiveMesh::spawn(config.clone(), Topology::line(4).unwrap(), quiet()).is_err());

    let zero_tick = quiet().with_tick(Duration::ZERO);
    assert!(LiveMesh::spawn(config.clone(), Topology::line(3).unwrap(), zero_tick).is_err());

    let (mesh, _delivered) = LiveMesh::spawn(config, Topology::line(3).unwrap(), quiet()).unwrap();
    let packet = DataPacket::new(node(2), Payload::new("x").unwrap());
    assert!(mesh.send(node(9), packet).await.is_err());
    mesh.shutdown().await;
}
