//! Integration tests for multi-node route discovery.
//!
//! Engines are wired together by hand: every call to `hop()` moves the frames
//! all nodes have queued on their links exactly one hop over the topology.

use aodv_core::prelude::*;
use aodv_core::config::RREP_CHANNEL;
use aodv_core::{OutboundFrame, Topology, HOP_INFINITY};

struct Net {
    engines: Vec<ProtocolEngine<Outbox>>,
    topology: Topology,
    delivered: Vec<(NodeId, DataPacket)>,
}

impl Net {
    fn new(topology: Topology, config: ProtocolConfig) -> Self {
        let config = config.with_network_size(topology.size());
        let engines = topology
            .nodes()
            .map(|id| ProtocolEngine::new(id, config.clone(), Outbox::new(id)).unwrap())
            .collect();
        Self {
            engines,
            topology,
            delivered: Vec::new(),
        }
    }

    fn engine(&self, id: u8) -> &ProtocolEngine<Outbox> {
        &self.engines[node(id).index()]
    }

    fn engine_mut(&mut self, id: u8) -> &mut ProtocolEngine<Outbox> {
        &mut self.engines[node(id).index()]
    }

    /// Deliver every queued frame one hop; returns the frames moved
    fn hop(&mut self) -> Vec<OutboundFrame> {
        let frames: Vec<OutboundFrame> = self
            .engines
            .iter_mut()
            .flat_map(|e| e.link_mut().take())
            .collect();
        for frame in &frames {
            let receivers: Vec<NodeId> = match frame.dest {
                None => self.topology.neighbors(frame.from).to_vec(),
                Some(dest) if self.topology.are_neighbors(frame.from, dest) => vec![dest],
                Some(_) => Vec::new(),
            };
            for to in receivers {
                for packet in self.engines[to.index()].on_frame(&frame.received()) {
                    self.delivered.push((to, packet));
                }
            }
        }
        frames
    }

    fn settle(&mut self) {
        for _ in 0..100 {
            if self.hop().is_empty() {
                return;
            }
        }
        panic!("network did not settle");
    }
}

fn node(id: u8) -> NodeId {
    NodeId::new(id).unwrap()
}

fn data(dest: u8, text: &str) -> DataPacket {
    DataPacket::new(node(dest), Payload::new(text).unwrap())
}

#[test]
fn test_discovery_through_relay() {
    // 3 - 4 - 5
    let topo = Topology::from_edges(5, &[(3, 4), (4, 5)]).unwrap();
    let mut net = Net::new(topo, ProtocolConfig::default());

    let outcome = net.engine_mut(3).send_data(data(5, "*** 17 ***")).unwrap();
    assert_eq!(outcome, SendOutcome::Queued);
    assert_eq!(
        &net.engine(3).link().frames()[0].bytes[..],
        b"ROUTE_REQUEST;REQ_ID: 1;DEST: 5;SRC: 3;"
    );

    // RREQ 3 -> 4, re-broadcast 4 -> {3, 5}
    net.hop();
    net.hop();
    let reply = &net.engine(5).link().frames()[0];
    assert_eq!(reply.channel, RREP_CHANNEL);
    assert_eq!(reply.dest, Some(node(4)));
    assert_eq!(
        RouteReply::decode(&reply.bytes).unwrap(),
        RouteReply {
            req_id: RequestId::new(1).unwrap(),
            dest: node(5),
            src: node(3),
            hops: 0
        }
    );

    // RREP 5 -> 4 -> 3
    net.hop();
    net.hop();
    let route = net.engine(3).routing_table().entry(node(5)).unwrap();
    assert!(route.valid);
    assert_eq!(route.next_hop, Some(node(4)));
    assert_eq!(route.hop_count, 1);
    assert!(net.engine(3).queued().is_empty());

    // The relay cached its own route to the destination
    assert_eq!(net.engine(4).next_hop(node(5)), Some(node(5)));

    net.settle();
    assert_eq!(net.delivered, vec![(node(5), data(5, "*** 17 ***"))]);
    assert_eq!(net.engine(4).stats().data_relayed, 1);
}

#[test]
fn test_reply_fans_out_to_every_waiting_neighbor() {
    //  1 - 5
    //       \
    //        4 - 9
    //       /
    //  2 - 6
    let topo = Topology::from_edges(9, &[(1, 5), (5, 4), (2, 6), (6, 4), (4, 9)]).unwrap();
    let mut net = Net::new(topo, ProtocolConfig::default());

    // Both sources use request id 1 for destination 9
    net.engine_mut(1).send_data(data(9, "from one")).unwrap();
    net.engine_mut(2).send_data(data(9, "from two")).unwrap();

    net.hop(); // sources -> 5, 6
    net.hop(); // 5, 6 -> 4
    let waiting: Vec<NodeId> = net.engine(4).discoveries().iter().map(|d| d.snd).collect();
    assert_eq!(waiting, vec![node(5), node(6)]);

    net.hop(); // 4 -> 5, 6, 9; node 9 answers both requests
    net.hop(); // first RREP improves 4's route and is forwarded to both waiters

    let replies: Vec<(Option<NodeId>, RouteReply)> = net
        .engine(4)
        .link()
        .frames()
        .iter()
        .filter(|f| f.channel == RREP_CHANNEL)
        .map(|f| (f.dest, RouteReply::decode(&f.bytes).unwrap()))
        .collect();
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0].0, Some(node(5)));
    assert_eq!(replies[1].0, Some(node(6)));
    for (_, reply) in &replies {
        assert_eq!(reply.hops, 1);
        assert_eq!(reply.dest, node(9));
    }
    assert_eq!(net.engine(4).stats().replies_rejected, 1);
    assert!(net.engine(4).discoveries().is_empty());

    net.settle();
    assert_eq!(net.engine(1).next_hop(node(9)), Some(node(5)));
    assert_eq!(net.engine(2).next_hop(node(9)), Some(node(6)));
    assert_eq!(net.delivered.len(), 2);
    assert!(net.delivered.iter().all(|(to, _)| *to == node(9)));
}

#[test]
fn test_duplicate_flood_relayed_once() {
    //    2
    //   / \
    //  1   4 - 5
    //   \ /
    //    3
    let topo = Topology::from_edges(5, &[(1, 2), (1, 3), (2, 4), (3, 4), (4, 5)]).unwrap();
    let mut net = Net::new(topo, ProtocolConfig::default());
    net.engine_mut(1).send_data(data(5, "x")).unwrap();

    net.settle();
    let node4 = net.engine(4).stats();
    assert_eq!(node4.requests_forwarded, 1);
    assert_eq!(node4.duplicates_dropped, 1);
    assert_eq!(net.engine(1).routing_table().entry(node(5)).unwrap().hop_count, 2);
    assert_eq!(net.delivered.len(), 1);
}

#[test]
fn test_route_lifetime_counts_ticks() {
    let topo = Topology::line(2).unwrap();
    let config = ProtocolConfig::default().with_route_expiration_time(2);
    let mut net = Net::new(topo, config);
    net.engine_mut(1).send_data(data(2, "x")).unwrap();
    net.settle();
    assert_eq!(net.engine(1).routing_table().entry(node(2)).unwrap().age, 2);

    net.engine_mut(1).tick();
    let entry = *net.engine(1).routing_table().entry(node(2)).unwrap();
    assert!(entry.valid);
    assert_eq!(entry.age, 1);

    net.engine_mut(1).tick();
    let entry = *net.engine(1).routing_table().entry(node(2)).unwrap();
    assert!(!entry.valid);
    assert_eq!(entry.hop_count, HOP_INFINITY);
    assert_eq!(entry.next_hop, None);
    assert_eq!(net.engine(1).stats().routes_expired, 1);
}

#[test]
fn test_unroutable_data_times_out_and_frees_slot() {
    // Node 1 has no neighbors at all
    let topo = Topology::isolated(3).unwrap();
    let config = ProtocolConfig::default().with_queue_capacity(1);
    let mut net = Net::new(topo, config);

    net.engine_mut(1).send_data(data(3, "lost")).unwrap();
    assert_eq!(
        net.engine_mut(1).send_data(data(2, "full")).unwrap(),
        SendOutcome::QueueFull
    );

    for _ in 0..5 {
        net.engine_mut(1).tick();
    }
    assert_eq!(net.engine(1).queued().len(), 1);
    assert_eq!(net.engine(1).queued()[0].age, 0);

    net.engine_mut(1).tick();
    assert!(net.engine(1).queued().is_empty());
    assert_eq!(net.engine(1).stats().data_timeouts, 1);

    assert_eq!(
        net.engine_mut(1).send_data(data(3, "again")).unwrap(),
        SendOutcome::Queued
    );
}

#[test]
fn test_relay_reuses_cached_route() {
    // 1 - 2 - 3
    let topo = Topology::line(3).unwrap();
    let mut net = Net::new(topo, ProtocolConfig::default());

    net.engine_mut(1).send_data(data(3, "first")).unwrap();
    net.settle();
    assert_eq!(net.engine(2).next_hop(node(3)), Some(node(3)));

    // The relay learned the route from the passing reply
    let outcome = net.engine_mut(2).send_data(data(3, "second")).unwrap();
    assert_eq!(outcome, SendOutcome::Sent { next_hop: node(3) });
    assert_eq!(net.engine(2).stats().requests_originated, 0);

    net.settle();
    assert_eq!(net.delivered.len(), 2);
    assert_eq!(net.delivered[1], (node(3), data(3, "second")));
}

#[test]
fn test_queued_data_for_other_destination_waits() {
    // 1 - 2 - 3 - 4; node 4 is cut off so its discovery never completes
    let topo = Topology::from_edges(4, &[(1, 2), (2, 3)]).unwrap();
    let mut net = Net::new(topo, ProtocolConfig::default());

    net.engine_mut(1).send_data(data(4, "stuck")).unwrap();
    net.engine_mut(1).send_data(data(3, "ok")).unwrap();
    net.settle();

    assert_eq!(net.delivered, vec![(node(3), data(3, "ok"))]);
    let queued = net.engine(1).queued();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].packet.dest, node(4));
}
