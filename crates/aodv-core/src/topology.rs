//! Network topology
//!
//! Which nodes can hear each other. Links are symmetric. The simulator and
//! the in-process air hub both deliver a frame only to neighbors of its
//! transmitter, so multi-hop paths exist only where the topology has them.

use crate::error::{AodvError, Result};
use crate::types::NodeId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Topology shapes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TopologyKind {
    /// 1 - 2 - 3 - ... - N
    Line,
    /// Line with N connected back to 1
    Ring,
    /// Row-major grid `width` nodes wide, 4-neighborhood
    Grid { width: u8 },
    /// Every node hears every other
    Full,
    /// Random spanning tree plus extra links with the given probability
    Random { probability: f64 },
}

impl TopologyKind {
    /// Build a topology of this kind over `size` nodes
    pub fn build(&self, size: u8, seed: u64) -> Result<Topology> {
        match *self {
            TopologyKind::Line => Topology::line(size),
            TopologyKind::Ring => Topology::ring(size),
            TopologyKind::Grid { width } => Topology::grid(size, width),
            TopologyKind::Full => Topology::full(size),
            TopologyKind::Random { probability } => Topology::random(size, probability, seed),
        }
    }
}

impl FromStr for TopologyKind {
    type Err = AodvError;

    /// Parse `line`, `ring`, `grid:W`, `full` or `random:P`
    fn from_str(s: &str) -> Result<Self> {
        let (name, arg) = match s.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (s, None),
        };
        let bad = |reason: &str| AodvError::Config(format!("topology {:?}: {}", s, reason));
        match (name.to_ascii_lowercase().as_str(), arg) {
            ("line", None) => Ok(TopologyKind::Line),
            ("ring", None) => Ok(TopologyKind::Ring),
            ("full" | "mesh", None) => Ok(TopologyKind::Full),
            ("grid", Some(w)) => w
                .parse()
                .map(|width| TopologyKind::Grid { width })
                .map_err(|_| bad("grid width must be a number")),
            ("random", arg) => {
                let probability = match arg {
                    Some(p) => p.parse().map_err(|_| bad("probability must be a number"))?,
                    None => 0.2,
                };
                Ok(TopologyKind::Random { probability })
            }
            _ => Err(bad("expected line, ring, grid:W, full or random[:P]")),
        }
    }
}

impl fmt::Display for TopologyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyKind::Line => write!(f, "line"),
            TopologyKind::Ring => write!(f, "ring"),
            TopologyKind::Grid { width } => write!(f, "grid:{}", width),
            TopologyKind::Full => write!(f, "full"),
            TopologyKind::Random { probability } => write!(f, "random:{}", probability),
        }
    }
}

/// Symmetric adjacency over nodes `1..=size`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    adjacency: Vec<Vec<NodeId>>,
}

impl Topology {
    /// Nodes with no links
    pub fn isolated(size: u8) -> Result<Self> {
        check_size(size)?;
        Ok(Self {
            adjacency: vec![Vec::new(); size as usize],
        })
    }

    pub fn line(size: u8) -> Result<Self> {
        let mut topo = Self::isolated(size)?;
        for id in 1..size {
            topo.connect_raw(id, id + 1);
        }
        Ok(topo)
    }

    pub fn ring(size: u8) -> Result<Self> {
        let mut topo = Self::line(size)?;
        if size > 2 {
            topo.connect_raw(size, 1);
        }
        Ok(topo)
    }

    pub fn grid(size: u8, width: u8) -> Result<Self> {
        if width == 0 {
            return Err(AodvError::Config("grid width must be non-zero".into()));
        }
        let mut topo = Self::isolated(size)?;
        for id in 1..=size {
            let col = (id - 1) % width;
            if col + 1 < width && id < size {
                topo.connect_raw(id, id + 1);
            }
            if let Some(below) = id.checked_add(width).filter(|&b| b <= size) {
                topo.connect_raw(id, below);
            }
        }
        Ok(topo)
    }

    pub fn full(size: u8) -> Result<Self> {
        let mut topo = Self::isolated(size)?;
        for a in 1..=size {
            for b in (a + 1)..=size {
                topo.connect_raw(a, b);
            }
        }
        Ok(topo)
    }

    /// Connected random topology, reproducible from `seed`
    ///
    /// Every node after the first links to a random earlier node, then each
    /// remaining pair is linked with `probability`.
    pub fn random(size: u8, probability: f64, seed: u64) -> Result<Self> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(AodvError::Config(format!(
                "link probability must be in 0..=1, got {}",
                probability
            )));
        }
        let mut topo = Self::isolated(size)?;
        let mut rng = StdRng::seed_from_u64(seed);
        for id in 2..=size {
            let parent = rng.gen_range(1..id);
            topo.connect_raw(parent, id);
        }
        for a in 1..=size {
            for b in (a + 1)..=size {
                if rng.gen_bool(probability) {
                    topo.connect_raw(a, b);
                }
            }
        }
        Ok(topo)
    }

    /// Topology from an explicit edge list
    pub fn from_edges(size: u8, edges: &[(u8, u8)]) -> Result<Self> {
        let mut topo = Self::isolated(size)?;
        for &(a, b) in edges {
            topo.connect(NodeId::new(a)?, NodeId::new(b)?)?;
        }
        Ok(topo)
    }

    /// Add a symmetric link
    pub fn connect(&mut self, a: NodeId, b: NodeId) -> Result<()> {
        self.check(a)?;
        self.check(b)?;
        if a == b {
            return Err(AodvError::Config(format!("node {} cannot link to itself", a)));
        }
        self.link(a, b);
        Ok(())
    }

    /// Remove a link if present
    pub fn disconnect(&mut self, a: NodeId, b: NodeId) {
        if let Some(list) = self.adjacency.get_mut(a.index()) {
            list.retain(|&n| n != b);
        }
        if let Some(list) = self.adjacency.get_mut(b.index()) {
            list.retain(|&n| n != a);
        }
    }

    /// Neighbors of `id`, sorted
    pub fn neighbors(&self, id: NodeId) -> &[NodeId] {
        self.adjacency
            .get(id.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn are_neighbors(&self, a: NodeId, b: NodeId) -> bool {
        self.neighbors(a).contains(&b)
    }

    /// Number of nodes
    pub fn size(&self) -> u8 {
        self.adjacency.len() as u8
    }

    /// Every node id, in order
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.adjacency.len()).filter_map(|i| NodeId::from_index(i).ok())
    }

    /// Number of undirected links
    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum::<usize>() / 2
    }

    /// Undirected links as `(low, high)` pairs
    pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
        self.nodes()
            .flat_map(|a| {
                self.neighbors(a)
                    .iter()
                    .filter(move |&&b| a < b)
                    .map(move |&b| (a, b))
            })
            .collect()
    }

    /// Whether every node is reachable from node 1
    pub fn is_connected(&self) -> bool {
        if self.adjacency.is_empty() {
            return true;
        }
        let mut visited = vec![false; self.adjacency.len()];
        let mut stack = vec![0usize];
        while let Some(i) = stack.pop() {
            if visited[i] {
                continue;
            }
            visited[i] = true;
            for n in &self.adjacency[i] {
                if !visited[n.index()] {
                    stack.push(n.index());
                }
            }
        }
        visited.iter().all(|&v| v)
    }

    /// Shortest hop distance from `a` to `b`, counted in links
    pub fn distance(&self, a: NodeId, b: NodeId) -> Option<usize> {
        let mut dist = vec![None; self.adjacency.len()];
        *dist.get_mut(a.index())? = Some(0);
        let mut frontier = std::collections::VecDeque::from([a]);
        while let Some(n) = frontier.pop_front() {
            let d = dist[n.index()]?;
            if n == b {
                return Some(d);
            }
            for &m in self.neighbors(n) {
                if dist[m.index()].is_none() {
                    dist[m.index()] = Some(d + 1);
                    frontier.push_back(m);
                }
            }
        }
        None
    }

    fn check(&self, id: NodeId) -> Result<()> {
        if id.index() < self.adjacency.len() {
            Ok(())
        } else {
            Err(AodvError::NodeOutOfRange {
                id: id.get(),
                network_size: self.size(),
            })
        }
    }

    fn connect_raw(&mut self, a: u8, b: u8) {
        if let (Ok(a), Ok(b)) = (NodeId::new(a), NodeId::new(b)) {
            self.link(a, b);
        }
    }

    fn link(&mut self, a: NodeId, b: NodeId) {
        for (from, to) in [(a, b), (b, a)] {
            let list = &mut self.adjacency[from.index()];
            if let Err(pos) = list.binary_search(&to) {
                list.insert(pos, to);
            }
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.nodes().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let list: Vec<String> = self.neighbors(id).iter().map(|n| n.to_string()).collect();
            write!(f, "{:>2}: {}", id, list.join(" "))?;
        }
        Ok(())
    }
}

fn check_size(size: u8) -> Result<()> {
    if size == 0 || size > crate::types::MAX_WIRE_VALUE {
        return Err(AodvError::Config(format!(
            "topology size must be in 1..=99, got {}",
            size
        )));
    }
    Ok(())
}
