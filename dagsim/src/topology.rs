//! Radio topology and link properties.

use dagtimer::{Addr, Duration};
use hashbrown::HashMap;

/// Properties of a radio link between two nodes.
#[derive(Debug, Clone)]
pub struct Link {
    /// Frame loss rate (0.0 to 1.0).
    pub loss_rate: f64,
    /// Propagation and queuing delay.
    pub delay: Duration,
    /// Extra delay drawn uniformly from `[0, jitter]` per frame.
    pub jitter: Duration,
    /// Whether the link is currently up.
    pub active: bool,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            delay: Duration::from_ticks(2),
            jitter: Duration::ZERO,
            active: true,
        }
    }
}

impl Link {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// Connectivity between nodes. Links are bidirectional.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    links: HashMap<(Addr, Addr), Link>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every node hears every other node.
    pub fn fully_connected(nodes: &[Addr]) -> Self {
        let mut topo = Self::new();
        for (i, &a) in nodes.iter().enumerate() {
            for &b in nodes.iter().skip(i + 1) {
                topo.add_link(a, b, Link::default());
            }
        }
        topo
    }

    /// Each node hears only its predecessor and successor.
    pub fn chain(nodes: &[Addr]) -> Self {
        let mut topo = Self::new();
        for pair in nodes.windows(2) {
            topo.add_link(pair[0], pair[1], Link::default());
        }
        topo
    }

    /// The first node is the hub, every other node hears only the hub.
    pub fn star(nodes: &[Addr]) -> Self {
        let mut topo = Self::new();
        let Some((&hub, spokes)) = nodes.split_first() else {
            return topo;
        };
        for &spoke in spokes {
            topo.add_link(hub, spoke, Link::default());
        }
        topo
    }

    /// Add or replace the link between `a` and `b`.
    pub fn add_link(&mut self, a: Addr, b: Addr, link: Link) {
        self.links.insert(Self::canonical_pair(a, b), link);
    }

    pub fn get_link(&self, a: Addr, b: Addr) -> Option<&Link> {
        self.links.get(&Self::canonical_pair(a, b))
    }

    pub fn get_link_mut(&mut self, a: Addr, b: Addr) -> Option<&mut Link> {
        self.links.get_mut(&Self::canonical_pair(a, b))
    }

    /// True if a link exists and is up.
    pub fn is_connected(&self, a: Addr, b: Addr) -> bool {
        self.get_link(a, b).is_some_and(|link| link.active)
    }

    /// Nodes sharing an active link with `node`, sorted.
    pub fn neighbors(&self, node: Addr) -> Vec<Addr> {
        let mut result: Vec<Addr> = self
            .links
            .iter()
            .filter(|(_, link)| link.active)
            .filter_map(|(&(a, b), _)| {
                if a == node {
                    Some(b)
                } else if b == node {
                    Some(a)
                } else {
                    None
                }
            })
            .collect();
        // Sorted so deliveries are scheduled in a deterministic order.
        result.sort_unstable();
        result
    }

    /// Apply `f` to every link.
    pub fn for_each_link(&mut self, mut f: impl FnMut(&mut Link)) {
        self.links.values_mut().for_each(|link| f(link));
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    fn canonical_pair(a: Addr, b: Addr) -> (Addr, Addr) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}
