//! # Graph Builder
//!
//! Turns per-sender interaction sets into an undirected contract graph.
//!
//! ## Construction
//!
//! Every unordered pair of distinct contracts called by the same sender is a
//! candidate edge. A kept candidate increments the weight of its edge by
//! one, so an edge's weight is the number of senders that called both of its
//! endpoints (and whose pair survived the policy). Nodes exist only for
//! contracts that appear in at least one kept edge.
//!
//! ## Selection policies
//!
//! - [`SelectionPolicy::Exhaustive`]: keep every candidate.
//! - [`SelectionPolicy::Sampled`]: keep each candidate independently with a
//!   fixed probability, drawn from the builder's injected RNG.
//! - [`SelectionPolicy::GasCutoff`]: keep only contracts in the smallest set
//!   of highest-gas receivers covering `fraction` of all gas; a candidate is
//!   kept when both endpoints are in that set. Surviving nodes get a `width`
//!   attribute of `sqrt(gas / 1_000_000)`.
//!
//! ## Determinism
//!
//! Iteration follows the insertion order of [`Interactions`], and the only
//! randomness comes from the builder's RNG. The same input with the same
//! seed always produces the same graph.

use crate::error::{GraphError, Result};
use crate::interaction_extractor::Interactions;
use crate::observer::{NoopObserver, ProgressObserver};
use ethers::types::Address;
use indexmap::IndexMap;
use itertools::Itertools;
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const DEFAULT_EDGE_PROBABILITY: f64 = 0.3;
pub const DEFAULT_GAS_CUTOFF: f64 = 0.2;

/// Gas units per "million gas", the unit of the `width` node attribute.
const WIDTH_GAS_UNIT: f64 = 1_000_000.0;

/// Which candidate edges make it into the graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionPolicy {
    Exhaustive,
    Sampled { probability: f64 },
    GasCutoff { fraction: f64 },
}

impl SelectionPolicy {
    /// Sampling with the default probability of 0.3.
    pub fn sampled() -> Self {
        SelectionPolicy::Sampled {
            probability: DEFAULT_EDGE_PROBABILITY,
        }
    }

    /// Gas cutoff with the default fraction of 0.2.
    pub fn gas_cutoff() -> Self {
        SelectionPolicy::GasCutoff {
            fraction: DEFAULT_GAS_CUTOFF,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let (name, value) = match *self {
            SelectionPolicy::Exhaustive => return Ok(()),
            SelectionPolicy::Sampled { probability } => ("probability", probability),
            SelectionPolicy::GasCutoff { fraction } => ("cutoff fraction", fraction),
        };
        if !(0.0..=1.0).contains(&value) {
            return Err(GraphError::InvalidPolicy(format!(
                "{} must be within [0, 1], got {}",
                name, value
            )));
        }
        Ok(())
    }
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        SelectionPolicy::Exhaustive
    }
}

/// Unordered pair of distinct addresses, stored with the lower address
/// first so that `(a, b)` and `(b, a)` are the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    low: Address,
    high: Address,
}

impl EdgeKey {
    /// `None` for a self-loop.
    pub fn new(a: Address, b: Address) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Some(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn endpoints(&self) -> (Address, Address) {
        (self.low, self.high)
    }
}

/// Node attributes, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    attributes: IndexMap<String, String>,
}

impl Node {
    pub fn attributes(&self) -> &IndexMap<String, String> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Set attributes, overwriting same-named ones and keeping the rest.
    pub fn merge_attributes<I, K, V>(&mut self, attributes: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in attributes {
            self.attributes.insert(name.into(), value.into());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub weight: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    /// `None` when the graph has no nodes.
    pub edges_per_node: Option<f64>,
}

/// Contract interaction graph.
#[derive(Debug, Clone, Default)]
pub struct ContractGraph {
    nodes: IndexMap<Address, Node>,
    edges: IndexMap<EdgeKey, Edge>,
}

impl ContractGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the weight of edge `(a, b)`, creating it and its endpoint
    /// nodes on first use. Self-loops are ignored and return `false`.
    pub fn add_edge(&mut self, a: Address, b: Address) -> bool {
        let Some(key) = EdgeKey::new(a, b) else {
            return false;
        };
        self.nodes.entry(key.low).or_default();
        self.nodes.entry(key.high).or_default();
        self.edges.entry(key).or_insert(Edge { weight: 0 }).weight += 1;
        true
    }

    /// Merge attributes into an existing node. Unknown addresses are ignored,
    /// nodes only come into existence through [`add_edge`](Self::add_edge).
    pub fn merge_node_attributes<I, K, V>(&mut self, address: &Address, attributes: I) -> bool
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        match self.nodes.get_mut(address) {
            Some(node) => {
                node.merge_attributes(attributes);
                true
            }
            None => false,
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&Address, &Node)> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = (&EdgeKey, &Edge)> {
        self.edges.iter()
    }

    pub fn node(&self, address: &Address) -> Option<&Node> {
        self.nodes.get(address)
    }

    /// Weight of edge `(a, b)` in either order.
    pub fn edge_weight(&self, a: Address, b: Address) -> Option<u64> {
        EdgeKey::new(a, b)
            .and_then(|key| self.edges.get(&key))
            .map(|edge| edge.weight)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn stats(&self) -> GraphStats {
        let nodes = self.nodes.len();
        let edges = self.edges.len();
        GraphStats {
            nodes,
            edges,
            edges_per_node: (nodes > 0).then(|| edges as f64 / nodes as f64),
        }
    }
}

/// Builds a [`ContractGraph`] under one [`SelectionPolicy`].
///
/// The RNG is only consulted by [`SelectionPolicy::Sampled`]; inject a seeded
/// one for reproducible output.
pub struct GraphBuilder<R: Rng = StdRng> {
    policy: SelectionPolicy,
    rng: R,
}

impl GraphBuilder<StdRng> {
    /// Builder with an entropy-seeded RNG. Only [`SelectionPolicy::Sampled`]
    /// draws from it; other policies give the same graph for any seed.
    pub fn new(policy: SelectionPolicy) -> Result<Self> {
        Self::with_rng(policy, StdRng::from_entropy())
    }

    /// Builder whose sampling is reproducible from `seed`.
    pub fn seeded(policy: SelectionPolicy, seed: u64) -> Result<Self> {
        Self::with_rng(policy, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> GraphBuilder<R> {
    pub fn with_rng(policy: SelectionPolicy, rng: R) -> Result<Self> {
        policy.validate()?;
        Ok(Self { policy, rng })
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    pub fn build(&mut self, interactions: &Interactions) -> ContractGraph {
        self.build_observed(interactions, &mut NoopObserver)
    }

    pub fn build_observed<O: ProgressObserver + ?Sized>(
        &mut self,
        interactions: &Interactions,
        observer: &mut O,
    ) -> ContractGraph {
        let policy = self.policy;
        let retained = match policy {
            SelectionPolicy::GasCutoff { fraction } => {
                let retained = select_gas_receivers(interactions.gas_by_receiver(), fraction);
                debug!(
                    "gas cutoff {} retains {} of {} contracts",
                    fraction,
                    retained.len(),
                    interactions.gas_by_receiver().len()
                );
                Some(retained)
            }
            _ => None,
        };

        let mut graph = ContractGraph::new();
        for (index, (_, receivers)) in interactions.senders().enumerate() {
            let candidates: Vec<Address> = match &retained {
                Some(retained) => receivers
                    .iter()
                    .filter(|r| retained.contains_key(*r))
                    .copied()
                    .collect(),
                None => receivers.iter().copied().collect(),
            };

            for (a, b) in candidates.iter().tuple_combinations() {
                if let SelectionPolicy::Sampled { probability } = policy {
                    if !self.rng.gen_bool(probability) {
                        continue;
                    }
                }
                graph.add_edge(*a, *b);
                if let Some(retained) = &retained {
                    for address in [a, b] {
                        let width = node_width(retained[address]);
                        graph.merge_node_attributes(address, [("width", format!("{:?}", width))]);
                    }
                }
            }
            observer.on_sender_processed(index + 1, graph.edge_count());
        }

        let stats = graph.stats();
        if stats.edges_per_node.is_none() {
            warn!("graph has no nodes, edges per node is undefined");
        }
        observer.on_graph_built(&stats);
        graph
    }
}

/// Smallest set of highest-gas receivers whose combined gas is at least
/// `fraction` of the total, with each receiver's gas.
///
/// Receivers are ranked by gas, ties broken by address (higher address ranks
/// higher). Walking down the ranking, a receiver is retained while the gas of
/// the receivers ranked above it is still below `fraction * total`.
pub fn select_gas_receivers(
    gas_by_receiver: &IndexMap<Address, u64>,
    fraction: f64,
) -> IndexMap<Address, u64> {
    let mut ranked: Vec<(Address, u64)> = gas_by_receiver
        .iter()
        .map(|(address, gas)| (*address, *gas))
        .collect();
    ranked.sort_by(|(a1, g1), (a2, g2)| g2.cmp(g1).then(a2.cmp(a1)));

    let total: u128 = ranked.iter().map(|(_, gas)| *gas as u128).sum();
    let threshold = fraction * total as f64;

    let mut retained = IndexMap::new();
    let mut covered: u128 = 0;
    for (address, gas) in ranked {
        if covered as f64 >= threshold {
            break;
        }
        retained.insert(address, gas);
        covered += gas as u128;
    }
    retained
}

fn node_width(gas: u64) -> f64 {
    (gas as f64 / WIDTH_GAS_UNIT).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction_extractor::InteractionExtractor;
    use crate::types::Transaction;
    use ethers::types::{Bytes, H256};

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn interactions(calls: &[(u8, u8, u64)]) -> Interactions {
        let mut extractor = InteractionExtractor::new();
        for &(from, to, gas) in calls {
            extractor.process_transaction(&Transaction {
                hash: H256::zero(),
                from: addr(from),
                to: Some(addr(to)),
                gas,
                input: Bytes::from(vec![0x01]),
            });
        }
        extractor.finish()
    }

    fn gas_map(entries: &[(u8, u64)]) -> IndexMap<Address, u64> {
        entries.iter().map(|&(a, g)| (addr(a), g)).collect()
    }

    #[test]
    fn test_edge_key_is_symmetric() {
        let key = EdgeKey::new(addr(2), addr(1)).unwrap();
        assert_eq!(Some(key), EdgeKey::new(addr(1), addr(2)));
        assert_eq!(key.endpoints(), (addr(1), addr(2)));
        assert_eq!(EdgeKey::new(addr(3), addr(3)), None);
    }

    #[test]
    fn test_add_edge_creates_nodes_and_counts() {
        let mut graph = ContractGraph::new();
        assert!(graph.add_edge(addr(1), addr(2)));
        assert!(graph.add_edge(addr(2), addr(1)));
        assert!(!graph.add_edge(addr(3), addr(3)));

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_weight(addr(1), addr(2)), Some(2));
        assert!(graph.node(&addr(3)).is_none());
    }

    #[test]
    fn test_node_attributes_merge() {
        let mut graph = ContractGraph::new();
        graph.add_edge(addr(1), addr(2));
        graph.merge_node_attributes(&addr(1), [("width", "1.5"), ("label", "router")]);
        graph.merge_node_attributes(&addr(1), [("width", "2")]);
        assert!(!graph.merge_node_attributes(&addr(9), [("width", "1")]));

        let node = graph.node(&addr(1)).unwrap();
        assert_eq!(node.attribute("width"), Some("2"));
        assert_eq!(node.attribute("label"), Some("router"));
    }

    #[test]
    fn test_exhaustive_pair_count_per_sender() {
        // One sender, four contracts -> 4 * 3 / 2 pairs
        let input = interactions(&[
            (0xa1, 1, 50_000),
            (0xa1, 2, 50_000),
            (0xa1, 3, 50_000),
            (0xa1, 4, 50_000),
        ]);
        let graph = GraphBuilder::seeded(SelectionPolicy::Exhaustive, 0)
            .unwrap()
            .build(&input);
        assert_eq!(graph.edge_count(), 6);
        assert!(graph.edges().all(|(_, edge)| edge.weight == 1));
    }

    #[test]
    fn test_weight_counts_senders() {
        let input = interactions(&[
            (0xa1, 1, 50_000),
            (0xa1, 2, 50_000),
            (0xa2, 2, 50_000),
            (0xa2, 1, 50_000),
            (0xa3, 1, 50_000),
            (0xa3, 2, 50_000),
            (0xa3, 3, 50_000),
        ]);
        let graph = GraphBuilder::seeded(SelectionPolicy::Exhaustive, 0)
            .unwrap()
            .build(&input);
        assert_eq!(graph.edge_weight(addr(1), addr(2)), Some(3));
        assert_eq!(graph.edge_weight(addr(3), addr(1)), Some(1));
        assert_eq!(graph.edge_weight(addr(2), addr(3)), Some(1));
    }

    #[test]
    fn test_sampling_extremes() {
        let calls: Vec<(u8, u8, u64)> = (1..=8u8)
            .flat_map(|c| [(0xa1, c, 50_000), (0xa2, c, 50_000)])
            .collect();
        let input = interactions(&calls);

        let exhaustive = GraphBuilder::seeded(SelectionPolicy::Exhaustive, 7)
            .unwrap()
            .build(&input);
        let always = GraphBuilder::seeded(SelectionPolicy::Sampled { probability: 1.0 }, 7)
            .unwrap()
            .build(&input);
        let never = GraphBuilder::seeded(SelectionPolicy::Sampled { probability: 0.0 }, 7)
            .unwrap()
            .build(&input);

        assert_eq!(always.edge_count(), exhaustive.edge_count());
        for (key, edge) in exhaustive.edges() {
            let (a, b) = key.endpoints();
            assert_eq!(always.edge_weight(a, b), Some(edge.weight));
        }
        assert_eq!(never.edge_count(), 0);
        assert_eq!(never.node_count(), 0);
    }

    #[test]
    fn test_sampling_is_reproducible_with_seed() {
        let calls: Vec<(u8, u8, u64)> = (1..=20u8).map(|c| (0xa1, c, 50_000)).collect();
        let input = interactions(&calls);

        let first = GraphBuilder::seeded(SelectionPolicy::sampled(), 42)
            .unwrap()
            .build(&input);
        let second = GraphBuilder::seeded(SelectionPolicy::sampled(), 42)
            .unwrap()
            .build(&input);

        let edges = |g: &ContractGraph| g.edges().map(|(k, e)| (*k, e.weight)).collect::<Vec<_>>();
        assert_eq!(edges(&first), edges(&second));
        // 190 candidates at p = 0.3, well away from both extremes
        assert!(first.edge_count() > 0 && first.edge_count() < 190);
    }

    #[test]
    fn test_seed_only_matters_for_sampling() {
        let calls: Vec<(u8, u8, u64)> = (1..=8u8)
            .map(|c| (0xa1, c, 100_000 * c as u64))
            .chain((4..=10u8).map(|c| (0xa2, c, 50_000)))
            .collect();
        let input = interactions(&calls);
        let edges = |g: &ContractGraph| g.edges().map(|(k, e)| (*k, e.weight)).collect::<Vec<_>>();

        for policy in [SelectionPolicy::Exhaustive, SelectionPolicy::gas_cutoff()] {
            let entropy = GraphBuilder::new(policy).unwrap().build(&input);
            let seeded = GraphBuilder::seeded(policy, 7).unwrap().build(&input);
            assert_eq!(edges(&entropy), edges(&seeded));
        }
    }

    #[test]
    fn test_invalid_policy_rejected() {
        assert!(matches!(
            GraphBuilder::seeded(SelectionPolicy::Sampled { probability: 1.5 }, 0),
            Err(GraphError::InvalidPolicy(_))
        ));
        assert!(GraphBuilder::seeded(SelectionPolicy::GasCutoff { fraction: f64::NAN }, 0).is_err());
        assert!(GraphBuilder::seeded(SelectionPolicy::GasCutoff { fraction: -0.1 }, 0).is_err());
    }

    #[test]
    fn test_select_gas_receivers_minimal_cover() {
        let gas = gas_map(&[(1, 10), (2, 20), (3, 30), (4, 40)]);

        let top = select_gas_receivers(&gas, 0.2);
        assert_eq!(top.keys().copied().collect::<Vec<_>>(), vec![addr(4)]);

        let half = select_gas_receivers(&gas, 0.5);
        assert_eq!(half.keys().copied().collect::<Vec<_>>(), vec![addr(4), addr(3)]);

        let all = select_gas_receivers(&gas, 1.0);
        assert_eq!(all.len(), 4);

        assert!(select_gas_receivers(&gas, 0.0).is_empty());
        assert!(select_gas_receivers(&IndexMap::new(), 0.5).is_empty());
    }

    #[test]
    fn test_select_gas_receivers_covering_property() {
        let gas = gas_map(&[(1, 5), (2, 95), (3, 40), (4, 40), (5, 1), (6, 300), (7, 19)]);
        let total: u64 = gas.values().sum();

        for fraction in [0.1, 0.2, 0.35, 0.5, 0.8, 0.95] {
            let retained = select_gas_receivers(&gas, fraction);
            let covered: u64 = retained.values().sum();
            let threshold = fraction * total as f64;
            assert!(covered as f64 >= threshold, "fraction {}", fraction);

            let lowest = retained.values().min().copied().unwrap();
            assert!(((covered - lowest) as f64) < threshold, "fraction {}", fraction);
        }
    }

    #[test]
    fn test_select_gas_receivers_tie_break_by_address() {
        let gas = gas_map(&[(1, 50), (2, 50)]);
        let retained = select_gas_receivers(&gas, 0.5);
        assert_eq!(retained.keys().copied().collect::<Vec<_>>(), vec![addr(2)]);
    }

    #[test]
    fn test_gas_cutoff_filters_pairs_and_sets_width() {
        // Contract 3 carries almost no gas and is cut
        let input = interactions(&[
            (0xa1, 1, 4_000_000),
            (0xa1, 2, 1_000_000),
            (0xa1, 3, 10),
            (0xa2, 1, 5_000_000),
            (0xa2, 3, 10),
        ]);
        let graph = GraphBuilder::seeded(SelectionPolicy::GasCutoff { fraction: 0.9 }, 0)
            .unwrap()
            .build(&input);

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.edge_weight(addr(1), addr(2)), Some(1));
        assert!(graph.node(&addr(3)).is_none());

        // Contract 1: 9M gas -> width 3
        assert_eq!(graph.node(&addr(1)).unwrap().attribute("width"), Some("3.0"));
        assert_eq!(graph.node(&addr(2)).unwrap().attribute("width"), Some("1.0"));
    }

    #[test]
    fn test_empty_input_yields_empty_graph() {
        let graph = GraphBuilder::seeded(SelectionPolicy::gas_cutoff(), 0)
            .unwrap()
            .build(&Interactions::default());
        assert!(graph.is_empty());
        assert_eq!(graph.stats().edges_per_node, None);
    }
}
