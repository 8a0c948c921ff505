//! # Progress Observer
//!
//! The pipeline stages never print. They report checkpoints to a
//! [`ProgressObserver`], and the caller decides what to do with them.
//! [`LogObserver`] forwards checkpoints to the `log` facade; [`NoopObserver`]
//! discards them.

use crate::graph_builder::GraphStats;
use crate::interaction_extractor::ExtractionStats;
use log::{debug, info, warn};

/// Checkpoint callbacks. Every method has an empty default so implementors
/// only override what they care about.
pub trait ProgressObserver {
    /// The locator fetched a block while narrowing the search bracket.
    fn on_locator_probe(&mut self, _block_number: u64, _timestamp: u64) {}

    /// A block was folded into the interaction set. `index` counts from 0.
    fn on_block_processed(&mut self, _index: usize, _block_number: u64) {}

    fn on_extraction_complete(&mut self, _stats: &ExtractionStats) {}

    /// Called after each sender's candidate pairs were processed.
    fn on_sender_processed(&mut self, _senders_done: usize, _edges_so_far: usize) {}

    fn on_graph_built(&mut self, _stats: &GraphStats) {}
}

/// Discards every checkpoint.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {}

/// Reports checkpoints through `log`. Per-item checkpoints are throttled to
/// one line every `every` items.
#[derive(Debug, Clone)]
pub struct LogObserver {
    every: usize,
}

impl LogObserver {
    pub fn new(every: usize) -> Self {
        Self {
            every: every.max(1),
        }
    }
}

impl Default for LogObserver {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl ProgressObserver for LogObserver {
    fn on_locator_probe(&mut self, block_number: u64, timestamp: u64) {
        debug!("probed block #{} (timestamp {})", block_number, timestamp);
    }

    fn on_block_processed(&mut self, index: usize, block_number: u64) {
        if index % self.every == 0 {
            info!("processing block {} (#{})...", index, block_number);
        }
    }

    fn on_extraction_complete(&mut self, stats: &ExtractionStats) {
        info!(
            "found {} interactions with {} contracts from {} senders in {} blocks",
            stats.total_interactions, stats.distinct_contracts, stats.senders, stats.blocks
        );
    }

    fn on_sender_processed(&mut self, senders_done: usize, edges_so_far: usize) {
        if senders_done % self.every == 0 {
            debug!("num edges: {} after {} senders", edges_so_far, senders_done);
        }
    }

    fn on_graph_built(&mut self, stats: &GraphStats) {
        match stats.edges_per_node {
            Some(ratio) => info!(
                "created {} edges between {} nodes ({:.1} per node)",
                stats.edges, stats.nodes, ratio
            ),
            None => warn!(
                "created {} edges between {} nodes (edges per node undefined)",
                stats.edges, stats.nodes
            ),
        }
    }
}
