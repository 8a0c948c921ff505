//! Integration tests for timestamp to block resolution
//!
//! Runs the locator against in-memory chains with regular, irregular and
//! duplicated block timestamps.

use async_trait::async_trait;
use contract_graph::block_source::BlockSource;
use contract_graph::error::{GraphError, Result};
use contract_graph::observer::ProgressObserver;
use contract_graph::{Block, BlockTimeLocator};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Chain where block `n` has timestamp `timestamps[n]`; the last block is
/// the head.
struct MockChain {
    timestamps: Vec<u64>,
    fetches: AtomicUsize,
}

impl MockChain {
    fn new(timestamps: Vec<u64>) -> Self {
        Self {
            timestamps,
            fetches: AtomicUsize::new(0),
        }
    }

    /// `len` blocks, `interval` seconds apart, genesis at `genesis`.
    fn regular(len: usize, genesis: u64, interval: u64) -> Self {
        Self::new((0..len as u64).map(|n| genesis + n * interval).collect())
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Reference answer by linear scan.
    fn expected(&self, target: u64) -> Option<u64> {
        self.timestamps
            .iter()
            .rposition(|ts| *ts <= target)
            .map(|n| n as u64)
    }
}

#[async_trait]
impl BlockSource for MockChain {
    async fn latest_block(&self) -> Result<Block> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let head = self.timestamps.len() as u64 - 1;
        Ok(Block::header(head, self.timestamps[head as usize]))
    }

    async fn block_by_number(&self, number: u64, _with_transactions: bool) -> Result<Block> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.timestamps
            .get(number as usize)
            .map(|ts| Block::header(number, *ts))
            .ok_or(GraphError::MissingBlock(number))
    }
}

struct FailingChain;

#[async_trait]
impl BlockSource for FailingChain {
    async fn latest_block(&self) -> Result<Block> {
        Ok(Block::header(1_000, 50_000))
    }

    async fn block_by_number(&self, _number: u64, _with_transactions: bool) -> Result<Block> {
        Err(GraphError::Rpc("connection refused".to_string()))
    }
}

#[derive(Default)]
struct ProbeRecorder {
    probes: Vec<(u64, u64)>,
}

impl ProgressObserver for ProbeRecorder {
    fn on_locator_probe(&mut self, block_number: u64, timestamp: u64) {
        self.probes.push((block_number, timestamp));
    }
}

/// Irregular intervals between 1 and 40 seconds.
fn irregular_timestamps(len: usize) -> Vec<u64> {
    let mut ts = 1_600_000_000;
    (0..len as u64)
        .map(|n| {
            ts += 1 + (n * 7919) % 40;
            ts
        })
        .collect()
}

#[tokio::test]
async fn test_locate_matches_linear_scan_on_irregular_chain() {
    let chain = MockChain::new(irregular_timestamps(2_000));
    let first = chain.timestamps[0];
    let last = *chain.timestamps.last().unwrap();
    let expected: Vec<_> = (first..=last + 50)
        .step_by(37)
        .map(|t| (t, chain.expected(t)))
        .collect();

    let locator = BlockTimeLocator::new(chain);
    for (target, expected) in expected {
        let found = locator.locate(target).await.unwrap().map(|b| b.number);
        assert_eq!(found, expected, "target {}", target);
    }
}

#[tokio::test]
async fn test_locate_exact_timestamp_returns_that_block() {
    let chain = MockChain::regular(500, 1_000_000, 13);
    let locator = BlockTimeLocator::new(chain);

    let block = locator.locate(1_000_000 + 13 * 321).await.unwrap().unwrap();
    assert_eq!(block.number, 321);

    // One second before the next block still resolves to the same block
    let block = locator.locate(1_000_000 + 13 * 322 - 1).await.unwrap().unwrap();
    assert_eq!(block.number, 321);
}

#[tokio::test]
async fn test_locate_is_monotonic() {
    let locator = BlockTimeLocator::new(MockChain::new(irregular_timestamps(800)));
    let first = locator.source().timestamps[0];
    let last = *locator.source().timestamps.last().unwrap();

    let mut previous = 0;
    for target in (first..last).step_by(11) {
        let number = locator.locate(target).await.unwrap().unwrap().number;
        assert!(number >= previous, "target {} went back to #{}", target, number);
        previous = number;
    }
}

#[tokio::test]
async fn test_target_after_head_returns_head_with_single_fetch() {
    let chain = MockChain::regular(100, 1_000, 12);
    let head_ts = *chain.timestamps.last().unwrap();
    let locator = BlockTimeLocator::new(chain);

    let block = locator.locate(head_ts + 3_600).await.unwrap().unwrap();
    assert_eq!(block.number, 99);
    assert_eq!(locator.source().fetches(), 1);

    let block = locator.locate(head_ts).await.unwrap().unwrap();
    assert_eq!(block.number, 99);
}

#[tokio::test]
async fn test_target_before_genesis_is_not_found() {
    let locator = BlockTimeLocator::new(MockChain::regular(300, 1_000_000, 13));

    assert!(locator.locate(999_999).await.unwrap().is_none());
    assert!(locator.locate(0).await.unwrap().is_none());
    assert_eq!(locator.locate(1_000_000).await.unwrap().unwrap().number, 0);
}

#[tokio::test]
async fn test_equal_timestamps_resolve_to_latest_block() {
    // Blocks 3..=6 share a timestamp
    let chain = MockChain::new(vec![100, 110, 120, 130, 130, 130, 130, 140, 150, 160]);
    let locator = BlockTimeLocator::new(chain);

    assert_eq!(locator.locate(130).await.unwrap().unwrap().number, 6);
    assert_eq!(locator.locate(135).await.unwrap().unwrap().number, 6);
    assert_eq!(locator.locate(129).await.unwrap().unwrap().number, 2);
}

#[tokio::test]
async fn test_regular_chain_needs_few_probes() {
    let chain = MockChain::regular(100_000, 1_500_000_000, 13);
    let locator = BlockTimeLocator::new(chain);
    let mut recorder = ProbeRecorder::default();

    let target = 1_500_000_000 + 13 * 42_424 + 5;
    let block = locator
        .locate_observed(target, &mut recorder)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(block.number, 42_424);
    assert!(
        locator.source().fetches() <= 8,
        "took {} fetches",
        locator.source().fetches()
    );
    // Every fetch is reported, head first
    assert_eq!(recorder.probes.len(), locator.source().fetches());
    assert_eq!(recorder.probes[0], (99_999, 1_500_000_000 + 13 * 99_999));
}

#[tokio::test]
async fn test_slow_chain_walks_back_past_target() {
    // Blocks every 60s: the 13s estimate undershoots and the walk must
    // still end before the target
    let chain = MockChain::regular(5_000, 2_000_000, 60);
    let expected = chain.expected(2_000_000 + 60 * 1_234 + 59);
    let locator = BlockTimeLocator::new(chain);

    let found = locator.locate(2_000_000 + 60 * 1_234 + 59).await.unwrap();
    assert_eq!(found.map(|b| b.number), expected);
}

#[tokio::test]
async fn test_fetch_failure_aborts_search() {
    let locator = BlockTimeLocator::new(FailingChain);

    let result = locator.locate(10_000).await;
    assert!(matches!(result, Err(GraphError::Rpc(_))));

    // Head satisfies the target, no further fetch happens
    assert!(locator.locate(60_000).await.unwrap().is_some());
}
