//! # Block Time Locator
//!
//! Resolves a wall-clock timestamp to the latest block whose timestamp is at
//! or before it, using only "latest block" and "block by number" lookups.
//!
//! ## Algorithm
//!
//! 1. Fetch the head block. If it is not after the target, it is the answer.
//! 2. Walk backwards by an estimate of how many blocks cover the time
//!    deficit (deficit / average block interval, inflated by a safety factor
//!    so the guess lands before the target). Repeat until a block at or
//!    before the target is found, or block 0 is still too late.
//! 3. With `lower.timestamp <= target < upper.timestamp`, interpolate the
//!    target's position between the two timestamps to pick the next probe,
//!    clamped strictly inside the bracket, and narrow until the bracket is
//!    one block wide.
//!
//! Each probe is one RPC call. Fetch failures abort the search.

use crate::block_source::BlockSource;
use crate::error::Result;
use crate::observer::{NoopObserver, ProgressObserver};
use crate::types::Block;
use log::debug;

/// Average Ethereum mainnet block interval used for the backward estimate.
pub const DEFAULT_BLOCK_INTERVAL_SECS: u64 = 13;
/// Inflation applied to the backward estimate to avoid undershooting.
pub const DEFAULT_SAFETY_FACTOR: f64 = 1.3;

pub struct BlockTimeLocator<S: BlockSource> {
    source: S,
    block_interval_secs: u64,
    safety_factor: f64,
}

impl<S: BlockSource> BlockTimeLocator<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            block_interval_secs: DEFAULT_BLOCK_INTERVAL_SECS,
            safety_factor: DEFAULT_SAFETY_FACTOR,
        }
    }

    pub fn with_block_interval(mut self, secs: u64) -> Self {
        self.block_interval_secs = secs.max(1);
        self
    }

    pub fn with_safety_factor(mut self, factor: f64) -> Self {
        // Below 1.0 the walk could land after the target on every step.
        self.safety_factor = factor.max(1.0);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Latest block with `timestamp <= target`, or `None` if even block 0 is
    /// later than the target.
    ///
    /// A target equal to a block's timestamp resolves to that block (the
    /// last one, if several share the timestamp).
    pub async fn locate(&self, target: u64) -> Result<Option<Block>> {
        self.locate_observed(target, &mut NoopObserver).await
    }

    /// Same as [`locate`](Self::locate), reporting every fetched block.
    pub async fn locate_observed<O: ProgressObserver + ?Sized>(
        &self,
        target: u64,
        observer: &mut O,
    ) -> Result<Option<Block>> {
        let mut upper = self.source.latest_block().await?;
        observer.on_locator_probe(upper.number, upper.timestamp);
        if upper.timestamp <= target {
            return Ok(Some(upper));
        }
        if upper.number == 0 {
            return Ok(None);
        }

        let mut guess = upper
            .number
            .saturating_sub(self.blocks_for(upper.timestamp - target).max(1));
        let mut lower = loop {
            let block = self.source.block_by_number(guess, false).await?;
            observer.on_locator_probe(block.number, block.timestamp);
            if block.timestamp <= target {
                break block;
            }
            if guess == 0 {
                debug!("genesis block is later than target {}", target);
                return Ok(None);
            }
            let step = self.blocks_for(block.timestamp - target) + 1;
            upper = block;
            guess = guess.saturating_sub(step);
        };

        while upper.number - lower.number > 1 {
            let probe = interpolate_probe(&lower, &upper, target);
            let block = self.source.block_by_number(probe, false).await?;
            observer.on_locator_probe(block.number, block.timestamp);
            if block.timestamp <= target {
                lower = block;
            } else {
                upper = block;
            }
        }

        debug!(
            "timestamp {} resolved to block #{} (timestamp {})",
            target, lower.number, lower.timestamp
        );
        Ok(Some(lower))
    }

    /// Estimated number of blocks produced in `secs` seconds, inflated by
    /// the safety factor.
    fn blocks_for(&self, secs: u64) -> u64 {
        (secs as f64 / self.block_interval_secs as f64 * self.safety_factor) as u64
    }
}

/// Next block number to probe inside the open interval `(lower, upper)`.
///
/// Requires `upper.number - lower.number >= 2`.
fn interpolate_probe(lower: &Block, upper: &Block, target: u64) -> u64 {
    let span_blocks = upper.number - lower.number;
    let probe = if upper.timestamp <= lower.timestamp {
        lower.number + span_blocks / 2
    } else {
        let elapsed = target.saturating_sub(lower.timestamp) as u128;
        let span_time = (upper.timestamp - lower.timestamp) as u128;
        lower.number + (span_blocks as u128 * elapsed / span_time) as u64
    };
    probe.clamp(lower.number + 1, upper.number - 1)
}
