//! # Interaction Extractor
//!
//! Folds a stream of blocks into, per external account, the set of contracts
//! it called directly. Contract creations (no `to`) and plain value
//! transfers (gas limit of exactly 21000, or empty calldata) are skipped.
//!
//! Memory grows with the number of distinct (sender, contract) pairs, never
//! with the number of transactions, so block ranges of any length can be
//! streamed through [`InteractionExtractor::process_block`] one block at a
//! time.
//!
//! Alongside the sets, the extractor sums the gas limit of every qualifying
//! transaction per receiver, which the gas-cutoff graph policy needs.

use crate::error::Result;
use crate::export::InteractionRecord;
use crate::observer::ProgressObserver;
use crate::types::{Block, Transaction, TRANSFER_GAS};
use ethers::types::Address;
use indexmap::{IndexMap, IndexSet};

/// Counters describing an extraction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub blocks: usize,
    pub senders: usize,
    /// Distinct (sender, contract) pairs.
    pub total_interactions: u64,
    pub distinct_contracts: usize,
}

/// Result of an extraction pass.
///
/// Iteration order follows first appearance in the input, so identical
/// input always yields identical iteration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interactions {
    senders: IndexMap<Address, IndexSet<Address>>,
    receiver_gas: IndexMap<Address, u64>,
    total_interactions: u64,
    blocks: usize,
}

impl Interactions {
    /// Every sender with the set of contracts it called.
    pub fn senders(&self) -> impl Iterator<Item = (&Address, &IndexSet<Address>)> {
        self.senders.iter()
    }

    pub fn receivers_of(&self, sender: &Address) -> Option<&IndexSet<Address>> {
        self.senders.get(sender)
    }

    /// Aggregate gas of all qualifying transactions sent to each contract.
    pub fn gas_by_receiver(&self) -> &IndexMap<Address, u64> {
        &self.receiver_gas
    }

    pub fn receiver_gas(&self, receiver: &Address) -> Option<u64> {
        self.receiver_gas.get(receiver).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    pub fn stats(&self) -> ExtractionStats {
        ExtractionStats {
            blocks: self.blocks,
            senders: self.senders.len(),
            total_interactions: self.total_interactions,
            distinct_contracts: self.receiver_gas.len(),
        }
    }

    /// Fold another pass into this one. Set union and gas sums commute, so
    /// the result does not depend on which side was extracted first (up to
    /// iteration order).
    pub fn merge(&mut self, other: Interactions) {
        for (sender, receivers) in other.senders {
            let set = self.senders.entry(sender).or_default();
            for receiver in receivers {
                if set.insert(receiver) {
                    self.total_interactions += 1;
                }
            }
        }
        for (receiver, gas) in other.receiver_gas {
            let total = self.receiver_gas.entry(receiver).or_insert(0);
            *total = total.saturating_add(gas);
        }
        self.blocks += other.blocks;
    }
}

/// Incremental builder for [`Interactions`].
#[derive(Debug, Default)]
pub struct InteractionExtractor {
    interactions: Interactions,
}

impl InteractionExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process_block(&mut self, block: &Block) {
        for tx in &block.transactions {
            self.process_transaction(tx);
        }
        self.interactions.blocks += 1;
    }

    /// Returns `true` if the transaction counted as a contract call.
    pub fn process_transaction(&mut self, tx: &Transaction) -> bool {
        match tx.contract_call() {
            Some(receiver) => {
                self.record(tx.from, receiver, tx.gas);
                true
            }
            None => false,
        }
    }

    /// Ingest a row of an interaction export. Rows carrying the plain
    /// transfer gas limit are skipped; calldata is not part of the export.
    pub fn process_record(&mut self, record: &InteractionRecord) -> bool {
        if record.gas == TRANSFER_GAS {
            return false;
        }
        self.record(record.from, record.to, record.gas);
        true
    }

    fn record(&mut self, sender: Address, receiver: Address, gas: u64) {
        let gas_total = self.interactions.receiver_gas.entry(receiver).or_insert(0);
        *gas_total = gas_total.saturating_add(gas);

        if self
            .interactions
            .senders
            .entry(sender)
            .or_default()
            .insert(receiver)
        {
            self.interactions.total_interactions += 1;
        }
    }

    pub fn stats(&self) -> ExtractionStats {
        self.interactions.stats()
    }

    pub fn finish(self) -> Interactions {
        self.interactions
    }
}

/// Run a full extraction pass over `blocks`. The first error aborts the pass
/// and discards everything accumulated so far.
pub fn extract_interactions<I, O>(blocks: I, observer: &mut O) -> Result<Interactions>
where
    I: IntoIterator<Item = Result<Block>>,
    O: ProgressObserver + ?Sized,
{
    let mut extractor = InteractionExtractor::new();
    for (index, block) in blocks.into_iter().enumerate() {
        let block = block?;
        observer.on_block_processed(index, block.number);
        extractor.process_block(&block);
    }
    let interactions = extractor.finish();
    observer.on_extraction_complete(&interactions.stats());
    Ok(interactions)
}

/// Build [`Interactions`] from rows of an interaction export.
pub fn interactions_from_records<I, O>(records: I, observer: &mut O) -> Result<Interactions>
where
    I: IntoIterator<Item = Result<InteractionRecord>>,
    O: ProgressObserver + ?Sized,
{
    let mut extractor = InteractionExtractor::new();
    for record in records {
        extractor.process_record(&record?);
    }
    let interactions = extractor.finish();
    observer.on_extraction_complete(&interactions.stats());
    Ok(interactions)
}
