//! # Contract Graph
//!
//! Derives an undirected, weighted graph of smart contracts from raw Ethereum
//! blocks: two contracts are linked when at least one external account
//! called both of them directly. Edge weight counts those accounts.
//!
//! ## Pipeline
//!
//! Data flows strictly forward, one pass per run:
//!
//! ### Location
//! [`block_locator`] resolves wall-clock timestamps to block numbers through
//! a [`block_source::BlockSource`], so a time window becomes a block range.
//!
//! ### Extraction
//! [`interaction_extractor`] folds a lazy sequence of blocks (from the node
//! or from a [`block_store`] directory) into per-sender sets of called
//! contracts, skipping value transfers and contract creations.
//!
//! ### Graph
//! [`graph_builder`] turns interaction sets into nodes and weighted edges
//! under an exhaustive, sampled, or gas-cutoff selection policy, and
//! [`dot_writer`] streams the result as a DOT `strict graph`.
//!
//! ### Exports
//! [`export`] writes the intermediate CSV artifacts (interaction records and
//! block-range transaction records).
//!
//! Progress is reported only through [`observer::ProgressObserver`].

// Core Types
/// Block and transaction value types
pub mod types;
/// Error taxonomy
pub mod error;

// Chain Access
/// Remote block data source
pub mod block_source;
/// Timestamp to block resolution
pub mod block_locator;
/// On-disk block directory
pub mod block_store;

// Aggregation
/// Per-sender contract interaction sets
pub mod interaction_extractor;
/// Contract graph construction and selection policies
pub mod graph_builder;

// Output
/// DOT serialization
pub mod dot_writer;
/// CSV exports
pub mod export;

// Infrastructure
/// Progress checkpoints
pub mod observer;
/// Configuration management
pub mod settings;
/// Range and time parsing
pub mod utils;

// Re-exports for convenience
pub use block_locator::BlockTimeLocator;
pub use block_source::{BlockSource, RpcBlockSource};
pub use error::GraphError;
pub use graph_builder::{ContractGraph, GraphBuilder, SelectionPolicy};
pub use interaction_extractor::{InteractionExtractor, Interactions};
pub use settings::Settings;
pub use types::{Block, Transaction};
