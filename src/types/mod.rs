//! Value types shared by every stage of the pipeline.

pub mod block;
pub mod conversions;

pub use block::{Block, Transaction, TRANSFER_GAS};
