//! # Block Source
//!
//! Remote access to chain data. The rest of the crate only needs two calls:
//! the current head block and a block by number, so that is all the
//! [`BlockSource`] trait exposes. [`RpcBlockSource`] implements it on top of
//! any ethers `Middleware`.
//!
//! Failures are returned as [`GraphError::Rpc`] or
//! [`GraphError::MissingBlock`] and are never retried here.

use crate::error::{GraphError, Result};
use crate::types::Block;
use async_trait::async_trait;
use ethers::prelude::{Http, Middleware, Provider};
use ethers::types::{BlockNumber, Transaction};
use log::debug;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Remote block data source.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Fetch the current head block (header only).
    async fn latest_block(&self) -> Result<Block>;

    /// Fetch block `number`. Transactions are only populated when
    /// `with_transactions` is set.
    async fn block_by_number(&self, number: u64, with_transactions: bool) -> Result<Block>;
}

/// [`BlockSource`] backed by a JSON-RPC node.
pub struct RpcBlockSource<M: Middleware> {
    provider: Arc<M>,
    request_timeout: Duration,
}

impl RpcBlockSource<Provider<Http>> {
    /// Connect to an HTTP JSON-RPC endpoint.
    pub fn from_url(url: &str, request_timeout: Duration) -> Result<Self> {
        let provider = Provider::<Http>::try_from(url)
            .map_err(|e| GraphError::Rpc(format!("invalid RPC url {}: {}", url, e)))?;
        Ok(Self::new(Arc::new(provider), request_timeout))
    }
}

impl<M: Middleware + 'static> RpcBlockSource<M> {
    pub fn new(provider: Arc<M>, request_timeout: Duration) -> Self {
        Self {
            provider,
            request_timeout,
        }
    }

    /// Fetch block `number` with full transaction objects, exactly as the
    /// node returns it. Used by the fetcher to persist complete blocks.
    pub async fn raw_block_with_txs(
        &self,
        number: u64,
    ) -> Result<ethers::types::Block<Transaction>> {
        let block = self
            .with_timeout("eth_getBlockByNumber", self.provider.get_block_with_txs(number))
            .await?;
        block.ok_or(GraphError::MissingBlock(number))
    }

    async fn with_timeout<T, E, F>(&self, method: &str, request: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, E>> + Send,
        E: std::fmt::Display,
    {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.request_timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(GraphError::Rpc(format!("{} failed: {}", method, e))),
            Err(_) => Err(GraphError::Rpc(format!(
                "{} timed out after {}ms",
                method,
                self.request_timeout.as_millis()
            ))),
        };
        debug!(
            "[RPC] {} -> {} in {:?}",
            method,
            if result.is_ok() { "ok" } else { "error" },
            start.elapsed()
        );
        result
    }
}

#[async_trait]
impl<M: Middleware + 'static> BlockSource for RpcBlockSource<M> {
    async fn latest_block(&self) -> Result<Block> {
        let block = self
            .with_timeout("eth_getBlockByNumber", self.provider.get_block(BlockNumber::Latest))
            .await?
            .ok_or_else(|| GraphError::Rpc("node returned no latest block".to_string()))?;
        Block::try_from(block)
    }

    async fn block_by_number(&self, number: u64, with_transactions: bool) -> Result<Block> {
        if with_transactions {
            return Block::try_from(self.raw_block_with_txs(number).await?);
        }
        let block = self
            .with_timeout("eth_getBlockByNumber", self.provider.get_block(number))
            .await?
            .ok_or(GraphError::MissingBlock(number))?;
        Block::try_from(block)
    }
}
