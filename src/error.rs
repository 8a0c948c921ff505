use std::path::PathBuf;

/// Errors raised while fetching, loading or aggregating block data.
///
/// "Block not found for a timestamp" is not an error: the locator reports it
/// as `Ok(None)` so the caller can decide whether it is fatal.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("RPC request failed: {0}")]
    Rpc(String),
    #[error("Block {0} is not available from the node")]
    MissingBlock(u64),
    #[error("Malformed block file {}: {source}", path.display())]
    MalformedBlock {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid record on line {line}: {reason}")]
    InvalidRecord { line: usize, reason: String },
    #[error("Invalid selection policy: {0}")]
    InvalidPolicy(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GraphError>;
