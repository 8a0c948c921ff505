use crate::error::GraphError;
use crate::types::block::{quantity_to_u64, Block, Transaction};
use ethers::types::{Address, H256};

/// Canonical address form: `0x` followed by 40 lowercase hex digits.
pub fn address_to_string(addr: Address) -> String {
    format!("{:?}", addr).to_lowercase()
}

fn block_number<T>(block: &ethers::types::Block<T>) -> Result<u64, GraphError> {
    block
        .number
        .map(|n| n.as_u64())
        .ok_or_else(|| GraphError::Rpc("node returned a pending block".to_string()))
}

// Headers fetched without transaction details
impl TryFrom<ethers::types::Block<H256>> for Block {
    type Error = GraphError;

    fn try_from(raw: ethers::types::Block<H256>) -> Result<Self, Self::Error> {
        let number = block_number(&raw)?;
        let timestamp = quantity_to_u64(raw.timestamp, "timestamp").map_err(GraphError::Rpc)?;
        Ok(Block::header(number, timestamp))
    }
}

impl TryFrom<ethers::types::Block<ethers::types::Transaction>> for Block {
    type Error = GraphError;

    fn try_from(raw: ethers::types::Block<ethers::types::Transaction>) -> Result<Self, Self::Error> {
        let number = block_number(&raw)?;
        let timestamp = quantity_to_u64(raw.timestamp, "timestamp").map_err(GraphError::Rpc)?;
        let transactions = raw
            .transactions
            .into_iter()
            .map(|tx| {
                Ok(Transaction {
                    hash: tx.hash,
                    from: tx.from,
                    to: tx.to,
                    gas: quantity_to_u64(tx.gas, "gas").map_err(GraphError::Rpc)?,
                    input: tx.input,
                })
            })
            .collect::<Result<Vec<_>, GraphError>>()?;

        Ok(Block {
            number,
            timestamp,
            transactions,
        })
    }
}
