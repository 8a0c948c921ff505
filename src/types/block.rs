use ethers::types::{Address, Bytes, H256, U256, U64};
use serde::Deserialize;

/// Gas limit of a plain value transfer. Transactions with exactly this limit
/// are never counted as contract calls.
pub const TRANSFER_GAS: u64 = 21_000;

/// A block as seen by the graph pipeline.
///
/// Decodes directly from the JSON object returned by `eth_getBlockByNumber`
/// (hex quantities, full transaction objects), which is also the format of
/// the per-block files written by the fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RpcBlock")]
pub struct Block {
    pub number: u64,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub hash: H256,
    pub from: Address,
    /// `None` for contract creations
    pub to: Option<Address>,
    pub gas: u64,
    pub input: Bytes,
}

impl Block {
    /// Block header without transactions.
    pub fn header(number: u64, timestamp: u64) -> Self {
        Self {
            number,
            timestamp,
            transactions: Vec::new(),
        }
    }
}

impl Transaction {
    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }

    pub fn is_value_transfer(&self) -> bool {
        self.gas == TRANSFER_GAS || self.input.is_empty()
    }

    /// The called contract, if this transaction is a direct contract call.
    pub fn contract_call(&self) -> Option<Address> {
        if self.is_value_transfer() {
            return None;
        }
        self.to
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlock {
    number: Option<U64>,
    timestamp: U256,
    #[serde(default)]
    transactions: Vec<RpcTransaction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTransaction {
    #[serde(default)]
    hash: H256,
    from: Address,
    #[serde(default)]
    to: Option<Address>,
    gas: U256,
    #[serde(default)]
    input: Bytes,
}

pub(crate) fn quantity_to_u64(value: U256, field: &str) -> Result<u64, String> {
    if value > U256::from(u64::MAX) {
        return Err(format!("{} {} does not fit in 64 bits", field, value));
    }
    Ok(value.as_u64())
}

impl TryFrom<RpcBlock> for Block {
    type Error = String;

    fn try_from(raw: RpcBlock) -> Result<Self, Self::Error> {
        let number = raw
            .number
            .ok_or_else(|| "pending block has no number".to_string())?
            .as_u64();
        let timestamp = quantity_to_u64(raw.timestamp, "timestamp")?;
        let transactions = raw
            .transactions
            .into_iter()
            .map(|tx| {
                Ok(Transaction {
                    hash: tx.hash,
                    from: tx.from,
                    to: tx.to,
                    gas: quantity_to_u64(tx.gas, "gas")?,
                    input: tx.input,
                })
            })
            .collect::<Result<Vec<_>, String>>()?;

        Ok(Block {
            number,
            timestamp,
            transactions,
        })
    }
}
