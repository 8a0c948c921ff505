//! # Tabular Exports
//!
//! Two CSV artifacts can be produced from a block range:
//!
//! - interaction records, one row per direct contract call (same filter as
//!   the interaction extractor): `block_number,tx_index,from,to,gas`
//! - transaction records, one row per transaction:
//!   `block,tx_index,tx_hash,from,to` (`to` is empty for creations)
//!
//! Rows are written as blocks are pulled from the input, nothing is
//! buffered beyond the writer. Interaction exports can be read back with
//! [`InteractionRecordReader`] to build a graph without the block files.

use crate::error::{GraphError, Result};
use crate::observer::ProgressObserver;
use crate::types::conversions::address_to_string;
use crate::types::Block;
use ethers::types::{Address, H256};
use std::io::{BufRead, Write};
use std::str::FromStr;

pub const INTERACTION_COLUMNS: [&str; 5] = ["block_number", "tx_index", "from", "to", "gas"];
pub const TRANSACTION_COLUMNS: [&str; 5] = ["block", "tx_index", "tx_hash", "from", "to"];

/// A row that can be written to a CSV export.
pub trait CsvRecord {
    fn columns() -> &'static [&'static str];
    fn fields(&self) -> Vec<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionRecord {
    pub block_number: u64,
    pub tx_index: usize,
    pub from: Address,
    pub to: Address,
    pub gas: u64,
}

impl InteractionRecord {
    /// Rows for every direct contract call in `block`.
    pub fn from_block(block: &Block) -> impl Iterator<Item = InteractionRecord> + '_ {
        block
            .transactions
            .iter()
            .enumerate()
            .filter_map(move |(tx_index, tx)| {
                tx.contract_call().map(|to| InteractionRecord {
                    block_number: block.number,
                    tx_index,
                    from: tx.from,
                    to,
                    gas: tx.gas,
                })
            })
    }
}

impl CsvRecord for InteractionRecord {
    fn columns() -> &'static [&'static str] {
        &INTERACTION_COLUMNS
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.block_number.to_string(),
            self.tx_index.to_string(),
            address_to_string(self.from),
            address_to_string(self.to),
            self.gas.to_string(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub block: u64,
    pub tx_index: usize,
    pub tx_hash: H256,
    pub from: Address,
    pub to: Option<Address>,
}

impl TransactionRecord {
    pub fn from_block(block: &Block) -> impl Iterator<Item = TransactionRecord> + '_ {
        block
            .transactions
            .iter()
            .enumerate()
            .map(move |(tx_index, tx)| TransactionRecord {
                block: block.number,
                tx_index,
                tx_hash: tx.hash,
                from: tx.from,
                to: tx.to,
            })
    }
}

impl CsvRecord for TransactionRecord {
    fn columns() -> &'static [&'static str] {
        &TRANSACTION_COLUMNS
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.block.to_string(),
            self.tx_index.to_string(),
            format!("{:?}", self.tx_hash),
            address_to_string(self.from),
            self.to.map(address_to_string).unwrap_or_default(),
        ]
    }
}

/// Streaming CSV writer for one record type.
pub struct CsvWriter<W: Write> {
    writer: W,
    rows: usize,
}

impl<W: Write> CsvWriter<W> {
    /// Writes the header row immediately.
    pub fn new<R: CsvRecord>(mut writer: W) -> Result<Self> {
        writeln!(writer, "{}", R::columns().join(","))?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn write<R: CsvRecord>(&mut self, record: &R) -> Result<()> {
        writeln!(self.writer, "{}", record.fields().join(","))?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn finish(mut self) -> Result<usize> {
        self.writer.flush()?;
        Ok(self.rows)
    }
}

/// Write the interaction export for `blocks`. Returns the number of rows.
pub fn export_interactions<I, W, O>(blocks: I, writer: W, observer: &mut O) -> Result<usize>
where
    I: IntoIterator<Item = Result<Block>>,
    W: Write,
    O: ProgressObserver + ?Sized,
{
    let mut csv = CsvWriter::new::<InteractionRecord>(writer)?;
    for (index, block) in blocks.into_iter().enumerate() {
        let block = block?;
        observer.on_block_processed(index, block.number);
        for record in InteractionRecord::from_block(&block) {
            csv.write(&record)?;
        }
    }
    csv.finish()
}

/// Write the transaction export for `blocks`. Returns the number of rows.
pub fn export_transactions<I, W, O>(blocks: I, writer: W, observer: &mut O) -> Result<usize>
where
    I: IntoIterator<Item = Result<Block>>,
    W: Write,
    O: ProgressObserver + ?Sized,
{
    let mut csv = CsvWriter::new::<TransactionRecord>(writer)?;
    for (index, block) in blocks.into_iter().enumerate() {
        let block = block?;
        observer.on_block_processed(index, block.number);
        for record in TransactionRecord::from_block(&block) {
            csv.write(&record)?;
        }
    }
    csv.finish()
}

/// Reads an interaction export back, one record per `next()`.
///
/// Only `from`, `to` and `gas` are required; `block_number` and `tx_index`
/// default to 0 when the columns are absent. Column order is taken from the
/// header.
pub struct InteractionRecordReader<R: BufRead> {
    lines: std::io::Lines<R>,
    line: usize,
    columns: Columns,
}

struct Columns {
    width: usize,
    block_number: Option<usize>,
    tx_index: Option<usize>,
    from: usize,
    to: usize,
    gas: usize,
}

impl<R: BufRead> InteractionRecordReader<R> {
    pub fn new(reader: R) -> Result<Self> {
        let mut lines = reader.lines();
        let header = lines.next().transpose()?.ok_or_else(|| GraphError::InvalidRecord {
            line: 1,
            reason: "missing header".to_string(),
        })?;
        let names: Vec<&str> = header.trim().split(',').map(str::trim).collect();
        let position = |name: &str| names.iter().position(|n| *n == name);
        let required = |name: &str| {
            position(name).ok_or_else(|| GraphError::InvalidRecord {
                line: 1,
                reason: format!("missing column {:?}", name),
            })
        };

        let columns = Columns {
            width: names.len(),
            block_number: position("block_number"),
            tx_index: position("tx_index"),
            from: required("from")?,
            to: required("to")?,
            gas: required("gas")?,
        };
        Ok(Self {
            lines,
            line: 1,
            columns,
        })
    }

    fn parse(&self, text: &str) -> Result<InteractionRecord> {
        let fields: Vec<&str> = text.split(',').map(str::trim).collect();
        if fields.len() != self.columns.width {
            return Err(self.invalid(format!(
                "expected {} fields, found {}",
                self.columns.width,
                fields.len()
            )));
        }
        let optional = |index: Option<usize>, name: &str| -> Result<u64> {
            match index {
                Some(i) => self.number(fields[i], name),
                None => Ok(0),
            }
        };

        Ok(InteractionRecord {
            block_number: optional(self.columns.block_number, "block_number")?,
            tx_index: optional(self.columns.tx_index, "tx_index")? as usize,
            from: self.address(fields[self.columns.from], "from")?,
            to: self.address(fields[self.columns.to], "to")?,
            gas: self.number(fields[self.columns.gas], "gas")?,
        })
    }

    fn number(&self, field: &str, name: &str) -> Result<u64> {
        field
            .parse()
            .map_err(|e| self.invalid(format!("{} {:?}: {}", name, field, e)))
    }

    fn address(&self, field: &str, name: &str) -> Result<Address> {
        Address::from_str(field).map_err(|e| self.invalid(format!("{} {:?}: {}", name, field, e)))
    }

    fn invalid(&self, reason: String) -> GraphError {
        GraphError::InvalidRecord {
            line: self.line,
            reason,
        }
    }
}

impl<R: BufRead> Iterator for InteractionRecordReader<R> {
    type Item = Result<InteractionRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let text = match self.lines.next()? {
                Ok(text) => text,
                Err(e) => return Some(Err(e.into())),
            };
            self.line += 1;
            if text.trim().is_empty() {
                continue;
            }
            return Some(self.parse(&text));
        }
    }
}
