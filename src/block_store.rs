//! # Block Store
//!
//! A directory holding one JSON file per block, named `<number>.json`, in
//! the format returned by `eth_getBlockByNumber` with full transactions.
//!
//! Stored blocks are read back lazily through [`StoredBlocks`], one file per
//! `next()`, in ascending block-number order. The iterator is forward-only;
//! call [`BlockStore::blocks`] again to start a new pass.

use crate::error::{GraphError, Result};
use crate::types::Block;
use log::{debug, error};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct BlockStore {
    dir: PathBuf,
}

impl BlockStore {
    /// Open an existing block directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(GraphError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("block directory {} does not exist", dir.display()),
            )));
        }
        Ok(Self { dir })
    }

    /// Open a block directory, creating it if needed.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, number: u64) -> PathBuf {
        self.dir.join(format!("{}.json", number))
    }

    /// Block numbers already present in the directory.
    pub fn stored_block_numbers(&self) -> Result<BTreeSet<u64>> {
        let mut numbers = BTreeSet::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(number) = parse_block_file_name(&entry.file_name().to_string_lossy()) {
                numbers.insert(number);
            }
        }
        Ok(numbers)
    }

    /// Numbers in `range` with no stored block yet, ascending.
    pub fn missing_blocks(&self, range: Range<u64>) -> Result<Vec<u64>> {
        let stored = self.stored_block_numbers()?;
        Ok(range.filter(|n| !stored.contains(n)).collect())
    }

    /// Persist one block. `block` is usually the raw node response.
    ///
    /// The JSON goes to `<n>.json.tmp` first and is renamed into place once
    /// complete, so an interrupted write never leaves a `<n>.json` behind.
    pub fn store<T: Serialize>(&self, number: u64, block: &T) -> Result<()> {
        let path = self.path_for(number);
        let tmp_path = path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            serde_json::to_writer(&mut writer, block)?;
            writer.flush()?;
        }
        fs::rename(&tmp_path, &path)?;
        debug!("stored block #{} at {}", number, path.display());
        Ok(())
    }

    pub fn load(&self, number: u64) -> Result<Block> {
        load_block_file(&self.path_for(number))
    }

    /// Lazily iterate every stored block in ascending order.
    pub fn blocks(&self) -> Result<StoredBlocks> {
        let paths: Vec<PathBuf> = self
            .stored_block_numbers()?
            .into_iter()
            .map(|n| self.path_for(n))
            .collect();
        Ok(StoredBlocks {
            paths: paths.into_iter(),
        })
    }
}

/// Forward-only iterator over the blocks of a [`BlockStore`].
#[derive(Debug)]
pub struct StoredBlocks {
    paths: std::vec::IntoIter<PathBuf>,
}

impl Iterator for StoredBlocks {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths.next()?;
        Some(load_block_file(&path))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.paths.size_hint()
    }
}

impl ExactSizeIterator for StoredBlocks {}

fn load_block_file(path: &Path) -> Result<Block> {
    let file = File::open(path).map_err(|e| {
        error!("error loading block at {}", path.display());
        GraphError::Io(e)
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| {
        error!("error loading block at {}", path.display());
        GraphError::MalformedBlock {
            path: path.to_path_buf(),
            source,
        }
    })
}

fn parse_block_file_name(name: &str) -> Option<u64> {
    let stem = name.strip_suffix(".json")?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}
