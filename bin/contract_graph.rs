//! # Contract Graph CLI
//!
//! Command-line driver for the contract graph pipeline.
//!
//! ## Usage
//!
//! ```bash
//! # Download the blocks of 1 June 2022 into ./blocks
//! ETH_RPC_URL=http://localhost:8545 cargo run --bin contract_graph -- fetch -o blocks -s "2022-06-01" -r 1d
//!
//! # Interaction export, then a gas-cutoff graph from it
//! cargo run --bin contract_graph -- interactions -i blocks -o interactions.csv
//! cargo run --bin contract_graph -- graph -i interactions.csv --policy cutoff -o graph.dot
//!
//! # Sampled graph straight from the block files, reproducible
//! cargo run --bin contract_graph -- graph -i blocks --policy sampled --seed 7 > graph.dot
//! ```
//!
//! Settings come from `Config.toml` (optional), `.env` and `ETH_RPC_URL`;
//! flags override them. Log level follows `RUST_LOG` (default `info`).

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use contract_graph::{
    block_store::BlockStore,
    dot_writer,
    export::{self, InteractionRecordReader},
    graph_builder::{GraphBuilder, SelectionPolicy},
    interaction_extractor::{extract_interactions, interactions_from_records},
    observer::LogObserver,
    settings::Settings,
    utils::{parse_range, parse_start_time, range_end, RangeSpec},
    BlockTimeLocator, RpcBlockSource,
};
use futures::stream::{self, StreamExt};
use log::info;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "contract_graph", version, about = "Build contract interaction graphs from Ethereum blocks")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch every block of a time or block range into a directory.
    Fetch {
        /// Output directory (must exist)
        #[arg(short, long)]
        output: PathBuf,
        /// Start time: "now", unix seconds, RFC 3339 or YYYY-MM-DD
        #[arg(short, long, default_value = "now")]
        start: String,
        /// Span to fetch: 30m, 6h, 1d, 2w, or a block count like 500
        #[arg(short, long, default_value = "1d")]
        range: String,
        /// JSON-RPC endpoint, overrides ETH_RPC_URL
        #[arg(long)]
        rpc_url: Option<String>,
    },
    /// Extract direct contract calls from stored blocks as CSV.
    Interactions {
        /// Directory of stored blocks
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// List every transaction of the stored blocks as CSV.
    Transactions {
        /// Directory of stored blocks
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Build the contract graph and write it in DOT format.
    Graph {
        /// Directory of stored blocks, or an interaction CSV export
        #[arg(short, long)]
        input: PathBuf,
        /// Output file, "-" for stdout
        #[arg(short, long, default_value = "-")]
        output: String,
        #[arg(long, value_enum, default_value_t = PolicyKind::Exhaustive)]
        policy: PolicyKind,
        /// Edge probability for the sampled policy
        #[arg(long)]
        probability: Option<f64>,
        /// Gas fraction to cover for the cutoff policy
        #[arg(long)]
        cutoff: Option<f64>,
        /// Seed for the sampled policy
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum PolicyKind {
    Exhaustive,
    Sampled,
    Cutoff,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = Settings::new().context("failed to load settings")?;

    match cli.command {
        Command::Fetch {
            output,
            start,
            range,
            rpc_url,
        } => fetch(&settings, &output, &start, &range, rpc_url).await,
        Command::Interactions { input, output } => {
            let store = BlockStore::open(&input)?;
            let blocks = store.blocks()?;
            info!("extracting interactions from {} blocks...", blocks.len());
            let rows = export::export_interactions(
                blocks,
                BufWriter::new(File::create(&output)?),
                &mut LogObserver::default(),
            )?;
            info!("found {} interactions", rows);
            Ok(())
        }
        Command::Transactions { input, output } => {
            let store = BlockStore::open(&input)?;
            let blocks = store.blocks()?;
            info!("exporting transactions from {} blocks...", blocks.len());
            let rows = export::export_transactions(
                blocks,
                BufWriter::new(File::create(&output)?),
                &mut LogObserver::default(),
            )?;
            info!("exported {} transactions", rows);
            Ok(())
        }
        Command::Graph {
            input,
            output,
            policy,
            probability,
            cutoff,
            seed,
        } => {
            let policy = match policy {
                PolicyKind::Exhaustive => SelectionPolicy::Exhaustive,
                PolicyKind::Sampled => SelectionPolicy::Sampled {
                    probability: probability.unwrap_or(settings.graph.edge_probability),
                },
                PolicyKind::Cutoff => SelectionPolicy::GasCutoff {
                    fraction: cutoff.unwrap_or(settings.graph.gas_cutoff),
                },
            };
            graph(&input, &output, policy, seed.or(settings.graph.seed))
        }
    }
}

async fn fetch(
    settings: &Settings,
    output: &Path,
    start: &str,
    range: &str,
    rpc_url: Option<String>,
) -> Result<()> {
    if !output.is_dir() {
        bail!("output directory {} does not exist", output.display());
    }
    let store = BlockStore::open(output)?;

    let url = rpc_url
        .or_else(|| settings.rpc.url.clone())
        .context("no RPC url: pass --rpc-url or set ETH_RPC_URL")?;
    let start_time = parse_start_time(start, Utc::now())
        .with_context(|| format!("could not parse start time {:?}", start))?;
    let range_spec = parse_range(range).with_context(|| format!("could not parse time range {:?}", range))?;

    let source = RpcBlockSource::from_url(
        &url,
        Duration::from_secs(settings.rpc.request_timeout_seconds),
    )?;
    let locator = BlockTimeLocator::new(source)
        .with_block_interval(settings.locator.block_interval_secs)
        .with_safety_factor(settings.locator.safety_factor);
    let mut observer = LogObserver::default();

    info!("find start and end blocks...");
    let start_block = locator
        .locate_observed(unix_seconds(start_time), &mut observer)
        .await?
        .with_context(|| format!("could not find block for start time {}", start_time))?;
    let end_number = match range_spec {
        RangeSpec::Blocks(count) => start_block.number.saturating_add(count),
        RangeSpec::Time(span) => {
            let end_time = range_end(start_time, span)
                .with_context(|| format!("time range {:?} is too large", range))?;
            locator
                .locate_observed(unix_seconds(end_time), &mut observer)
                .await?
                .with_context(|| format!("could not find block for end time {}", end_time))?
                .number
        }
    };

    let pending = store.missing_blocks(start_block.number..end_number)?;
    let total = end_number.saturating_sub(start_block.number);
    info!(
        "fetching {} blocks from #{} to #{} ({} already stored)...",
        pending.len(),
        start_block.number,
        end_number,
        total as usize - pending.len()
    );

    // Each block lands in its own file, so completion order does not matter
    let source = locator.source();
    let mut fetched = stream::iter(pending.iter().copied())
        .map(|number| async move { (number, source.raw_block_with_txs(number).await) })
        .buffer_unordered(settings.rpc.fetch_concurrency.max(1));

    let mut done = 0usize;
    while let Some((number, block)) = fetched.next().await {
        store.store(number, &block?)?;
        done += 1;
        if done % 100 == 0 {
            info!("{:.1}% ({} of {})", done as f64 / pending.len() as f64 * 100.0, done, pending.len());
        }
    }

    info!("done");
    Ok(())
}

fn graph(input: &Path, output: &str, policy: SelectionPolicy, seed: Option<u64>) -> Result<()> {
    let mut observer = LogObserver::default();

    info!("counting contract interactions...");
    let interactions = if input.is_dir() {
        let store = BlockStore::open(input)?;
        extract_interactions(store.blocks()?, &mut observer)?
    } else {
        let file = File::open(input)
            .with_context(|| format!("could not open interactions file {}", input.display()))?;
        let records = InteractionRecordReader::new(BufReader::new(file))?;
        interactions_from_records(records, &mut observer)?
    };

    let mut builder = match seed {
        Some(seed) => GraphBuilder::seeded(policy, seed)?,
        None => GraphBuilder::new(policy)?,
    };
    info!("creating edges ({:?})...", policy);
    let graph = builder.build_observed(&interactions, &mut observer);

    info!(
        "storing graph with {} nodes and {} edges",
        graph.node_count(),
        graph.edge_count()
    );
    let mut writer: Box<dyn Write> = if output == "-" {
        Box::new(io::stdout().lock())
    } else {
        Box::new(BufWriter::new(File::create(output)?))
    };
    dot_writer::write_graph(&graph, &mut writer)?;
    info!("done");
    Ok(())
}

fn unix_seconds(time: chrono::DateTime<Utc>) -> u64 {
    u64::try_from(time.timestamp()).unwrap_or(0)
}
