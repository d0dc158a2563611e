use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Observation scheduler and related-author discovery.
///
/// Runs against PostgreSQL (configured through `PG_*` env vars, optionally
/// profiled with `FANWATCH_PROFILE`) or, with `--dataset`, against a JSON
/// dataset held in memory.
#[derive(Parser, Debug)]
#[command(name = "fanwatch", version, about = "Observation scheduler and related-author discovery")]
pub struct CliArgs {
    /// Tuning file (missing file = built-in defaults)
    #[arg(long, env = "FANWATCH_CONFIG", default_value = "fanwatch.toml")]
    pub config: PathBuf,

    /// JSON dataset to load into the in-memory store instead of PostgreSQL
    #[arg(long, env = "FANWATCH_DATASET")]
    pub dataset: Option<PathBuf>,

    /// Schedule snapshot for dataset runs (default: $DATA_DIR/schedule.json)
    #[arg(long)]
    pub schedule_out: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    #[command(flatten)]
    Store(StoreCommand),
    /// Print the resolved configuration (secrets redacted)
    Config,
}

/// Commands that run against a store backend.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum StoreCommand {
    /// Recompute the whole schedule once, or every N seconds with --every
    Schedule {
        /// Keep running, one cycle per N seconds, until Ctrl-C
        #[arg(long)]
        every: Option<u64>,
        /// Like --every, using scheduler.cycle_seconds from the tuning file
        #[arg(long, conflicts_with = "every")]
        watch: bool,
    },
    /// Set one author's observation interval
    Upsert {
        author_id: i64,
        /// Interval in seconds
        interval: i64,
        /// Make the author due immediately
        #[arg(long)]
        force_now: bool,
    },
    /// Register a new author and queue an immediate crawl
    Register { author_id: i64 },
    /// Seed a daily schedule entry if the author has none
    Track { author_id: i64 },
    /// List schedule entries due for a crawl
    Due {
        #[arg(long, default_value = "50")]
        limit: usize,
    },
    /// Most visited authors over the last day
    Hot {
        /// Defaults to scheduler.hot_list_size
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Related authors by tag overlap, host last
    Discover {
        author_id: i64,
        /// Defaults to discovery.default_result_limit
        #[arg(long)]
        limit: Option<usize>,
    },
    /// An author's heaviest tags
    Tags { author_id: i64 },
}
