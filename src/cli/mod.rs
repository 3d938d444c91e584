pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gleaner")]
#[command(about = "Harvest product records from e-commerce searches", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/gleaner/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List configured sites
    Sites,
    /// Paginate search results and cache the product links
    Search {
        site: String,
        keyword: String,
        /// Stop after this many results pages
        #[arg(short, long)]
        max_pages: Option<u32>,
        /// Replace the cached links instead of merging
        #[arg(long)]
        overwrite: bool,
        /// Show the browser window
        #[arg(long)]
        headed: bool,
    },
    /// Visit cached links and extract product pages
    Inspect {
        site: String,
        keyword: String,
        /// Visit at most this many pages
        #[arg(short, long)]
        sample: Option<usize>,
        /// Visit links in random order
        #[arg(long)]
        shuffle: bool,
        /// Seed for --shuffle
        #[arg(long, requires = "shuffle")]
        seed: Option<u64>,
        /// Save a PDF or screenshot of every page
        #[arg(long)]
        screenshots: bool,
        /// Visit links that already have a page record
        #[arg(long)]
        revisit: bool,
        /// Show the browser window
        #[arg(long)]
        headed: bool,
    },
    /// Fetch plain-text renderings of cached links over HTTP
    FetchText {
        site: String,
        keyword: String,
        /// Number of parallel requests
        #[arg(short, long)]
        workers: Option<usize>,
        /// Fetch again links that already have text
        #[arg(long)]
        refresh: bool,
    },
    /// Run an external scorer over the cached pages
    Score {
        site: String,
        keyword: String,
        /// Scorer command; the cache file path is appended
        #[arg(long)]
        command: String,
    },
    /// Summarize a cache file
    Show {
        site: String,
        keyword: String,
        /// Show page records instead of links
        #[arg(long)]
        pages: bool,
    },
}
