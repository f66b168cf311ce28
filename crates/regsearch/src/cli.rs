//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Regsearch - searchable index of container registry images
#[derive(Parser, Debug)]
#[command(name = "regsearch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to regsearch.yaml config file
    #[arg(short, long, global = true)]
    pub config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl the whole registry and rebuild the index
    Crawl(CrawlArgs),

    /// Search an index snapshot
    Search(SearchArgs),

    /// Serve the webhook receiver and search API
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
pub struct CrawlArgs {
    /// Maximum concurrent tag resolutions (overrides crawl.concurrency)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Remove documents whose digest no tag references any more
    #[arg(long)]
    pub prune: bool,

    /// Snapshot file to update (overrides server.snapshot)
    #[arg(long)]
    pub snapshot: Option<Utf8PathBuf>,

    /// Print the crawl report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Simple query matched against image names and tags
    #[arg(short = 'q', long = "query", default_value = "")]
    pub simple: String,

    /// Advanced field query, e.g. "+Label.family:debian -Label.type:web"
    #[arg(short = 'a', long = "advanced", default_value = "")]
    pub advanced: String,

    /// Fields to return (repeatable or comma-separated)
    #[arg(short = 'f', long = "field", value_delimiter = ',')]
    pub fields: Vec<String>,

    /// Number of hits to skip
    #[arg(long, default_value_t = 0)]
    pub offset: usize,

    /// Page size (0 uses search.default_max_results)
    #[arg(long, default_value_t = 0)]
    pub max_results: usize,

    /// Snapshot file to search (overrides server.snapshot)
    #[arg(long)]
    pub snapshot: Option<Utf8PathBuf>,

    /// Print the raw search response as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on (overrides server.listen)
    #[arg(long)]
    pub listen: Option<String>,

    /// Run a full crawl in the background after startup
    #[arg(long)]
    pub crawl: bool,

    /// Snapshot file to load at startup and save on shutdown
    #[arg(long)]
    pub snapshot: Option<Utf8PathBuf>,
}
