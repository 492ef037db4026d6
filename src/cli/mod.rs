use crate::config::{DEFAULT_SERVICE_URL, DEFAULT_TIMEOUT_SECS};
use crate::highlight::{DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "conflate-review",
    about = "Step through conflated map features that need human review"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Base URL of the review service.
    #[arg(long, global = true, env = "CONFLATE_REVIEW_URL", default_value = DEFAULT_SERVICE_URL)]
    pub service_url: String,

    /// Base URL of the OSM API serving map data (defaults to <service-url>/osm).
    #[arg(long, global = true, env = "CONFLATE_OSM_URL")]
    pub osm_url: Option<String>,

    /// Request timeout in seconds.
    #[arg(long, global = true, env = "CONFLATE_REVIEW_TIMEOUT", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Lowest zoom level used when framing a reviewable.
    #[arg(long, global = true, default_value_t = DEFAULT_MIN_ZOOM)]
    pub min_zoom: f64,

    /// Highest zoom level used when framing a reviewable.
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_ZOOM)]
    pub max_zoom: f64,

    /// Path of the local decision journal.
    #[arg(long, global = true, env = "CONFLATE_REVIEW_JOURNAL")]
    pub journal: Option<PathBuf>,

    /// Directory for log files.
    #[arg(long, global = true, env = "CONFLATE_REVIEW_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open the interactive review session for a map.
    Review(ReviewArgs),
    /// Print review statistics for a map.
    Stats(MapArgs),
    /// Accept every remaining reviewable of a map without individual review.
    AcceptAll(AcceptAllArgs),
    /// Save or fetch review bookmarks.
    Bookmark {
        #[command(subcommand)]
        action: BookmarkAction,
    },
    /// Show or reset the local decision journal for a map.
    Journal(JournalArgs),
}

#[derive(Args, Debug)]
pub struct ReviewArgs {
    /// Id of the map dataset to review.
    #[arg(short, long)]
    pub map: Option<i64>,

    /// Name of the map layer to reload after accepting all reviews.
    #[arg(short, long)]
    pub layer: Option<String>,

    /// Continue from the last position recorded in the journal.
    #[arg(long, conflicts_with = "start_at")]
    pub resume: bool,

    /// Open the reviewable with this sequence number first.
    #[arg(long)]
    pub start_at: Option<i64>,
}

#[derive(Args, Debug)]
pub struct MapArgs {
    /// Id of the map dataset.
    #[arg(short, long)]
    pub map: i64,
}

#[derive(Args, Debug)]
pub struct AcceptAllArgs {
    /// Id of the map dataset.
    #[arg(short, long)]
    pub map: i64,

    /// Name of the map layer to reload.
    #[arg(short, long)]
    pub layer: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum BookmarkAction {
    /// Bookmark a reviewable with a note.
    Save {
        #[arg(short, long)]
        map: i64,
        #[arg(short, long)]
        relation: i64,
        #[arg(short, long)]
        note: String,
    },
    /// Print a saved bookmark.
    Get {
        /// Bookmark id.
        id: i64,
    },
}

#[derive(Args, Debug)]
pub struct JournalArgs {
    /// Id of the map dataset.
    #[arg(short, long)]
    pub map: i64,

    /// Delete the journal entries for the map.
    #[arg(long)]
    pub reset: bool,
}

/// Parse CLI arguments.
pub fn parse_args() -> Cli {
    Cli::parse()
}
