use anyhow::{Context, Result, bail};
use serde_json::json;
use std::sync::Arc;

use conflate_review::api::{HttpReviewApi, NewBookmark, ReviewApi};
use conflate_review::cli::{self, AcceptAllArgs, BookmarkAction, Commands, JournalArgs, ReviewArgs};
use conflate_review::config::ReviewConfig;
use conflate_review::highlight::{ConflictHighlighter, TagComparison};
use conflate_review::host::{EditorHost, ReviewUi, Severity};
use conflate_review::journal::{Decision, ReviewJournal};
use conflate_review::logging;
use conflate_review::navigator::{NavigatorOptions, ReviewNavigator};
use conflate_review::resolver::ConflictResolver;
use conflate_review::session::ReviewSession;
use conflate_review::tui::{App, StartPoint, run_tui};

fn main() -> Result<()> {
    let args = cli::parse_args();
    let config = ReviewConfig::from_args(&args.global).context("Invalid configuration")?;
    let _log_guard = logging::init(&config.log_dir).context("Failed to set up logging")?;
    tracing::info!(service = %config.service_url, "conflate-review starting");

    let api: Arc<dyn ReviewApi> =
        Arc::new(HttpReviewApi::new(&config).context("Failed to create HTTP client")?);

    match args.command {
        Commands::Review(review_args) => handle_review(&config, api, review_args)?,
        Commands::Stats(map_args) => handle_stats(&config, api.as_ref(), map_args.map)?,
        Commands::AcceptAll(accept_args) => handle_accept_all(&config, api, accept_args)?,
        Commands::Bookmark { action } => handle_bookmark(api.as_ref(), action)?,
        Commands::Journal(journal_args) => handle_journal(&config, journal_args)?,
    }

    Ok(())
}

/// Launch the interactive review session.
fn handle_review(config: &ReviewConfig, api: Arc<dyn ReviewApi>, args: ReviewArgs) -> Result<()> {
    let Some(map_id) = args.map else {
        // Let the navigator report the missing map the same way the TUI would.
        let mut ui = ConsoleUi;
        let options = NavigatorOptions {
            next_control: Some("n".to_string()),
            prev_control: Some("p".to_string()),
            map_id: None,
        };
        ReviewNavigator::default().initialize(&mut ReviewSession::new(), &mut ui, &options);
        bail!("A map id is required to start reviewing (use --map)");
    };

    let journal = open_journal(config)?;
    let start = if args.resume {
        match journal.last_cursor(map_id)? {
            Some(cursor) => StartPoint::Resume(cursor),
            None => {
                println!("No recorded position for map {map_id}, starting at a random reviewable");
                StartPoint::Random
            }
        }
    } else if let Some(sequence) = args.start_at {
        StartPoint::Sequence(sequence)
    } else {
        StartPoint::Random
    };

    let layer = args.layer.unwrap_or_else(|| default_layer(map_id));
    let highlighter = ConflictHighlighter::new(config.min_zoom, config.max_zoom);
    let mut app = App::new(api, map_id, layer, highlighter, Some(journal));
    app.start(start);
    run_tui(app)
}

/// Print review statistics for a map, with the local journal's counts.
fn handle_stats(config: &ReviewConfig, api: &dyn ReviewApi, map_id: i64) -> Result<()> {
    let stats = api
        .statistics(map_id)
        .with_context(|| format!("Failed to get review statistics for map {map_id}"))?;
    let reviewed = stats.total_count.saturating_sub(stats.unreviewed_count);
    println!("Review statistics for map {map_id}");
    println!("─────────────────────────────────────");
    println!(
        "  Reviewed:   {}/{} ({:.0}%)",
        reviewed,
        stats.total_count,
        if stats.total_count > 0 {
            (reviewed as f64 / stats.total_count as f64) * 100.0
        } else {
            0.0
        }
    );
    println!("  Unreviewed: {}", stats.unreviewed_count);

    let summary = open_journal(config)?.summary(map_id)?;
    println!("  Retained here: {}", summary.retained);
    if let Some(cursor) = summary.last_cursor {
        println!("  Last review:   r{}", cursor.relation_id);
    }
    if stats.unreviewed_count == 0 {
        println!("\n✓ Nothing left to review");
    }
    Ok(())
}

/// Accept every remaining reviewable without opening the TUI.
fn handle_accept_all(
    config: &ReviewConfig,
    api: Arc<dyn ReviewApi>,
    args: AcceptAllArgs,
) -> Result<()> {
    let mut ui = ConsoleUi;
    let mut session = ReviewSession::new();
    let navigator = ReviewNavigator::new(ConflictHighlighter::new(config.min_zoom, config.max_zoom));
    let mut host = EditorHost::new(Arc::clone(&api), args.map);
    let options = NavigatorOptions {
        next_control: Some("n".to_string()),
        prev_control: Some("p".to_string()),
        map_id: Some(args.map),
    };
    if !navigator.initialize(&mut session, &mut ui, &options) {
        bail!("Failed to start a review session for map {}", args.map);
    }

    let layer = args.layer.unwrap_or_else(|| default_layer(args.map));
    ConflictResolver::new()
        .accept_all(&navigator, &mut session, api.as_ref(), &mut host, &mut ui, &layer)
        .with_context(|| format!("Failed to accept reviews for map {}", args.map))?;

    let mut journal = open_journal(config)?;
    journal.record_decision(args.map, 0, Decision::AcceptedAll)?;
    Ok(())
}

fn handle_bookmark(api: &dyn ReviewApi, action: BookmarkAction) -> Result<()> {
    match action {
        BookmarkAction::Save {
            map,
            relation,
            note,
        } => {
            let bookmark = NewBookmark {
                map_id: map,
                relation_id: relation,
                detail: json!({ "note": note }),
            };
            let id = api
                .save_bookmark(&bookmark)
                .context("Failed to save bookmark")?;
            println!("✓ Saved bookmark {id} for review r{relation} of map {map}");
        }
        BookmarkAction::Get { id } => {
            let bookmark = api
                .get_bookmark(id)
                .with_context(|| format!("Failed to fetch bookmark {id}"))?;
            println!("Bookmark {}", bookmark.bookmark_id);
            println!("  Map:      {}", bookmark.map_id);
            println!("  Review:   r{}", bookmark.relation_id);
            if let Some(note) = bookmark.detail.get("note").and_then(|n| n.as_str()) {
                println!("  Note:     {note}");
            }
            if let Some(created_at) = &bookmark.created_at {
                println!("  Created:  {created_at}");
            }
        }
    }
    Ok(())
}

fn handle_journal(config: &ReviewConfig, args: JournalArgs) -> Result<()> {
    let mut journal = open_journal(config)?;
    if args.reset {
        journal.reset(args.map)?;
        println!("✓ Journal cleared for map {}", args.map);
        return Ok(());
    }

    let summary = journal.summary(args.map)?;
    println!("Journal for map {}", args.map);
    println!("─────────────────────────────────────");
    println!("  Retained:     {}", summary.retained);
    println!(
        "  Accepted all: {}",
        if summary.accepted_all { "yes" } else { "no" }
    );
    match summary.last_cursor {
        Some(cursor) => println!(
            "  Last review:  r{} (sort order {})",
            cursor.relation_id, cursor.sort_order
        ),
        None => println!("  Last review:  -"),
    }
    Ok(())
}

fn open_journal(config: &ReviewConfig) -> Result<ReviewJournal> {
    if let Some(parent) = config.journal_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    ReviewJournal::open(&config.journal_path)
        .with_context(|| format!("Failed to open journal {}", config.journal_path.display()))
}

fn default_layer(map_id: i64) -> String {
    format!("map-{map_id}")
}

/// [`ReviewUi`] for one-shot commands: alerts go to the terminal, the rest is ignored.
struct ConsoleUi;

impl ReviewUi for ConsoleUi {
    fn alert(&mut self, severity: Severity, message: &str) {
        match severity {
            Severity::Error => eprintln!("✗ {message}"),
            Severity::Warning => eprintln!("⚠ {message}"),
            Severity::Notice => println!("{message}"),
            Severity::Success => println!("✓ {message}"),
        }
    }

    fn set_processing(&mut self, active: bool, message: Option<&str>) {
        if let (true, Some(message)) = (active, message) {
            println!("{message}");
        }
    }

    fn set_nav_enabled(&mut self, _enabled: bool) {}

    fn show_comparison(&mut self, _comparison: &TagComparison) {}

    fn meta_updated(&mut self, _remaining: u64) {}

    fn prompt_retry(&mut self, message: &str) {
        eprintln!("✗ {message}");
    }

    fn review_complete(&mut self, map_id: i64) {
        tracing::info!(map_id, "review complete");
    }

    fn session_exited(&mut self, _message: Option<&str>) {}
}
