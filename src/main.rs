//! Shiori CLI - reconcile fetched chapters into a library and list them.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shiori::config::Config;
use shiori::console::Console;
use shiori::filter::{self, ChapterItem, SortKey};
use shiori::merge::ChapterDeduplicator;
use shiori::models::RawChapter;
use shiori::recognition::BasicRecognizer;
use shiori::reconcile::{ReconcileOptions, Reconciler};
use shiori::store::{ChapterStore, MemoryStore};
use shiori::tracking::PendingTrackingStore;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Manga chapter reconciliation and reading-progress sync.
#[derive(Parser, Debug)]
#[command(name = "shiori")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Use this config file instead of the platform default.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile a fetched chapter list into a library file.
    Sync {
        /// Library snapshot (JSON), created if missing.
        library: PathBuf,

        /// Fetched chapters from every provider (JSON array).
        fetched: PathBuf,

        /// Manga to reconcile.
        #[arg(long)]
        manga: i64,

        /// The merged provider failed; keep its chapters.
        #[arg(long)]
        merged_failed: bool,

        /// Urls the merged provider reports as read (JSON array).
        #[arg(long)]
        merged_read: Option<PathBuf>,

        /// Print the plan without writing the library.
        #[arg(long)]
        dry_run: bool,
    },

    /// List a manga's chapters with its display settings.
    List {
        /// Library snapshot (JSON).
        library: PathBuf,

        /// Manga to list.
        #[arg(long)]
        manga: i64,

        /// Sort key: source, number or upload. Defaults to the title's setting.
        #[arg(long)]
        sort: Option<SortKey>,

        /// Sort descending.
        #[arg(long)]
        descending: bool,

        /// Show the reader sequence instead of the filtered list.
        #[arg(long)]
        reader: bool,
    },

    /// Show tracker updates queued while offline.
    Pending,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    let console = Console::new();

    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    match args.command {
        Command::Sync {
            library,
            fetched,
            manga,
            merged_failed,
            merged_read,
            dry_run,
        } => {
            let options = ReconcileOptions {
                merged_fetch_failed: merged_failed,
                read_from_merged: match merged_read {
                    Some(path) => read_json::<HashSet<String>>(&path)?,
                    None => HashSet::new(),
                },
            };
            run_sync(&console, &config, &library, &fetched, manga, &options, dry_run)
        }
        Command::List {
            library,
            manga,
            sort,
            descending,
            reader,
        } => run_list(&console, &config, &library, manga, sort, descending, reader),
        Command::Pending => run_pending(&console, &config),
    }
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "shiori=debug" } else { "shiori=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn open_library(path: &Path) -> Result<MemoryStore> {
    if !path.exists() {
        return Ok(MemoryStore::new());
    }
    MemoryStore::load_from(path).with_context(|| format!("Failed to load {}", path.display()))
}

fn run_sync(
    console: &Console,
    config: &Config,
    library: &Path,
    fetched: &Path,
    manga_id: i64,
    options: &ReconcileOptions,
    dry_run: bool,
) -> Result<()> {
    console.section("Shiori - Chapter Sync");

    console.step("Loading library...");
    let mut store = open_library(library)?;
    let manga = store
        .manga(manga_id)
        .with_context(|| format!("Manga {} is not in the library", manga_id))?;
    console.success(&format!("Found: {}", manga.title));

    let raw: Vec<RawChapter> = read_json(fetched)?;
    console.info(&format!("Fetched {} chapters", console.count(raw.len())));

    let reconciler = Reconciler::new(
        Arc::new(BasicRecognizer),
        ChapterDeduplicator::new(&config.merge),
    );

    if dry_run {
        let canonical = reconciler.canonicalize(&manga, raw);
        let persisted = store.chapters(manga_id)?;
        let plan = shiori::reconcile::compute_plan(
            &persisted,
            &canonical,
            &manga,
            shiori::reconcile::now_millis(),
            options,
        );
        console.info(&format!(
            "Would insert {}, update {}, delete {} ({} readded)",
            plan.inserts.len(),
            plan.updates.len(),
            plan.deletes.len(),
            plan.readded.len()
        ));
        return Ok(());
    }

    console.step("Reconciling...");
    let outcome = reconciler
        .sync_with_sources(&mut store, manga_id, raw, options)
        .context("Reconcile failed")?;
    console.reconcile_summary(&outcome);

    store
        .save_to(library)
        .with_context(|| format!("Failed to save {}", library.display()))?;
    console.section("Done!");
    Ok(())
}

fn run_list(
    console: &Console,
    config: &Config,
    library: &Path,
    manga_id: i64,
    sort: Option<SortKey>,
    descending: bool,
    reader: bool,
) -> Result<()> {
    let store = open_library(library)?;
    let manga = store
        .manga(manga_id)
        .with_context(|| format!("Manga {} is not in the library", manga_id))?;

    let items: Vec<ChapterItem> = store
        .chapters(manga_id)?
        .into_iter()
        .map(|chapter| {
            let downloaded = chapter.id.is_some_and(|id| store.is_downloaded(id));
            ChapterItem::new(chapter, downloaded)
        })
        .collect();

    let key = sort.unwrap_or(manga.display.sort_key);
    let descending = descending || (sort.is_none() && manga.display.sort_descending);
    let comparator = filter::sort_comparator(key, descending);
    let scanlator_match = config.filter.scanlator_match;

    let listed = if reader {
        filter::filter_chapters_for_reader(
            &items,
            &manga,
            &config.reader,
            scanlator_match,
            comparator,
            None,
        )
    } else {
        let mut filtered = filter::filter_chapters(&items, &manga, scanlator_match);
        filtered.sort_by(comparator);
        filtered
    };

    console.section(&manga.title);
    for item in &listed {
        println!("{}", console.chapter_line(item));
    }
    console.info(&format!(
        "{} of {} chapters shown",
        console.count(listed.len()),
        items.len()
    ));
    if let Some(next) = filter::next_unread_chapter(&listed, key) {
        console.info(&format!("Next unread: {}", console.chapter_line(next).trim()));
    }
    Ok(())
}

fn run_pending(console: &Console, config: &Config) -> Result<()> {
    let path = config.pending_tracking_path()?;
    let pending = PendingTrackingStore::open(&path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    if pending.is_empty() {
        console.success("No tracker updates pending");
        return Ok(());
    }

    for update in pending.entries() {
        console.info(&format!(
            "manga {} tracker {} -> chapter {}",
            update.manga_id, update.sync_id, update.last_chapter_read
        ));
    }
    Ok(())
}
