use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::sync::mpsc;

use feedline::config::Config;
use feedline::refresh::{RefreshResult, RefreshScheduler};
use feedline::storage::{Database, DatabaseError, FeedStore};
use feedline::util::{display_width, truncate_to_width};
use feedline::worker::WorkerClient;

/// Width of the title column in listings.
const TITLE_COLUMN: usize = 40;

/// Get the config directory path (~/.config/feedline/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedline"))
}

#[derive(Parser, Debug)]
#[command(name = "feedline", version, about = "Feed ingestion and refresh for RSS, Atom and JSON Feed")]
struct Args {
    /// Config file (default: ~/.config/feedline/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Reset database (delete and recreate)
    #[arg(long, global = true)]
    reset_db: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a URL and report the feed it leads to
    Validate { url: String },
    /// Subscribe to a feed or to the feed an HTML page links to
    Subscribe { url: String },
    /// Unsubscribe from a feed and delete its articles
    Remove { feed_id: String },
    /// Refresh every feed once
    Refresh,
    /// List feeds, or the articles of one feed
    List {
        /// Feed id to list articles for
        feed_id: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Refresh periodically until interrupted
    Run,
    /// Mark an article read (or unread with --unread)
    Read {
        article_id: String,
        #[arg(long)]
        unread: bool,
    },
    /// Toggle an article's starred flag
    Star { article_id: String },
    /// Hide an article from listings; refreshes will not bring it back
    Delete { article_id: String },
    /// Move a feed into a folder, or out of any folder when none is given
    Move {
        feed_id: String,
        folder: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
    }

    // Keep the config directory user-only on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) =
            std::fs::set_permissions(&config_dir, std::fs::Permissions::from_mode(0o700))
        {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = config.database_path_in(&config_dir);
    if args.reset_db && db_path.exists() {
        std::fs::remove_file(&db_path).context("Failed to delete database")?;
        println!("Database reset.");
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of feedline appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let worker = WorkerClient::new(config.fetch_config());
    let scheduler = RefreshScheduler::new(db.clone(), worker.clone(), config.scheduler_config());

    let outcome = run_command(args.command, &db, &worker, &scheduler).await;
    worker.terminate();
    outcome
}

async fn run_command(
    command: Command,
    db: &Database,
    worker: &WorkerClient,
    scheduler: &RefreshScheduler<Database>,
) -> Result<()> {
    match command {
        Command::Validate { url } => {
            let found = worker.validate_feed(&url).await?;
            println!("{}", found.feed.title);
            println!("  feed:     {}", found.feed_url);
            println!("  site:     {}", found.feed.site_url);
            println!("  articles: {}", found.article_count);
        }
        Command::Subscribe { url } => {
            // Resolves HTML pages to the feed they declare
            let found = worker.validate_feed(&url).await?;
            let subscribed = scheduler.subscribe(&found.feed_url).await?;
            println!(
                "Subscribed to {} ({}): {} articles",
                subscribed.feed.title, subscribed.feed.id, subscribed.new_articles
            );
        }
        Command::Remove { feed_id } => {
            if db.delete_feed(&feed_id).await? {
                println!("Removed {feed_id}");
            } else {
                anyhow::bail!("No feed with id {feed_id}");
            }
        }
        Command::Refresh => {
            let results = scheduler.refresh_all().await?;
            print_results(&results);
        }
        Command::List { feed_id: None, .. } => {
            for feed in db.get_all_feeds().await? {
                let count = db.count_articles(Some(&feed.id)).await?;
                println!("{}  {:>5}  {}", column(&feed.title), count, feed.id);
            }
        }
        Command::List {
            feed_id: Some(feed_id),
            limit,
        } => {
            for article in db.get_articles_for_feed(&feed_id, Some(limit)).await? {
                let marker = if article.is_read { ' ' } else { '*' };
                println!(
                    "{marker} {}  {}  {}",
                    article.published_at.format("%Y-%m-%d"),
                    column(&article.title),
                    article.url
                );
            }
        }
        Command::Run => run_scheduler(scheduler).await?,
        Command::Read { article_id, unread } => {
            if !db.mark_article_read(&article_id, !unread).await? {
                anyhow::bail!("No article with id {article_id}");
            }
        }
        Command::Star { article_id } => match db.toggle_article_starred(&article_id).await? {
            Some(true) => println!("Starred {article_id}"),
            Some(false) => println!("Unstarred {article_id}"),
            None => anyhow::bail!("No article with id {article_id}"),
        },
        Command::Delete { article_id } => {
            if !db.soft_delete_article(&article_id).await? {
                anyhow::bail!("No article with id {article_id}");
            }
        }
        Command::Move { feed_id, folder } => {
            if !db.move_feed_to_folder(&feed_id, folder.as_deref()).await? {
                anyhow::bail!("No feed with id {feed_id}");
            }
        }
    }
    Ok(())
}

async fn run_scheduler(scheduler: &RefreshScheduler<Database>) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(4);
    scheduler.set_completion_sender(tx);
    scheduler.start();
    println!("Refreshing periodically, press Ctrl-C to stop.");

    loop {
        tokio::select! {
            Some(results) = rx.recv() => print_results(&results),
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    scheduler.stop();
    Ok(())
}

fn print_results(results: &[RefreshResult]) {
    if results.is_empty() {
        println!("Nothing refreshed (no feeds, or refreshed too recently).");
        return;
    }
    for result in results {
        match &result.error {
            None => println!("{}  +{}", column(&result.feed_title), result.new_articles),
            Some(error) => println!("{}  failed: {error}", column(&result.feed_title)),
        }
    }
}

/// Truncates or pads to exactly `TITLE_COLUMN` terminal columns.
fn column(text: &str) -> String {
    let truncated = truncate_to_width(text, TITLE_COLUMN);
    let padding = TITLE_COLUMN.saturating_sub(display_width(&truncated));
    format!("{truncated}{}", " ".repeat(padding))
}
