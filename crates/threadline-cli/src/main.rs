//! Threadline - drive a comment feed from the terminal
//!
//! Loads a scope's comments through the same controller a UI would use:
//! - `show` pages through the feed, optionally following a deep link
//! - `post`, `reply`, `edit`, `delete` write through the backend
//!
//! The default backend is an in-memory demo scope; `--backend http` talks to
//! a real comment API.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;

use threadline_core::feed::{Comment, LoadStatus, NoticeKind};
use threadline_core::{
    CommentBackend, CommentId, ExternalRef, FeedConfig, FeedController, HttpBackend,
    InMemoryBackend, Mutation, ScopeId,
};

/// Threadline - threaded comment feeds
#[derive(Parser)]
#[command(name = "threadline")]
#[command(about = "Drive and inspect threaded comment feeds", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Announcement whose comments to load
    #[arg(short, long, default_value = "announcement-1")]
    scope: String,

    /// Where comments come from
    #[arg(short, long, value_enum, default_value_t = Backend::Memory)]
    backend: Backend,

    /// Backend API base URL (overrides the config file)
    #[arg(long)]
    base_url: Option<String>,

    /// Config file (defaults to ~/.threadline/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Demo comments held in memory
    Memory,
    /// JSON API at the configured base URL
    Http,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the feed, pinning and highlighting a linked comment or reply
    Show {
        /// Deep link to a top-level comment
        #[arg(long)]
        comment: Option<String>,

        /// Deep link to a reply
        #[arg(long)]
        reply: Option<String>,

        /// Number of pages to load
        #[arg(short, long, default_value_t = 1)]
        pages: u32,

        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Post a top-level comment
    Post {
        body: String,
        #[arg(long, default_value = "member-cli")]
        author: String,
    },

    /// Reply to a top-level comment
    Reply {
        parent: String,
        body: String,
        #[arg(long, default_value = "member-cli")]
        author: String,
    },

    /// Edit a comment or reply
    Edit {
        id: String,
        body: String,
        /// The id names a reply
        #[arg(long)]
        reply: bool,
    },

    /// Delete a comment (with its replies) or a reply
    Delete {
        id: String,
        /// The id names a reply
        #[arg(long)]
        reply: bool,
    },
}

fn init_logging(log_file: Option<&PathBuf>) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<FeedConfig> {
    let mut config = match &cli.config {
        Some(path) => FeedConfig::load(path)?,
        None => FeedConfig::load_or_default(&FeedConfig::default_path())?,
    };
    if let Some(base_url) = &cli.base_url {
        config.http.base_url = base_url.clone();
    }
    Ok(config)
}

fn open_backend(
    cli: &Cli,
    scope: &ScopeId,
    config: &FeedConfig,
) -> Result<Arc<dyn CommentBackend>> {
    let backend: Arc<dyn CommentBackend> = match cli.backend {
        Backend::Memory => Arc::new(InMemoryBackend::demo(scope, 25, 3)),
        Backend::Http => {
            tracing::info!(base_url = %config.http.base_url, "Using HTTP backend");
            Arc::new(HttpBackend::new(&config.http)?)
        }
    };
    Ok(backend)
}

fn print_comment(comment: &Comment, indent: &str, highlighted: bool) {
    let marker = if highlighted { ">" } else { " " };
    let created = comment
        .created_at
        .with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M");
    let edited = if comment.edited { " (edited)" } else { "" };
    println!(
        "{marker}{indent}{}  {}  {}{edited}",
        comment.id, comment.author_ref, created
    );
    println!(" {indent}  {}", comment.body);
}

async fn show(
    feed: &mut FeedController,
    reference: Option<ExternalRef>,
    pages: u32,
    as_json: bool,
) -> Result<()> {
    feed.load();
    feed.resolve_external_reference(reference);
    feed.settle().await;
    if let LoadStatus::Failed(message) = feed.status() {
        anyhow::bail!("failed to load comments: {message}");
    }

    for _ in 1..pages {
        if !feed.request_next_page() {
            break;
        }
        feed.settle().await;
    }

    // One render, then wait out the settle delay for the scroll
    let rendered = feed.visible_ids();
    feed.observe_render(&rendered, std::time::Instant::now());
    let scroll = match feed.next_deadline() {
        Some(deadline) => {
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
            feed.tick(deadline)
        }
        None => None,
    };

    let snapshot = feed.snapshot();
    let highlight = feed.highlight_state();

    if as_json {
        let notices: Vec<_> = feed.notices().visible().map(|n| n.message.clone()).collect();
        let output = json!({
            "feed": &*snapshot,
            "highlight": highlight.highlight_id.as_ref().map(CommentId::as_str),
            "scrolledTo": scroll.as_ref().map(|s| s.target.as_str()),
            "hasMore": feed.has_more(),
            "notices": notices,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for notice in feed.notices().visible() {
        let label = match notice.kind {
            NoticeKind::NotFound => "not found",
            NoticeKind::LoadFailed => "error",
        };
        println!("[{label}] {}", notice.message);
    }

    let total = snapshot.pages.last().map(|p| p.total_items).unwrap_or(0);
    println!("{} ({} comments)", snapshot.scope, total);
    println!();
    for comment in snapshot.items() {
        print_comment(
            comment,
            "",
            highlight.highlight_id.as_ref() == Some(&comment.id),
        );
        if let Some(thread) = feed.replies().get(&comment.id).filter(|t| t.expanded) {
            for reply in thread.feed.items() {
                print_comment(
                    reply,
                    "    ",
                    highlight.highlight_id.as_ref() == Some(&reply.id),
                );
            }
        } else if comment.reply_count > 0 {
            println!("      {} replies", comment.reply_count);
        }
    }
    if feed.has_more() {
        println!();
        println!("  ... more comments (use --pages)");
    }
    if let Some(scroll) = scroll {
        tracing::info!(id = %scroll.target, "Scrolled into view");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_ref())?;

    let config = load_config(&cli)?;
    let scope = ScopeId::new(cli.scope.as_str());
    let backend = open_backend(&cli, &scope, &config)?;
    let mut feed = FeedController::new(scope, backend, config);

    let mutation = match cli.command {
        Commands::Show {
            comment,
            reply,
            pages,
            json,
        } => {
            let reference = ExternalRef::from_params(comment.as_deref(), reply.as_deref())?;
            return show(&mut feed, reference, pages.max(1), json).await;
        }
        Commands::Post { body, author } => Mutation::CreateComment {
            author_ref: author,
            body,
        },
        Commands::Reply {
            parent,
            body,
            author,
        } => Mutation::CreateReply {
            parent: CommentId::new(parent),
            author_ref: author,
            body,
        },
        Commands::Edit { id, body, reply } => {
            let id = CommentId::new(id);
            if reply {
                Mutation::UpdateReply { id, body }
            } else {
                Mutation::UpdateComment { id, body }
            }
        }
        Commands::Delete { id, reply } => {
            let id = CommentId::new(id);
            if reply {
                Mutation::DeleteReply { id }
            } else {
                Mutation::DeleteComment { id }
            }
        }
    };

    match feed.apply_mutation(mutation).await? {
        Some(comment) => println!("{}", serde_json::to_string_pretty(&comment)?),
        None => println!("Deleted"),
    }
    Ok(())
}
