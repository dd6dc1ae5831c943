use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use promptshare_core::catalog::{Category, Ownership, PromptFilter};
use promptshare_core::config::PromptShareConfig;
use promptshare_core::generation::CredentialPrompt;
use promptshare_core::models::{ArtifactDraft, Viewer};
use promptshare_core::mutator::DeleteConfirmation;
use promptshare_core::sync::SyncEvent;
use promptshare_core::{telemetry, Marketplace};

#[derive(Parser)]
#[command(author, version, about = "PromptShare marketplace client")]
struct Args {
    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List prompts, newest first
    List {
        #[arg(long)]
        category: Option<String>,
        /// Model tag such as "Midjourney" or "Kimi"
        #[arg(long)]
        sub: Option<String>,
        #[arg(long)]
        search: Option<String>,
        /// Only prompts you published
        #[arg(long, conflicts_with = "liked")]
        mine: bool,
        /// Only prompts you liked
        #[arg(long)]
        liked: bool,
    },
    /// Like a prompt, or remove your like
    Like { id: String },
    /// Comment on a prompt
    Comment { id: String, text: String },
    /// Delete a prompt
    Delete {
        id: String,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Publish a new prompt
    Publish {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Comma separated tags
        #[arg(long, default_value = "")]
        tags: String,
        #[arg(long)]
        paid: bool,
        #[arg(long)]
        price: Option<String>,
    },
    /// Generate a batch of prompts with the configured models
    Generate {
        #[arg(long)]
        category: Option<String>,
    },
}

/// Asks for a replacement API key on the terminal.
struct StdinCredentialPrompt;

#[async_trait]
impl CredentialPrompt for StdinCredentialPrompt {
    async fn request_credential(&self, reason: &str) -> Option<String> {
        let mut stdout = tokio::io::stdout();
        let message = format!("Generation credential rejected ({reason}).\nEnter a new API key (empty to cancel): ");
        stdout.write_all(message.as_bytes()).await.ok()?;
        stdout.flush().await.ok()?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await.ok()?;
        let key = line.trim();
        (!key.is_empty()).then(|| key.to_string())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();
    let args = Args::parse();

    let config = PromptShareConfig::load(args.config.as_deref())?;
    let viewer = config.viewer();
    let (event_tx, event_rx) = flume::unbounded();
    let market = Marketplace::from_config(&config, event_tx)?;

    market
        .sync
        .fetch_all(viewer.as_ref())
        .await
        .context("failed to load prompts")?;

    let result = run(&market, args.command, viewer.as_ref()).await;

    for event in event_rx.drain() {
        report(&event);
    }
    result
}

async fn run(market: &Marketplace, command: Command, viewer: Option<&Viewer>) -> Result<()> {
    match command {
        Command::List {
            category,
            sub,
            search,
            mine,
            liked,
        } => {
            let filter = PromptFilter {
                category: parse_category(category.as_deref())?.unwrap_or(Category::All),
                sub_category: sub,
                query: search.unwrap_or_default(),
                ownership: if mine {
                    Ownership::PublishedBy
                } else if liked {
                    Ownership::LikedBy
                } else {
                    Ownership::Everyone
                },
            };
            let snapshot = market.sync.snapshot();
            let shown = filter.apply(&snapshot, viewer);
            for artifact in &shown {
                let heart = if artifact.viewer_has_liked { "♥" } else { " " };
                let price = if artifact.is_paid {
                    format!("¥{:.2}", artifact.price)
                } else {
                    "free".to_string()
                };
                println!(
                    "{heart} {id}  {title}  [{tags}]  {likes} likes, {comments} comments, {price}",
                    id = artifact.id,
                    title = artifact.title,
                    tags = artifact.tags.join(", "),
                    likes = artifact.likes,
                    comments = artifact.comments.len(),
                );
            }
            println!("{} of {} prompts", shown.len(), snapshot.len());
        }
        Command::Like { id } => {
            let viewer = require_viewer(viewer)?;
            market.mutator.toggle_like(&id, Some(viewer)).await;
            match market.sync.artifact(&id) {
                Some(artifact) => println!("{} now has {} likes", artifact.id, artifact.likes),
                None => println!("No prompt with id {id}"),
            }
        }
        Command::Comment { id, text } => {
            let viewer = require_viewer(viewer)?;
            match market.mutator.add_comment(&id, &text, Some(viewer)).await? {
                Some(comment) => println!("Posted comment {}", comment.id),
                None => println!("Nothing to post"),
            }
        }
        Command::Delete { id, yes } => {
            if !yes {
                bail!("refusing to delete {id} without --yes");
            }
            market
                .mutator
                .delete_prompt(DeleteConfirmation::confirmed(id.clone()), viewer)
                .await?;
            println!("Deleted {id}");
        }
        Command::Publish {
            title,
            content,
            description,
            tags,
            paid,
            price,
        } => {
            let viewer = require_viewer(viewer)?;
            let draft = ArtifactDraft {
                title,
                description,
                content,
                tags,
                is_paid: paid,
                price,
            };
            let artifact = market.mutator.add_artifact(draft, viewer).await?;
            println!("Published {} ({})", artifact.title, artifact.id);
        }
        Command::Generate { category } => {
            let viewer = require_viewer(viewer)?;
            let category = parse_category(category.as_deref())?;
            let inserted = market
                .generator
                .auto_generate_with_reauth(category, viewer, &StdinCredentialPrompt)
                .await?;
            println!("Generated {inserted} prompts");
        }
    }
    Ok(())
}

fn require_viewer(viewer: Option<&Viewer>) -> Result<&Viewer> {
    viewer.context("sign in first: set [viewer] in the config or PROMPTSHARE_VIEWER_ID/PROMPTSHARE_VIEWER_NAME")
}

fn parse_category(raw: Option<&str>) -> Result<Option<Category>> {
    match raw {
        None => Ok(None),
        Some(raw) => match Category::parse(raw) {
            Some(category) => Ok(Some(category)),
            None => bail!("unknown category '{raw}'"),
        },
    }
}

fn report(event: &SyncEvent) {
    match event {
        SyncEvent::Resynced { count } => tracing::debug!(count, "mirror refreshed"),
        SyncEvent::ResyncFailed { reason } => eprintln!("Could not refresh prompts: {reason}"),
        SyncEvent::RolledBack { artifact_id, reason } => {
            eprintln!("Like on {artifact_id} failed and was undone: {reason}")
        }
        SyncEvent::DeleteFailed { artifact_id, reason } => {
            eprintln!("Delete of {artifact_id} failed: {reason}")
        }
        SyncEvent::BatchFailed { batch, reason } => {
            eprintln!("Generation batch {batch} failed: {reason}")
        }
        SyncEvent::Generated { category, inserted } => {
            tracing::info!(%category, inserted, "generation finished")
        }
    }
}
