//! # Copydesk CLI (`cpd`)
//!
//! The `cpd` binary is the operator's interface to Copydesk. It drives the
//! page edit workflow, slideshow management, and raw file operations against
//! the configured content store.
//!
//! ## Usage
//!
//! ```bash
//! cpd --config ./config/copydesk.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cpd pages list` | List editable pages found in the store |
//! | `cpd pages get <slug>` | Extract a page's text segments |
//! | `cpd pages apply <slug> --updates <file>` | Apply edited segments and save |
//! | `cpd slides list` | List slide images and the manifest |
//! | `cpd slides upload <file>` | Upload a slide image |
//! | `cpd slides rm <name>` | Delete a slide and prune the manifest |
//! | `cpd slides set-manifest <file>` | Replace the slides manifest |
//! | `cpd file get <path>` | Print a raw file from the store |
//! | `cpd file put <path> <file>` | Write a raw file to the store |
//! | `cpd file rm <path>` | Delete a raw file from the store |
//!
//! The API token is read from `GITHUB_TOKEN`. Segment updates are a JSON
//! array of `{"id": "...", "text": "..."}` objects, as produced by editing
//! the output of `cpd pages get`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use copydesk::config::{load_config, Config};
use copydesk::models::{SegmentUpdate, SlideEntry};
use copydesk::pages;
use copydesk::slides;
use copydesk::store::RemoteStore;

/// Copydesk — edit bilingual site copy stored in a git-backed file store.
#[derive(Parser)]
#[command(
    name = "cpd",
    about = "Copydesk — edit bilingual site copy stored in a git-backed file store",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/copydesk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Page text segments: list, extract, apply.
    Pages {
        #[command(subcommand)]
        action: PagesAction,
    },

    /// Slideshow images and manifest.
    Slides {
        #[command(subcommand)]
        action: SlidesAction,
    },

    /// Raw store files (escape hatch for anything not covered above).
    File {
        #[command(subcommand)]
        action: FileAction,
    },
}

#[derive(Subcommand)]
enum PagesAction {
    /// List editable page slugs found in the store.
    List,

    /// Fetch a page and print its editable segments with ids.
    Get {
        /// Page slug, or `index` for the home page.
        slug: String,

        /// Locale; defaults to the configured default locale.
        #[arg(long)]
        locale: Option<String>,
    },

    /// Apply edited segments to a page and save it back.
    Apply {
        /// Page slug, or `index` for the home page.
        slug: String,

        /// JSON file with an array of `{id, text}` updates.
        #[arg(long)]
        updates: PathBuf,

        /// Locale; defaults to the configured default locale.
        #[arg(long)]
        locale: Option<String>,

        /// Fingerprint from `pages get`; the save is refused if the stored
        /// page no longer matches.
        #[arg(long)]
        fingerprint: Option<String>,
    },
}

#[derive(Subcommand)]
enum SlidesAction {
    /// List slide image files and the manifest.
    List,

    /// Upload an image into the slides directory.
    Upload {
        /// Local image file.
        file: PathBuf,

        /// Name to store it under; defaults to the local file name.
        #[arg(long)]
        name: Option<String>,
    },

    /// Delete a slide image and prune it from the manifest.
    Rm {
        /// Stored file name.
        name: String,
    },

    /// Replace the slides manifest with the given JSON file.
    SetManifest {
        /// JSON file with an array of manifest rows.
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum FileAction {
    /// Print a file's content.
    Get { path: String },

    /// Write a local file to the store.
    Put {
        path: String,
        file: PathBuf,
        /// Change message; defaults to "Update {path}".
        #[arg(long)]
        message: Option<String>,
    },

    /// Delete a file from the store.
    Rm {
        path: String,
        /// Change message; defaults to "Delete {path}".
        #[arg(long)]
        message: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let store = RemoteStore::new(config.store.clone(), config.client.clone())?;

    match cli.command {
        Commands::Pages { action } => run_pages(action, &store, &config).await,
        Commands::Slides { action } => run_slides(action, &store, &config).await,
        Commands::File { action } => run_file(action, &store).await,
    }
}

async fn run_pages(action: PagesAction, store: &RemoteStore, config: &Config) -> Result<()> {
    match action {
        PagesAction::List => {
            let index = pages::list_pages(store, &config.site).await?;
            println!("{}", serde_json::to_string_pretty(&index)?);
        }
        PagesAction::Get { slug, locale } => {
            let locale = locale.unwrap_or_else(|| config.site.default_locale.clone());
            let page = pages::page_segments(store, &config.site, &slug, &locale).await?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        PagesAction::Apply {
            slug,
            updates,
            locale,
            fingerprint,
        } => {
            let locale = locale.unwrap_or_else(|| config.site.default_locale.clone());
            let raw = std::fs::read_to_string(&updates)
                .with_context(|| format!("Failed to read updates file: {}", updates.display()))?;
            let updates: Vec<SegmentUpdate> = serde_json::from_str(&raw)
                .with_context(|| "Updates file must be a JSON array of {id, text} objects")?;
            pages::save_segments(
                store,
                &config.site,
                &slug,
                &locale,
                &updates,
                fingerprint.as_deref(),
            )
            .await?;
            println!("ok: saved {} update(s) to {}.{}", updates.len(), slug, locale);
        }
    }
    Ok(())
}

async fn run_slides(action: SlidesAction, store: &RemoteStore, config: &Config) -> Result<()> {
    match action {
        SlidesAction::List => {
            let slideshow = slides::list_slides(store, &config.site).await?;
            println!("{}", serde_json::to_string_pretty(&slideshow)?);
        }
        SlidesAction::Upload { file, name } => {
            let name = match name {
                Some(n) => n,
                None => file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .with_context(|| format!("Cannot derive a name from {}", file.display()))?,
            };
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            slides::upload_slide(store, &config.site, &name, &bytes).await?;
            println!("ok: uploaded {} ({} bytes)", name, bytes.len());
        }
        SlidesAction::Rm { name } => {
            slides::delete_slide(store, &config.site, &name).await?;
            println!("ok: deleted {}", name);
        }
        SlidesAction::SetManifest { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let entries: Vec<SlideEntry> = serde_json::from_str(&raw)
                .with_context(|| "Manifest file must be a JSON array of slide rows")?;
            slides::save_manifest(store, &config.site, &entries).await?;
            println!("ok: manifest now has {} slide(s)", entries.len());
        }
    }
    Ok(())
}

async fn run_file(action: FileAction, store: &RemoteStore) -> Result<()> {
    match action {
        FileAction::Get { path } => {
            let file = store.get_file(&path).await?;
            print!("{}", file.content);
        }
        FileAction::Put {
            path,
            file,
            message,
        } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let message = message.unwrap_or_else(|| format!("Update {}", path));
            store.put_file(&path, &content, &message).await?;
            println!("ok: wrote {}", path);
        }
        FileAction::Rm { path, message } => {
            let message = message.unwrap_or_else(|| format!("Delete {}", path));
            store.delete_file(&path, &message).await?;
            println!("ok: deleted {}", path);
        }
    }
    Ok(())
}
