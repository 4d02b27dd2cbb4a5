//! SnapSeek CLI - Command-line interface
//!
//! Usage:
//!   snapseek stats
//!   snapseek search <query> [--top-k N] [--threshold T] [--multimodal]
//!   snapseek index <id> <caption> <filename>
//!   snapseek delete <id>
//!   snapseek status
//!   snapseek backfill

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use snapseek_core::{AppConfig, ImageId, QueryResult};
use snapseek_search::SearchEngine;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "snapseek")]
#[command(about = "Semantic image search CLI")]
#[command(version)]
struct Cli {
    /// TOML configuration file (environment variables override it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show caption and image collection statistics
    Stats,
    /// Search images by text
    Search {
        /// Free-text query
        query: String,
        /// Maximum number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Minimum similarity, exclusive
        #[arg(short, long, allow_negative_numbers = true)]
        threshold: Option<f32>,
        /// Merge image-space and caption results
        #[arg(short, long)]
        multimodal: bool,
    },
    /// Embed a caption and store it
    Index {
        id: String,
        caption: String,
        filename: String,
    },
    /// Embed an image file into the image collection
    IndexImage {
        id: String,
        filename: String,
        /// Local path of the image
        path: PathBuf,
    },
    /// Remove an image from every index
    Delete { id: String },
    /// Compare stored embeddings with the catalog
    Status,
    /// Embed every catalog image
    Backfill,
    /// Describe a local image with the vision model
    Caption {
        path: PathBuf,
        #[arg(short, long)]
        prompt: Option<String>,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)
            .and_then(AppConfig::with_env_override)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => AppConfig::from_env().context("loading configuration from environment")?,
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,snapseek_search={}", config.logging.level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_results(results: &[QueryResult]) {
    if results.is_empty() {
        println!("No matching images.");
        return;
    }
    for (rank, result) in results.iter().enumerate() {
        println!(
            "{:>3}. [{:.4}] {} ({}) {}",
            rank + 1,
            result.similarity,
            result.id,
            result.filename,
            result.caption.as_deref().unwrap_or("-")
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    init_tracing(&config);

    let engine = SearchEngine::from_config(&config)
        .await
        .context("building search engine")?;

    match cli.command {
        Commands::Stats => {
            let captions = engine.stats().await?;
            let images = engine.image_stats().await?;
            if cli.json {
                print_json(&serde_json::json!({"captions": captions, "images": images}))?;
            } else {
                println!("{}: {} embeddings", captions.name, captions.count);
                if let Some(images) = images {
                    println!("{}: {} embeddings", images.name, images.count);
                }
            }
        }
        Commands::Search {
            query,
            top_k,
            threshold,
            multimodal,
        } => {
            let results = if multimodal {
                engine.multimodal_search(&query, threshold).await?
            } else {
                engine.search(&query, top_k, threshold).await?
            };
            if cli.json {
                print_json(&results)?;
            } else {
                print_results(&results);
            }
        }
        Commands::Index {
            id,
            caption,
            filename,
        } => {
            let id = ImageId::parse(&id)?;
            engine.index_caption(id.clone(), &caption, filename).await?;
            println!("Embedding saved for image {id}");
        }
        Commands::IndexImage { id, filename, path } => {
            let id = ImageId::parse(&id)?;
            let image = tokio::fs::read(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            engine.index_image(id.clone(), filename, &image).await?;
            println!("Image embedding saved for image {id}");
        }
        Commands::Delete { id } => {
            let id = ImageId::parse(&id)?;
            engine.delete_embedding(&id).await?;
            println!("Embedding deleted for image {id}");
        }
        Commands::Status => {
            let status = engine.embedding_status().await?;
            if cli.json {
                print_json(&status)?;
            } else {
                println!("catalog images:     {}", status.total_images);
                println!("caption embeddings: {}", status.caption_embeddings);
                if let Some(images) = status.image_embeddings {
                    println!("image embeddings:   {images}");
                }
                println!("initialized:        {}", status.initialized);
            }
        }
        Commands::Backfill => {
            let report = engine.backfill().await?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!(
                    "processed {} / {} images ({} failed, {} skipped)",
                    report.processed, report.total, report.failed, report.skipped
                );
            }
        }
        Commands::Caption { path, prompt } => {
            let image = tokio::fs::read(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let caption = engine.generate_caption(&image, prompt.as_deref()).await?;
            println!("{caption}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_search() {
        let cli = Cli::try_parse_from([
            "snapseek",
            "search",
            "red car",
            "--top-k",
            "5",
            "--threshold",
            "-0.1",
            "--multimodal",
        ])
        .unwrap();

        match cli.command {
            Commands::Search {
                query,
                top_k,
                threshold,
                multimodal,
            } => {
                assert_eq!(query, "red car");
                assert_eq!(top_k, Some(5));
                assert_eq!(threshold, Some(-0.1));
                assert!(multimodal);
            }
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn test_parse_global_config() {
        let cli = Cli::try_parse_from(["snapseek", "stats", "--config", "snapseek.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("snapseek.toml")));
        assert!(matches!(cli.command, Commands::Stats));
    }
}
