//! zotero-add - add a web page or PDF to a Zotero library
//!
//! ## Usage
//!
//! ```bash
//! export ZOTERO_API_KEY=... ZOTERO_LIBRARY_ID=... ZOTERO_LIBRARY_TYPE=user
//! zotero-add paper.pdf
//! zotero-add https://example.org/article --verify
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, Level};
use tracing_subscriber::{fmt, EnvFilter};
use zotero_add::{
    config::Config,
    metadata::InputSource,
    upload::UploadStatus,
    workflow::{AddPaperOutcome, AddPaperWorkflow},
};

// ============================================================================
// CLI Definition
// ============================================================================

/// Add a web page or PDF to a Zotero library
#[derive(Parser)]
#[command(name = "zotero-add")]
#[command(version, about, long_about = None)]
struct Cli {
    /// PDF file path or web page URL
    input: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Settings file (default: ~/.zotero_add.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Print the resolved metadata as JSON and stop
    #[arg(long)]
    resolve_only: bool,

    /// Read the item back from the library after adding it
    #[arg(long)]
    verify: bool,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.debug, cli.log_json);

    let mut config =
        Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(seconds) = cli.timeout {
        config = config.with_timeout(seconds)?;
    }

    let workflow = AddPaperWorkflow::new(&config)?;
    let input = InputSource::parse(&cli.input);

    if cli.resolve_only {
        let record = workflow.resolve(&input).await?;
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    let outcome = match workflow.run(&input).await {
        Ok(outcome) => outcome,
        Err(e) => {
            // The item stays in the library; say so before failing
            if let Some(key) = e.orphaned_item_key() {
                println!("Created item: {}", key);
            }
            error!(error = %e, "Failed to add {}", cli.input);
            return Err(e.into());
        }
    };

    print_outcome(&outcome);

    if cli.verify {
        let verification = workflow
            .verify(&outcome.item_key)
            .await
            .context("Failed to read the item back")?;
        println!(
            "Verified item: {} \"{}\" ({} attachment(s))",
            verification.item.key,
            verification.item.data.title,
            verification.attachments.len()
        );
    }

    Ok(())
}

fn init_logging(debug: bool, json: bool) {
    let log_level = if debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_outcome(outcome: &AddPaperOutcome) {
    println!("Created item: {}", outcome.item_key);

    if let Some(upload) = &outcome.upload {
        match upload.status {
            UploadStatus::Uploaded => println!("Upload complete: {}", upload.stub.filename),
            UploadStatus::AlreadyExists => println!(
                "Upload complete: {} (already in library)",
                upload.stub.filename
            ),
        }
    }
}
