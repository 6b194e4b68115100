//! # zotero-add
//!
//! Add a web page or a PDF to a Zotero library through the Web API.
//!
//! ## Modules
//!
//! - [`resolver`] - Metadata from PDFs (DOI + Crossref, text heuristics) and web pages
//! - [`catalog`] - Zotero Web API client
//! - [`upload`] - Attachment upload handshake
//! - [`workflow`] - Resolve, create, upload
//! - [`config`] - Credentials and client settings
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use zotero_add::{config::Config, metadata::InputSource, workflow::AddPaperWorkflow};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let workflow = AddPaperWorkflow::new(&config)?;
//!     let outcome = workflow.run(&InputSource::parse("paper.pdf")).await?;
//!     println!("Created item: {}", outcome.item_key);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod crossref;
pub mod digest;
pub mod error;
pub mod metadata;
pub mod pdf;
pub mod resolver;
pub mod upload;
pub mod workflow;

pub use error::{ResolveError, Result, ZoteroError};
