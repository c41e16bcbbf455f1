//! Core library for the `wxfeed` snapshot jobs.
//!
//! This crate defines:
//! - Configuration loading
//! - The [`Fetcher`] abstraction and its upstream sources
//! - Shared domain models (the published JSON documents)
//! - Publishing documents into the static output directory
//!
//! It is used by `wxfeed-cli`, but can also be reused by other binaries.

pub mod config;
pub mod error;
pub mod model;
pub mod publish;
pub mod source;

pub use config::Config;
pub use model::{CurrentConditions, Document, Outlook, PressureForecast, Tendency};
pub use publish::Publisher;
pub use source::{Fetcher, JobId, fetcher_from_config};

/// Fetch one job's document and publish it.
pub async fn run_job(
    id: JobId,
    config: &Config,
    publisher: &Publisher,
) -> anyhow::Result<std::path::PathBuf> {
    let fetcher = fetcher_from_config(id, config)?;
    let doc = fetcher.fetch().await?;
    publisher.publish(&doc)
}
