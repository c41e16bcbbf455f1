use anyhow::bail;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;
use tracing::{error, info};
use wxfeed_core::{Config, JobId, Publisher, run_job};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "wxfeed", version, about = "Fetch weather snapshots and publish them as static JSON")]
pub struct Cli {
    /// Config file; defaults to the platform config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory the JSON documents are written to; overrides the config file.
    #[arg(long, global = true, env = "WXFEED_OUTPUT_DIR")]
    pub out_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Publish current_conditions.json from the Environment Canada feed.
    Conditions,

    /// Publish pressure_forecast.json from OpenWeather One Call.
    Forecast,

    /// Publish forecast.json, the feed's text forecast folded into days.
    Outlook,

    /// Run every job; fails if any job fails.
    All,

    /// Inspect or create the config file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the config file path.
    Path,
    /// Print the effective configuration as TOML.
    Show,
    /// Write a config file with default values.
    Init {
        /// Replace an existing file.
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config_path = match &self.config {
            Some(path) => path.clone(),
            None => Config::config_file_path()?,
        };

        match &self.command {
            Command::Conditions => run_jobs(&[JobId::Conditions], &self.effective(&config_path)?).await,
            Command::Forecast => run_jobs(&[JobId::Forecast], &self.effective(&config_path)?).await,
            Command::Outlook => run_jobs(&[JobId::Outlook], &self.effective(&config_path)?).await,
            Command::All => run_jobs(JobId::all(), &self.effective(&config_path)?).await,
            Command::Config { action } => match action {
                ConfigAction::Path => {
                    println!("{}", config_path.display());
                    Ok(())
                }
                ConfigAction::Show => {
                    print!("{}", self.effective(&config_path)?.to_toml()?);
                    Ok(())
                }
                ConfigAction::Init { force } => {
                    if config_path.exists() && !*force {
                        bail!(
                            "Config file already exists: {}\n\
                             Hint: pass --force to overwrite it.",
                            config_path.display()
                        );
                    }
                    Config::default().save_to(&config_path)?;
                    println!("Wrote {}", config_path.display());
                    Ok(())
                }
            },
        }
    }

    /// The config file with command-line overrides applied.
    fn effective(&self, config_path: &Path) -> anyhow::Result<Config> {
        let mut config = Config::load_from(config_path)?;
        if let Some(dir) = &self.out_dir {
            config.output_dir = dir.clone();
        }
        Ok(config)
    }
}

/// Run jobs concurrently. Every job runs to completion even if another fails.
async fn run_jobs(jobs: &[JobId], config: &Config) -> anyhow::Result<()> {
    let publisher = Publisher::new(&config.output_dir);
    info!(out_dir = %publisher.out_dir().display(), jobs = jobs.len(), "starting run");

    let mut set = JoinSet::new();
    for &id in jobs {
        let config = config.clone();
        let publisher = publisher.clone();
        set.spawn(async move { (id, run_job(id, &config, &publisher).await) });
    }

    let mut failed = Vec::new();
    while let Some(joined) = set.join_next().await {
        let (id, result) = joined?;
        match result {
            Ok(path) => info!(job = %id, path = %path.display(), "job succeeded"),
            Err(e) => {
                error!(job = %id, "job failed: {e:#}");
                failed.push(id.as_str());
            }
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        failed.sort_unstable();
        bail!("{} job(s) failed: {}", failed.len(), failed.join(", "))
    }
}
