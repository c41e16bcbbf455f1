use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::info;

use crate::Document;

/// Writes documents into the directory served by the static host.
#[derive(Debug, Clone)]
pub struct Publisher {
    out_dir: PathBuf,
}

impl Publisher {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self { out_dir: out_dir.into() }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Serialize `doc` as pretty JSON and overwrite its file. Returns the path written.
    pub fn publish(&self, doc: &Document) -> Result<PathBuf> {
        fs::create_dir_all(&self.out_dir).with_context(|| {
            format!("Failed to create output directory: {}", self.out_dir.display())
        })?;

        let path = self.out_dir.join(doc.file_name());
        let mut json = doc.to_json_pretty().context("Failed to serialize document to JSON")?;
        json.push('\n');

        fs::write(&path, json)
            .with_context(|| format!("Failed to write output file: {}", path.display()))?;

        info!(path = %path.display(), "published");
        Ok(path)
    }
}
