use crate::error::Result;
use crate::models::{PlaceCandidate, ReviewRecord, SentimentRow};
use chrono::Local;
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const ALL_REVIEWS_FILE: &str = "restaurant_reviews_all_languages.json";
pub const UKRAINIAN_REVIEWS_FILE: &str = "restaurant_reviews_ukrainian_only.json";
pub const CANDIDATES_FILE: &str = "restaurant_ids.json";
pub const SENTIMENT_CSV_FILE: &str = "reviews.csv";

/// What happened to a filtered dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written { path: PathBuf, count: usize },
    /// Nothing matched; no file was written
    Empty,
}

/// Writes the final review datasets, overwriting whole files
#[derive(Debug, Clone)]
pub struct DatasetWriter {
    dir: PathBuf,
}

impl DatasetWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// Every review, all languages
    pub async fn write_all(&self, reviews: &[ReviewRecord]) -> Result<PathBuf> {
        let path = self.path(ALL_REVIEWS_FILE);
        write_json(&path, reviews).await?;
        info!("💾 All reviews ({}) saved to: {}", reviews.len(), path.display());
        Ok(path)
    }

    /// Reviews matching `predicate`, saved as `file_name`; skipped when nothing matches
    pub async fn write_filtered<P>(
        &self,
        file_name: &str,
        reviews: &[ReviewRecord],
        predicate: P,
    ) -> Result<WriteOutcome>
    where
        P: Fn(&ReviewRecord) -> bool,
    {
        let filtered: Vec<&ReviewRecord> = reviews.iter().filter(|r| predicate(*r)).collect();
        if filtered.is_empty() {
            warn!("No reviews matched the filter, {} not written", file_name);
            return Ok(WriteOutcome::Empty);
        }

        let path = self.path(file_name);
        write_json(&path, &filtered).await?;
        info!("💾 Filtered reviews ({}) saved to: {}", filtered.len(), path.display());
        Ok(WriteOutcome::Written {
            path,
            count: filtered.len(),
        })
    }

    /// One-off dump named after the current local time, e.g. `gmaps_reviews_20240301_101500.json`
    pub async fn write_timestamped(&self, prefix: &str, reviews: &[ReviewRecord]) -> Result<PathBuf> {
        let name = format!("{}_{}.json", prefix, Local::now().format("%Y%m%d_%H%M%S"));
        let path = self.path(&name);
        write_json(&path, reviews).await?;
        info!("💾 Saved {} reviews to {}", reviews.len(), path.display());
        Ok(path)
    }
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub async fn save_candidates(path: &Path, candidates: &[PlaceCandidate]) -> Result<()> {
    write_json(path, candidates).await?;
    info!("💾 Restaurant IDs saved to: {}", path.display());
    Ok(())
}

/// Load a saved candidate list; a missing file is an empty list
pub async fn load_candidates(path: &Path) -> Result<Vec<PlaceCandidate>> {
    match read_json(path).await? {
        Some(candidates) => Ok(candidates),
        None => {
            warn!("File {} not found", path.display());
            Ok(Vec::new())
        }
    }
}

/// Load a previously written review dataset; a missing file is an empty list
pub async fn load_reviews(path: &Path) -> Result<Vec<ReviewRecord>> {
    Ok(read_json(path).await?.unwrap_or_default())
}

/// Write the `Review,Liked` training CSV; returns the number of rows
pub fn export_sentiment_csv(path: &Path, reviews: &[ReviewRecord]) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    let mut rows = 0;
    for row in reviews.iter().filter_map(SentimentRow::from_record) {
        writer.serialize(&row)?;
        rows += 1;
    }
    writer.flush()?;

    info!("💾 {} sentiment rows saved to {}", rows, path.display());
    Ok(rows)
}
