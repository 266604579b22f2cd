//! Background jobs that keep the quest catalog current: a periodic feed
//! refresh and the daily clear at local midnight.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use questpal_core::catalog::{InMemoryQuestCatalog, IngestReport};
use questpal_core::domain::quest::Quest;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::warn;

const MIDNIGHT_RETRY: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("could not read quest feed `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse quest feed `{path}`: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
}

/// Reads a JSON array of quest records.
pub async fn load_feed(path: &Path) -> Result<Vec<Quest>, FeedError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| FeedError::Read { path: path.to_path_buf(), source })?;
    serde_json::from_str(&raw).map_err(|source| FeedError::Parse { path: path.to_path_buf(), source })
}

pub async fn refresh_once(catalog: &InMemoryQuestCatalog, path: &Path) -> Result<IngestReport, FeedError> {
    let quests = load_feed(path).await?;
    Ok(catalog.ingest(quests))
}

pub fn spawn_feed_refresh(
    catalog: Arc<InMemoryQuestCatalog>,
    path: PathBuf,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(error) = refresh_once(&catalog, &path).await {
                warn!(
                    event_name = "catalog.feed_failed",
                    error = %error,
                    "quest feed refresh failed; keeping current catalog"
                );
            }
        }
    })
}

/// Time left until the next midnight in `now`'s time zone. When that
/// midnight does not exist locally (a DST gap) the job retries shortly.
pub fn until_next_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> Duration {
    let Some(midnight) = now.date_naive().succ_opt().and_then(|day| day.and_hms_opt(0, 0, 0)) else {
        return MIDNIGHT_RETRY;
    };
    match midnight.and_local_timezone(now.timezone()).earliest() {
        Some(next) => (next - now.clone()).to_std().unwrap_or(MIDNIGHT_RETRY),
        None => MIDNIGHT_RETRY,
    }
}

pub fn spawn_midnight_clear(catalog: Arc<InMemoryQuestCatalog>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(until_next_midnight(&Local::now())).await;
            catalog.clear();
        }
    })
}
