use super::SynthesisVoice;
use anyhow::{Context, Result};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Per-engine voice list cache stored as `<dir>/<engine>.voices.json`.
///
/// There is no locking: two first-time requests for the same engine may both
/// fetch and both write the file. Each write is a complete snapshot.
#[derive(Debug, Clone)]
pub struct VoiceListCache {
    dir: PathBuf,
    ttl: Duration,
}

impl VoiceListCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn path_for(&self, engine: &str) -> PathBuf {
        self.dir.join(format!("{engine}.voices.json"))
    }

    /// Cached voices when the file exists and is younger than the TTL.
    pub async fn read_fresh(&self, engine: &str) -> Option<Vec<SynthesisVoice>> {
        let path = self.path_for(engine);
        let metadata = tokio::fs::metadata(&path).await.ok()?;
        let modified = metadata.modified().ok()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if age >= self.ttl {
            debug!(engine, ?age, "Voice list cache is stale");
            return None;
        }

        let contents = tokio::fs::read_to_string(&path).await.ok()?;
        match serde_json::from_str(&contents) {
            Ok(voices) => Some(voices),
            Err(e) => {
                warn!(?path, "Voice list cache is corrupt, refetching: {e}");
                None
            }
        }
    }

    pub async fn write(&self, engine: &str, voices: &[SynthesisVoice]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create cache directory {:?}", self.dir))?;
        let path = self.path_for(engine);
        let contents = serde_json::to_string_pretty(voices)?;
        tokio::fs::write(&path, contents)
            .await
            .with_context(|| format!("Failed to write voice list cache {path:?}"))
    }

    /// Returns the cached list, or runs `fetch` and caches its result. A failed
    /// cache write is logged; the fetched list is still returned.
    pub async fn get_or_fetch<F, Fut>(&self, engine: &str, fetch: F) -> Result<Vec<SynthesisVoice>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<SynthesisVoice>>>,
    {
        if let Some(voices) = self.read_fresh(engine).await {
            debug!(engine, count = voices.len(), "Voice list served from cache");
            return Ok(voices);
        }

        let voices = fetch().await?;
        if let Err(e) = self.write(engine, &voices).await {
            warn!(engine, "Failed to cache voice list: {e:?}");
        }
        Ok(voices)
    }
}
