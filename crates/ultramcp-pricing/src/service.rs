//! Pricing service: remote fetch with two-layer (memory + disk) caching

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::catalog::{ingest_catalog, CacheFile, CacheMetadata, PricingData};
use crate::cost::{self, CostBreakdown};
use crate::normalize;
use crate::{PricingError, Result};

const DEFAULT_SOURCE_URL: &str =
    "https://raw.githubusercontent.com/BerriAI/litellm/main/model_prices_and_context_window.json";
const CACHE_FILENAME: &str = "litellm-pricing-cache.json";

const MEMORY_TTL: Duration = Duration::from_secs(5 * 60);
const DISK_TTL: Duration = Duration::from_secs(60 * 60);

/// Construction-time settings for [`PricingService`].
#[derive(Debug, Clone)]
pub struct PricingServiceConfig {
    /// Directory holding the cache file
    pub cache_dir: PathBuf,

    /// Remote catalog URL
    pub source_url: String,

    /// Disk cache TTL recorded in the file's metadata
    pub disk_ttl: Duration,

    /// HTTP timeout for catalog fetches
    pub fetch_timeout: Duration,
}

impl PricingServiceConfig {
    /// Defaults rooted at the platform config directory
    /// (`%APPDATA%\ultra-mcp-nodejs\` on Windows, `~/.config/ultra-mcp/`
    /// elsewhere).
    pub fn with_default_cache_dir() -> Self {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        let cache_dir = if cfg!(windows) {
            base.join("ultra-mcp-nodejs")
        } else {
            base.join("ultra-mcp")
        };
        Self::new(cache_dir)
    }

    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            source_url: DEFAULT_SOURCE_URL.to_string(),
            disk_ttl: DISK_TTL,
            fetch_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = url.into();
        self
    }
}

/// In-memory snapshot of the catalog.
///
/// Readers clone the `Arc`; the single writer path in `get_latest_pricing`
/// swaps the snapshot after a successful refresh.
struct MemorySnapshot {
    data: Arc<PricingData>,
    fetched_at: Instant,
}

/// Process-wide pricing service.
///
/// Created once at startup and passed to the tracker as an explicit
/// dependency.
pub struct PricingService {
    config: PricingServiceConfig,
    snapshot: RwLock<Option<MemorySnapshot>>,
    client: reqwest::Client,
}

impl PricingService {
    pub fn new(config: PricingServiceConfig) -> Self {
        if let Err(e) = std::fs::create_dir_all(&config.cache_dir) {
            warn!("Failed to create pricing cache directory: {e}");
        }

        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .build()
            .unwrap_or_default();

        Self {
            config,
            snapshot: RwLock::new(None),
            client,
        }
    }

    fn cache_file_path(&self) -> PathBuf {
        self.config.cache_dir.join(CACHE_FILENAME)
    }

    /// Age of the in-memory snapshot, if one exists.
    pub async fn last_fetch_age(&self) -> Option<Duration> {
        let snapshot = self.snapshot.read().await;
        snapshot.as_ref().map(|s| s.fetched_at.elapsed())
    }

    /// Return the current catalog, honoring the cache layers.
    ///
    /// Order: fresh memory snapshot, fresh disk cache, remote fetch. On
    /// fetch failure a stale disk cache is returned with a warning; only
    /// when both remote and disk are gone does this raise
    /// [`PricingError::Unavailable`].
    pub async fn get_latest_pricing(&self, force_refresh: bool) -> Result<Arc<PricingData>> {
        if !force_refresh {
            let snapshot = self.snapshot.read().await;
            if let Some(s) = snapshot.as_ref() {
                if s.fetched_at.elapsed() < MEMORY_TTL {
                    return Ok(s.data.clone());
                }
            }
        }

        if !force_refresh {
            if let Some(file) = self.read_disk_cache() {
                if file.is_fresh(chrono::Utc::now().timestamp()) {
                    debug!("Pricing disk cache is fresh, skipping remote fetch");
                    let data = Arc::new(file.data);
                    self.store_snapshot(data.clone()).await;
                    return Ok(data);
                }
            }
        }

        match self.fetch_remote().await {
            Ok(data) => {
                let data = Arc::new(data);
                self.write_disk_cache(&data)?;
                self.store_snapshot(data.clone()).await;
                info!(models = data.len(), "Refreshed pricing catalog");
                Ok(data)
            }
            Err(fetch_err) => {
                if let Some(stale) = self.read_disk_cache() {
                    warn!(
                        "Pricing fetch failed ({fetch_err}); serving stale disk cache from {}",
                        stale.metadata.timestamp
                    );
                    let data = Arc::new(stale.data);
                    self.store_snapshot(data.clone()).await;
                    return Ok(data);
                }
                Err(PricingError::Unavailable)
            }
        }
    }

    /// Resolve the cost of a call.
    ///
    /// `None` when the model has no catalog entry (after normalization and
    /// substring lookup) or its entry cannot price a text call.
    pub async fn calculate_cost(
        &self,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<Option<CostBreakdown>> {
        let data = self.get_latest_pricing(false).await?;
        Ok(normalize::lookup(&data, model)
            .and_then(|(_, pricing)| cost::calculate(pricing, input_tokens, output_tokens)))
    }

    /// Drop both cache layers.
    pub async fn clear_cache(&self) -> Result<()> {
        let path = self.cache_file_path();
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| PricingError::CacheWrite(e.to_string()))?;
        }
        *self.snapshot.write().await = None;
        Ok(())
    }

    /// Cache diagnostics for the `pricing info` CLI command.
    pub async fn cache_info(&self) -> (Option<Duration>, Option<CacheMetadata>, usize) {
        let memory_age = self.last_fetch_age().await;
        let disk_meta = self.read_disk_cache().map(|f| f.metadata);
        let model_count = self
            .snapshot
            .read()
            .await
            .as_ref()
            .map(|s| s.data.len())
            .unwrap_or(0);
        (memory_age, disk_meta, model_count)
    }

    async fn store_snapshot(&self, data: Arc<PricingData>) {
        let mut snapshot = self.snapshot.write().await;
        *snapshot = Some(MemorySnapshot {
            data,
            fetched_at: Instant::now(),
        });
    }

    async fn fetch_remote(&self) -> Result<PricingData> {
        let response = self
            .client
            .get(&self.config.source_url)
            .send()
            .await
            .map_err(|e| PricingError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PricingError::Fetch(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| PricingError::Fetch(e.to_string()))?;

        ingest_catalog(&body)
    }

    /// A cache file that fails to parse is treated as missing.
    fn read_disk_cache(&self) -> Option<CacheFile> {
        let path = self.cache_file_path();
        let contents = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<CacheFile>(&contents) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!(path = %path.display(), "Discarding unparseable pricing cache: {e}");
                None
            }
        }
    }

    fn write_disk_cache(&self, data: &PricingData) -> Result<()> {
        let file = CacheFile {
            metadata: CacheMetadata {
                timestamp: chrono::Utc::now().timestamp(),
                source_url: self.config.source_url.clone(),
                ttl_secs: self.config.disk_ttl.as_secs(),
            },
            data: data.clone(),
        };

        let contents =
            serde_json::to_string(&file).map_err(|e| PricingError::CacheWrite(e.to_string()))?;
        std::fs::write(self.cache_file_path(), contents)
            .map_err(|e| PricingError::CacheWrite(e.to_string()))
    }
}
