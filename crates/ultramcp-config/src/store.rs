//! File-backed configuration store with environment overlay

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::schema::{Config, VectorConfig};
use ultramcp_core::types::ProviderKind;
use ultramcp_core::{Error, Result};

const CONFIG_FILENAME: &str = "config.json";

/// Environment variables overlaid onto the loaded config.
///
/// The config file wins when both define a value; the overlay only fills
/// gaps. `AZURE_ENDPOINT` is a legacy alias for `AZURE_BASE_URL`.
const ENV_OVERLAY: &[(ProviderKind, &str, OverlayField)] = &[
    (ProviderKind::Openai, "OPENAI_API_KEY", OverlayField::ApiKey),
    (ProviderKind::Openai, "OPENAI_BASE_URL", OverlayField::BaseUrl),
    (ProviderKind::Gemini, "GOOGLE_API_KEY", OverlayField::ApiKey),
    (ProviderKind::Gemini, "GOOGLE_BASE_URL", OverlayField::BaseUrl),
    (ProviderKind::Azure, "AZURE_API_KEY", OverlayField::ApiKey),
    (ProviderKind::Azure, "AZURE_BASE_URL", OverlayField::BaseUrl),
    (ProviderKind::Azure, "AZURE_ENDPOINT", OverlayField::BaseUrl),
    (ProviderKind::Grok, "XAI_API_KEY", OverlayField::ApiKey),
    (ProviderKind::Grok, "XAI_BASE_URL", OverlayField::BaseUrl),
    (ProviderKind::Bailian, "DASHSCOPE_API_KEY", OverlayField::ApiKey),
    (ProviderKind::Bailian, "QWEN3_CODER_API_KEY", OverlayField::ApiKey),
    (ProviderKind::Bailian, "DEEPSEEK_R1_API_KEY", OverlayField::ApiKey),
];

#[derive(Clone, Copy)]
enum OverlayField {
    ApiKey,
    BaseUrl,
}

/// Persistent configuration store.
///
/// Reads and writes `config.json` in the platform config directory and
/// overlays environment variables on every read.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    /// Create a store rooted at the platform config directory
    /// (`%APPDATA%\ultra-mcp-nodejs\` on Windows, `~/.config/ultra-mcp/`
    /// elsewhere).
    pub fn new() -> Result<Self> {
        let base = dirs::config_dir()
            .ok_or_else(|| Error::Config("could not determine config directory".to_string()))?;
        let dir = if cfg!(windows) {
            base.join("ultra-mcp-nodejs")
        } else {
            base.join("ultra-mcp")
        };
        Ok(Self::with_dir(dir))
    }

    /// Create a store rooted at an explicit directory (used by tests).
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            config_path: dir.into().join(CONFIG_FILENAME),
        }
    }

    /// Path of the backing config file.
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the config file, validate it, and overlay environment variables.
    pub fn get_config(&self) -> Result<Config> {
        let mut config = self.read_file()?;
        config.validate()?;
        apply_env_overlay(&mut config);
        Ok(config)
    }

    fn read_file(&self) -> Result<Config> {
        if !self.config_path.exists() {
            debug!(path = %self.config_path.display(), "No config file, starting from defaults");
            return Ok(Config::default());
        }

        let contents = std::fs::read_to_string(&self.config_path)?;
        serde_json::from_str(&contents)
            .map_err(|e| Error::Config(format!("invalid config file: {e}")))
    }

    fn write_file(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(config)?;
        std::fs::write(&self.config_path, contents)?;
        info!(path = %self.config_path.display(), "Wrote config file");
        Ok(())
    }

    /// Mutate the persisted config under `f`, validating before write.
    ///
    /// Mutations operate on the file contents only; the environment overlay
    /// is never written back.
    fn update(&self, f: impl FnOnce(&mut Config)) -> Result<()> {
        let mut config = self.read_file()?;
        f(&mut config);
        config.validate()?;
        self.write_file(&config)
    }

    pub fn set_api_key(&self, kind: ProviderKind, value: Option<String>) -> Result<()> {
        self.update(|c| c.set_api_key(kind, value))
    }

    pub fn set_base_url(&self, kind: ProviderKind, value: Option<String>) -> Result<()> {
        self.update(|c| c.set_base_url(kind, value))
    }

    pub fn set_azure_resource_name(&self, value: Option<String>) -> Result<()> {
        self.update(|c| c.set_azure_resource_name(value))
    }

    pub fn set_vector_config(&self, vector: Option<VectorConfig>) -> Result<()> {
        self.update(|c| c.set_vector_config(vector))
    }

    /// Remove the config file entirely.
    pub fn reset(&self) -> Result<()> {
        if self.config_path.exists() {
            std::fs::remove_file(&self.config_path)?;
            warn!(path = %self.config_path.display(), "Config file removed");
        }
        Ok(())
    }
}

fn apply_env_overlay(config: &mut Config) {
    for (kind, var, field) in ENV_OVERLAY {
        let Ok(value) = std::env::var(var) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }

        let settings = match kind {
            ProviderKind::Azure => {
                &mut config.azure.get_or_insert_with(Default::default).common
            }
            ProviderKind::Bailian => {
                &mut config.bailian.get_or_insert_with(Default::default).common
            }
            ProviderKind::Openai => config.openai.get_or_insert_with(Default::default),
            ProviderKind::Gemini => config.gemini.get_or_insert_with(Default::default),
            ProviderKind::Grok => config.grok.get_or_insert_with(Default::default),
            ProviderKind::OpenaiCompatible => {
                &mut config
                    .openai_compatible
                    .get_or_insert_with(Default::default)
                    .common
            }
        };

        match field {
            OverlayField::ApiKey => {
                if settings.api_key.is_none() {
                    settings.api_key = Some(value);
                }
            }
            OverlayField::BaseUrl => {
                if settings.base_url.is_none() {
                    settings.base_url = Some(value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn roundtrip_set_and_get() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::with_dir(dir.path());

        store
            .set_api_key(ProviderKind::Openai, Some("sk-test".to_string()))
            .unwrap();
        store
            .set_base_url(ProviderKind::Openai, Some("https://api.openai.com/v1".to_string()))
            .unwrap();

        let config = store.get_config().unwrap();
        let openai = config.openai.unwrap();
        assert_eq!(openai.api_key.as_deref(), Some("sk-test"));
        assert_eq!(openai.base_url.as_deref(), Some("https://api.openai.com/v1"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::with_dir(dir.path());
        let config = store.read_file().unwrap();
        assert!(config.openai.is_none());
    }

    #[test]
    fn invalid_url_rejected_on_write() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::with_dir(dir.path());
        let result = store.set_base_url(ProviderKind::Grok, Some("nope".to_string()));
        assert!(result.is_err());
        // Nothing was persisted
        assert!(!store.config_path().exists());
    }

    #[test]
    fn reset_removes_file() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::with_dir(dir.path());
        store
            .set_api_key(ProviderKind::Grok, Some("xai-1".to_string()))
            .unwrap();
        assert!(store.config_path().exists());
        store.reset().unwrap();
        assert!(!store.config_path().exists());
    }

    #[test]
    fn file_wins_over_environment() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::with_dir(dir.path());
        store
            .set_api_key(ProviderKind::Openai, Some("from-file".to_string()))
            .unwrap();

        // SAFETY: test-local env mutation; no other test reads this var with
        // a file-backed key present.
        std::env::set_var("OPENAI_API_KEY", "from-env");
        let config = store.get_config().unwrap();
        std::env::remove_var("OPENAI_API_KEY");

        assert_eq!(
            config.openai.unwrap().api_key.as_deref(),
            Some("from-file")
        );
    }
}
