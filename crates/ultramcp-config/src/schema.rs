//! Typed configuration schema with serde defaults

use serde::{Deserialize, Serialize};
use std::fmt;
use ultramcp_core::types::{BailianKind, CompatKind, ProviderKind};
use ultramcp_core::{Error, Result};

/// Root configuration document stored as `config.json`.
///
/// Every section is optional in the file; missing sections deserialize to
/// their defaults so old config files keep loading as the schema grows.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai: Option<ProviderSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini: Option<ProviderSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure: Option<AzureSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grok: Option<ProviderSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bailian: Option<BailianSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_compatible: Option<CompatSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<VectorConfig>,
}

/// Credentials and defaults for one upstream.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct ProviderSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_model: Option<String>,
}

// API keys must never reach logs in cleartext.
impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("preferred_model", &self.preferred_model)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize, Default)]
pub struct AzureSettings {
    #[serde(flatten)]
    pub common: ProviderSettings,

    /// Azure resource name, used to derive the endpoint when no explicit
    /// base URL is configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
}

impl fmt::Debug for AzureSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureSettings")
            .field("common", &self.common)
            .field("resource_name", &self.resource_name)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BailianSettings {
    #[serde(flatten)]
    pub common: ProviderSettings,

    #[serde(default)]
    pub subtype: BailianKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CompatSettings {
    #[serde(flatten)]
    pub common: ProviderSettings,

    #[serde(default)]
    pub subtype: CompatKind,

    /// Models this endpoint exposes, as configured by the user
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,
}

/// Embedding/vector-index settings shared by the embedding subservice.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VectorConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderKind>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
}

impl Config {
    /// Settings view for a provider kind, if that section exists.
    pub fn provider_settings(&self, kind: ProviderKind) -> Option<&ProviderSettings> {
        match kind {
            ProviderKind::Openai => self.openai.as_ref(),
            ProviderKind::Gemini => self.gemini.as_ref(),
            ProviderKind::Azure => self.azure.as_ref().map(|a| &a.common),
            ProviderKind::Grok => self.grok.as_ref(),
            ProviderKind::Bailian => self.bailian.as_ref().map(|b| &b.common),
            ProviderKind::OpenaiCompatible => self.openai_compatible.as_ref().map(|c| &c.common),
        }
    }

    fn provider_settings_mut(&mut self, kind: ProviderKind) -> &mut ProviderSettings {
        match kind {
            ProviderKind::Openai => self.openai.get_or_insert_with(Default::default),
            ProviderKind::Gemini => self.gemini.get_or_insert_with(Default::default),
            ProviderKind::Azure => {
                &mut self.azure.get_or_insert_with(Default::default).common
            }
            ProviderKind::Grok => self.grok.get_or_insert_with(Default::default),
            ProviderKind::Bailian => {
                &mut self.bailian.get_or_insert_with(Default::default).common
            }
            ProviderKind::OpenaiCompatible => {
                &mut self
                    .openai_compatible
                    .get_or_insert_with(Default::default)
                    .common
            }
        }
    }

    /// Set or clear a provider's API key.
    pub fn set_api_key(&mut self, kind: ProviderKind, value: Option<String>) {
        self.provider_settings_mut(kind).api_key = value;
    }

    /// Set or clear a provider's base URL.
    pub fn set_base_url(&mut self, kind: ProviderKind, value: Option<String>) {
        self.provider_settings_mut(kind).base_url = value;
    }

    pub fn set_azure_resource_name(&mut self, value: Option<String>) {
        self.azure.get_or_insert_with(Default::default).resource_name = value;
    }

    pub fn set_vector_config(&mut self, vector: Option<VectorConfig>) {
        self.vector = vector;
    }

    /// Validate the loaded document.
    ///
    /// Any configured base URL must parse as an absolute http(s) URL.
    pub fn validate(&self) -> Result<()> {
        let urls = [
            self.openai.as_ref().and_then(|p| p.base_url.as_deref()),
            self.gemini.as_ref().and_then(|p| p.base_url.as_deref()),
            self.azure.as_ref().and_then(|p| p.common.base_url.as_deref()),
            self.grok.as_ref().and_then(|p| p.base_url.as_deref()),
            self.bailian
                .as_ref()
                .and_then(|p| p.common.base_url.as_deref()),
            self.openai_compatible
                .as_ref()
                .and_then(|p| p.common.base_url.as_deref()),
        ];

        for url in urls.into_iter().flatten() {
            let parsed = url::Url::parse(url)
                .map_err(|e| Error::ConfigValidation(format!("invalid URL '{url}': {e}")))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(Error::ConfigValidation(format!(
                    "invalid URL '{url}': expected http or https scheme"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_default() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert!(config.openai.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_invalid_url() {
        let config: Config = serde_json::from_str(
            r#"{"openai": {"base_url": "not a url"}}"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_http_scheme() {
        let config: Config =
            serde_json::from_str(r#"{"grok": {"base_url": "ftp://api.x.ai"}}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_redacts_api_key() {
        let settings = ProviderSettings {
            api_key: Some("sk-secret".to_string()),
            base_url: None,
            preferred_model: None,
        };
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn set_api_key_creates_section() {
        let mut config = Config::default();
        config.set_api_key(ProviderKind::Grok, Some("xai-123".to_string()));
        assert_eq!(
            config.grok.as_ref().unwrap().api_key.as_deref(),
            Some("xai-123")
        );
    }
}
