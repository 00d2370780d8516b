use crate::cost::{AggregatorConfig, ClassPrices, ModelPrice, PricingTable, DEFAULT_CHUNK_SIZE};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

const DEFAULT_DAILY_BUDGET: f64 = 3.0;
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_MAX_CONCURRENT: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub sessions_dir: PathBuf,
    pub daily_budget: f64,
    pub chunk_size: usize,
    pub server: ServerSettings,
    pub sessions: SessionSettings,
    pub pricing: PricingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sessions_dir: Self::default_sessions_dir(),
            daily_budget: DEFAULT_DAILY_BUDGET,
            chunk_size: DEFAULT_CHUNK_SIZE,
            server: ServerSettings::default(),
            sessions: SessionSettings::default(),
            pricing: PricingSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub max_concurrent: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingSettings {
    pub models: HashMap<String, ModelPrice>,
    pub classes: ClassPrices,
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("usage-dash").join("config.toml"))
    }

    pub fn default_sessions_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_default()
            .join(".openclaw")
            .join("agents")
            .join("main")
            .join("sessions")
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path().context("Could not determine config directory")?;

        if !path.exists() {
            tracing::info!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::info!(?path, "Loaded config");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.daily_budget.is_finite() || self.daily_budget < 0.0 {
            anyhow::bail!("daily_budget must be a non-negative number, got {}", self.daily_budget);
        }
        if self.chunk_size == 0 {
            anyhow::bail!("chunk_size must be greater than 0");
        }
        if self.sessions.max_concurrent == 0 {
            anyhow::bail!("sessions.max_concurrent must be greater than 0");
        }

        let invalid = self.pricing_table().invalid_entries();
        if !invalid.is_empty() {
            anyhow::bail!(
                "pricing entries must be non-negative numbers: {}",
                invalid.join(", ")
            );
        }
        Ok(())
    }

    pub fn pricing_table(&self) -> PricingTable {
        PricingTable::with_overrides(&self.pricing.models, &self.pricing.classes)
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            sessions_dir: self.sessions_dir.clone(),
            chunk_size: self.chunk_size,
            pricing: self.pricing_table(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert!((settings.daily_budget - 3.0).abs() < f64::EPSILON);
        assert_eq!(settings.chunk_size, 64 * 1024);
        assert_eq!(settings.server.port, 3001);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.sessions.max_concurrent, 4);
        assert!(settings.sessions_dir.ends_with(".openclaw/agents/main/sessions"));
        assert!(settings.pricing.models.is_empty());
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::default();
        assert!(settings.validate().is_ok());

        settings.daily_budget = -1.0;
        assert!(settings.validate().is_err());

        settings.daily_budget = 0.0;
        assert!(settings.validate().is_ok());

        settings.chunk_size = 0;
        assert!(settings.validate().is_err());
        settings.chunk_size = 16;

        settings.sessions.max_concurrent = 0;
        assert!(settings.validate().is_err());
        settings.sessions.max_concurrent = 2;

        settings
            .pricing
            .models
            .insert("bad-model".to_string(), ModelPrice::new(-0.5, 1.0));
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("bad-model"));
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            sessions_dir = "/var/log/agent/sessions"
            daily_budget = 10.5
            chunk_size = 4096

            [server]
            port = 8080

            [sessions]
            max_concurrent = 8

            [pricing.models."claude-3-5-haiku"]
            input_price_per_million = 0.8
            output_price_per_million = 4.0

            [pricing.classes.opus]
            input_price_per_million = 5.0
            output_price_per_million = 25.0
        "#;

        let settings: Settings = toml::from_str(toml).unwrap();
        assert_eq!(settings.sessions_dir, PathBuf::from("/var/log/agent/sessions"));
        assert!((settings.daily_budget - 10.5).abs() < f64::EPSILON);
        assert_eq!(settings.chunk_size, 4096);
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.sessions.max_concurrent, 8);

        let pricing = settings.pricing_table();
        assert_eq!(pricing.price_for("claude-3-5-haiku"), ModelPrice::new(0.8, 4.0));
        assert_eq!(pricing.price_for("claude-opus-4"), ModelPrice::new(5.0, 25.0));
        assert_eq!(pricing.price_for("claude-3-opus"), ModelPrice::new(15.0, 75.0));

        let config = settings.aggregator_config();
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.sessions_dir, settings.sessions_dir);
    }
}
