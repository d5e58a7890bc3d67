//! Application configuration for Orbit TX.
//!
//! Loads from `config.toml` at the project root. Every section has defaults,
//! so the file only needs to name what differs.

use std::path::{Path, PathBuf};

use orbit_core::EngineConfig;
use rust_decimal::Decimal;
use serde::Deserialize;

/// Paper venue used by the demo binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    pub exchange: String,
    pub instrument: String,
    pub base: String,
    pub quote: String,
    /// Quote currency cash loaded on START
    pub cash: Decimal,
    /// First synthetic print
    pub start_price: Decimal,
    /// Price move per synthetic print
    pub step: Decimal,
    /// Number of synthetic prints before the feed closes
    pub ticks: usize,
    /// Pause between prints
    pub interval_ms: u64,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            exchange: "paper".into(),
            instrument: "BTC-USD".into(),
            base: "BTC".into(),
            quote: "USD".into(),
            cash: Decimal::from(100_000),
            start_price: Decimal::from(60_000),
            step: Decimal::from(25),
            ticks: 40,
            interval_ms: 50,
        }
    }
}

/// Buy-and-hold strategy parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuyAndHoldConfig {
    pub enabled: bool,
    /// Volume bought on the first print
    pub volume: Decimal,
}

impl Default for BuyAndHoldConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: Decimal::new(1, 1),
        }
    }
}

/// Event printer parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PrintConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StrategiesConfig {
    pub buy_and_hold: BuyAndHoldConfig,
    pub print: PrintConfig,
}

/// Top-level config file structure.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default tracing filter when RUST_LOG is unset
    pub log_level: String,
    /// Portfolio snapshot restored on start and stored on exit
    pub snapshot: Option<PathBuf>,
    pub engine: EngineConfig,
    pub paper: PaperConfig,
    pub strategies: StrategiesConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info,orbit_core=info,orbit_tx=debug".into(),
            snapshot: None,
            engine: EngineConfig::default(),
            paper: PaperConfig::default(),
            strategies: StrategiesConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load config from the given TOML file path.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from the default location (project root config.toml).
    pub fn load_default() -> Self {
        let candidates = [
            "config.toml",
            concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml"),
        ];

        for path in &candidates {
            match Self::load(Path::new(path)) {
                Ok(cfg) => {
                    tracing::info!("📋 Loaded config from {}", path);
                    return cfg;
                }
                Err(e) if Path::new(path).exists() => {
                    tracing::warn!("⚠️ Ignoring {}: {}", path, e);
                }
                Err(_) => {}
            }
        }

        tracing::warn!("⚠️ No config.toml found, using defaults");
        Self::default()
    }
}
