//! Portfolio snapshot codec
//!
//! `{ "__portfolio__": true, "positions": [ {exchange, currency, balance, reserved}, ... ] }`
//! Decimals are written as strings so a load/store round-trip is exact.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::types::Balance;

#[derive(Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "__portfolio__", default)]
    tag: bool,
    #[serde(default)]
    positions: Vec<Balance>,
}

/// Cash balances persisted between runs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortfolioSnapshot {
    pub positions: Vec<Balance>,
}

impl PortfolioSnapshot {
    pub fn new(positions: Vec<Balance>) -> Self {
        Self { positions }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(json)?;
        if !envelope.tag {
            return Err(Error::Snapshot("missing \"__portfolio__\" tag".into()));
        }
        Ok(Self {
            positions: envelope.positions,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        let envelope = Envelope {
            tag: true,
            positions: self.positions.clone(),
        };
        Ok(serde_json::to_string_pretty(&envelope)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let snapshot = Self::from_json(&content)?;
        info!("📋 Loaded portfolio snapshot from {} ({} balances)", path.display(), snapshot.positions.len());
        Ok(snapshot)
    }

    pub fn store(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        info!("Stored portfolio snapshot to {}", path.display());
        Ok(())
    }
}
