// ⚙️ Application configuration
//
// Layering: built-in defaults → optional JSON file → environment overrides.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_CONFIG: &str = "ETOUR_SMOS_CONFIG";
pub const ENV_DB: &str = "ETOUR_SMOS_DB";
pub const ENV_FAILURE_RATE: &str = "ETOUR_SMOS_FAILURE_RATE";
pub const ENV_LATENCY_MS: &str = "ETOUR_SMOS_LATENCY_MS";
pub const ENV_SEED: &str = "ETOUR_SMOS_SEED";

/// Upper bound for both monitoring thresholds (the sample school must fit them in one year)
pub const MAX_MONITORING_THRESHOLD: usize = 200;

// ============================================================================
// SECTIONS
// ============================================================================

/// Simulated server connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Probability in [0, 1] that any single call is interrupted
    pub failure_rate: f64,

    /// Artificial latency added to every call
    pub latency_ms: u64,

    /// Fixed RNG seed for reproducible interruptions
    pub seed: Option<u64>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            failure_rate: 0.1,
            latency_ms: 0,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtourConfig {
    pub max_banners_per_point: usize,
    pub max_image_bytes: u64,
    pub min_width: u32,
    pub min_height: u32,
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for EtourConfig {
    fn default() -> Self {
        EtourConfig {
            max_banners_per_point: 5,
            max_image_bytes: 5 * 1024 * 1024,
            min_width: 300,
            min_height: 150,
            max_width: 1920,
            max_height: 1080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmosConfig {
    pub school_year: String,
    pub absence_threshold: usize,
    pub note_threshold: usize,
}

impl Default for SmosConfig {
    fn default() -> Self {
        SmosConfig {
            school_year: "2023-2024".to_string(),
            absence_threshold: 5,
            note_threshold: 3,
        }
    }
}

// ============================================================================
// APP CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite audit database
    pub db_path: PathBuf,
    pub link: LinkConfig,
    pub etour: EtourConfig,
    pub smos: SmosConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            db_path: PathBuf::from("etour-smos.db"),
            link: LinkConfig::default(),
            etour: EtourConfig::default(),
            smos: SmosConfig::default(),
        }
    }
}

impl AppConfig {
    /// Configuration with failure injection turned off (tests, UI browsing)
    pub fn reliable() -> Self {
        let mut config = AppConfig::default();
        config.link.failure_rate = 0.0;
        config
    }

    /// Load from an explicit file, or `$ETOUR_SMOS_CONFIG`, then apply env overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var(ENV_CONFIG).ok().map(PathBuf::from);
        let path = path.map(Path::to_path_buf).or(from_env);

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => AppConfig::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Apply `ETOUR_SMOS_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup(ENV_DB) {
            self.db_path = PathBuf::from(db);
        }

        if let Some(rate) = lookup(ENV_FAILURE_RATE) {
            self.link.failure_rate = rate
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number, got '{}'", ENV_FAILURE_RATE, rate))?;
        }

        if let Some(latency) = lookup(ENV_LATENCY_MS) {
            self.link.latency_ms = latency
                .trim()
                .parse()
                .with_context(|| format!("{} must be an integer, got '{}'", ENV_LATENCY_MS, latency))?;
        }

        if let Some(seed) = lookup(ENV_SEED) {
            self.link.seed = Some(
                seed.trim()
                    .parse()
                    .with_context(|| format!("{} must be an integer, got '{}'", ENV_SEED, seed))?,
            );
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.link.failure_rate) {
            return Err(anyhow!(
                "link.failure_rate must be between 0 and 1, got {}",
                self.link.failure_rate
            ));
        }

        if self.etour.max_banners_per_point == 0 {
            return Err(anyhow!("etour.max_banners_per_point must be at least 1"));
        }

        if self.etour.min_width > self.etour.max_width
            || self.etour.min_height > self.etour.max_height
        {
            return Err(anyhow!("etour image minimum dimensions exceed the maximum"));
        }

        for (name, value) in [
            ("smos.absence_threshold", self.smos.absence_threshold),
            ("smos.note_threshold", self.smos.note_threshold),
        ] {
            if value > MAX_MONITORING_THRESHOLD {
                return Err(anyhow!(
                    "{} must be at most {}, got {}",
                    name,
                    MAX_MONITORING_THRESHOLD,
                    value
                ));
            }
        }

        crate::smos::AcademicYear::parse(&self.smos.school_year)
            .map_err(|e| anyhow!("smos.school_year: {}", e))?;

        Ok(())
    }
}
