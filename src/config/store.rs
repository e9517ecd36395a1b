use arc_swap::ArcSwap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use super::AppConfig;
use crate::error::{AppError, Result};

/// Configuration store backed by an optional JSON file
///
/// Uses `ArcSwap` for lock-free reads.
#[derive(Clone, Debug)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    cache: Arc<ArcSwap<AppConfig>>,
}

impl ConfigStore {
    /// Store holding the built-in defaults
    pub fn with_defaults() -> Self {
        Self {
            path: None,
            cache: Arc::new(ArcSwap::from_pointee(AppConfig::default())),
        }
    }

    /// Load `path`; missing keys fall back to defaults
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: AppConfig = serde_json::from_str(&raw)
            .map_err(|e| AppError::Config(format!("invalid {}: {}", path.display(), e)))?;
        validate(&config)?;
        info!("Loaded configuration from {}", path.display());

        Ok(Self {
            path: Some(path.to_path_buf()),
            cache: Arc::new(ArcSwap::from_pointee(config)),
        })
    }

    /// File the configuration came from, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Get current configuration (lock-free)
    pub fn get(&self) -> Arc<AppConfig> {
        self.cache.load_full()
    }

    /// Replace the configuration after validating it
    pub fn set(&self, config: AppConfig) -> Result<()> {
        validate(&config)?;
        self.cache.store(Arc::new(config));
        Ok(())
    }

    /// Update configuration with a closure
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = (*self.get()).clone();
        f(&mut config);
        self.set(config)
    }
}

fn validate(config: &AppConfig) -> Result<()> {
    let check = |ok: bool, msg: &str| {
        if ok {
            Ok(())
        } else {
            Err(AppError::Config(msg.to_string()))
        }
    };
    check(
        (1..=120).contains(&config.stream.fps),
        "stream.fps must be between 1 and 120",
    )?;
    check(
        (1..=100).contains(&config.stream.jpeg_quality),
        "stream.jpeg_quality must be between 1 and 100",
    )?;
    check(
        config.stream.placeholder_width > 0 && config.stream.placeholder_height > 0,
        "stream placeholder size must be non-zero",
    )?;
    check(
        config.source.backoff_base_ms > 0
            && config.source.backoff_base_ms <= config.source.backoff_max_ms,
        "source.backoff_base_ms must be non-zero and not above source.backoff_max_ms",
    )?;
    check(
        config.source.width > 0 && config.source.height > 0,
        "source resolution must be non-zero",
    )?;
    check(!config.plugins.dir.is_empty(), "plugins.dir must not be empty")?;
    Ok(())
}
