//! Configuration loading.
//!
//! Configuration lives in YAML files inside a config directory, resolved as:
//! 1. `--config-dir <path>` (CLI flag)
//! 2. `./config`
//!
//! Files:
//! - `generation_policy.yaml`: retry policy and batch settings per post kind
//! - `secrets.yaml`: API keys and the public base URL of redirect pages
//!
//! The Google API key falls back to the `GOOGLE_API_KEY` environment variable.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::providers::RetryPolicy;
use crate::{HermodError, Result};

/// Policy file name inside the config directory.
pub const GENERATION_POLICY_FILE: &str = "generation_policy.yaml";

/// Secrets file name inside the config directory.
pub const SECRETS_FILE: &str = "secrets.yaml";

/// Environment variable consulted when the secrets file has no Google key.
pub const GOOGLE_API_KEY_ENV: &str = "GOOGLE_API_KEY";

/// Template written by [`Secrets::write_template`].
const SECRETS_TEMPLATE: &str = r#"google_api_key: "YOUR_GOOGLE_API_KEY"
rakuten_application_id: "YOUR_RAKUTEN_APP_ID"
rakuten_affiliate_id: "YOUR_RAKUTEN_AFFILIATE_ID"
base_url: "https://example.github.io/shortener"
"#;

/// Generation policy, one section per post kind.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationPolicy {
    pub normal_post_generation: NormalPostPolicy,
    pub affiliate_post_generation: AffiliatePostPolicy,
}

/// Settings for theme-driven posts.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NormalPostPolicy {
    #[serde(flatten)]
    pub retry: RetryPolicy,
    /// Extra passes over failed results after the first run (default: 3).
    #[serde(default = "default_retry_passes")]
    pub retry_passes: u32,
    /// Posts generated per prompt (default: 1).
    #[serde(default = "default_posts_per_theme")]
    pub posts_per_theme: u32,
    /// Concurrent generation calls (default: 5).
    #[serde(default = "default_workers")]
    pub workers: usize,
}

/// Settings for product posts.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AffiliatePostPolicy {
    #[serde(flatten)]
    pub retry: RetryPolicy,
    /// Extra passes over failed results after the first run (default: 3).
    #[serde(default = "default_retry_passes")]
    pub retry_passes: u32,
    /// Product names are cut to this many characters in prompts (default: 80).
    #[serde(default = "default_max_product_name_length")]
    pub max_product_name_length: usize,
    /// Concurrent generation calls (default: 5).
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_retry_passes() -> u32 {
    3
}

fn default_posts_per_theme() -> u32 {
    1
}

fn default_max_product_name_length() -> usize {
    80
}

fn default_workers() -> usize {
    5
}

impl GenerationPolicy {
    /// Load `generation_policy.yaml` from a config directory.
    pub fn load(config_dir: &Path) -> Result<Self> {
        let policy: Self = load_yaml(&config_dir.join(GENERATION_POLICY_FILE))?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<()> {
        self.normal_post_generation.retry.validate()?;
        self.affiliate_post_generation.retry.validate()?;
        if self.normal_post_generation.workers == 0 || self.affiliate_post_generation.workers == 0 {
            return Err(HermodError::Configuration(
                "workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// API keys and publishing settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Secrets {
    #[serde(default)]
    pub google_api_key: Option<String>,
    #[serde(default)]
    pub rakuten_application_id: Option<String>,
    #[serde(default)]
    pub rakuten_affiliate_id: Option<String>,
    /// Public URL prefix of the redirect pages.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Secrets {
    /// Load `secrets.yaml` from a config directory.
    ///
    /// Returns empty secrets if the file does not exist (the API key may
    /// come from the environment).
    pub fn load(config_dir: &Path) -> Result<Self> {
        let path = config_dir.join(SECRETS_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        load_yaml(&path)
    }

    /// Google API key, falling back to `GOOGLE_API_KEY`.
    pub fn google_api_key(&self) -> Option<String> {
        self.google_api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var(GOOGLE_API_KEY_ENV).ok())
    }

    /// Write a template secrets file. Refuses to overwrite an existing one.
    pub fn write_template(config_dir: &Path) -> Result<PathBuf> {
        let path = config_dir.join(SECRETS_FILE);
        if path.exists() {
            return Err(HermodError::Configuration(format!(
                "{} already exists, not overwriting",
                path.display()
            )));
        }
        fs::create_dir_all(config_dir)?;
        fs::write(&path, SECRETS_TEMPLATE)?;
        Ok(path)
    }
}

/// Resolve the config directory.
pub fn resolve_config_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        if dir.is_dir() {
            return Ok(dir.to_path_buf());
        }
        return Err(HermodError::Configuration(format!(
            "Config directory not found: {dir:?}"
        )));
    }

    let local = PathBuf::from("config");
    if local.is_dir() {
        return Ok(local);
    }

    Err(HermodError::Configuration(
        "No config directory found. Create ./config or pass --config-dir".to_string(),
    ))
}

fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| {
        HermodError::Configuration(format!("Failed to read config file {path:?}: {e}"))
    })?;
    serde_yaml::from_str(&content).map_err(|e| {
        HermodError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
    })
}
