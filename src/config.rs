//! TOML configuration parsing.
//!
//! Everything lives in one file (see `config/copydesk.example.toml`):
//! `[store]` names the remote repository, `[client]` tunes the store
//! client's resilience behavior, `[site]` describes the content layout of
//! the site being edited. The API token is read from the `GITHUB_TOKEN`
//! environment variable, never from the file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub client: ClientConfig,
    pub site: SiteConfig,
}

/// Remote repository hosting the site content.
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// `owner/repo` slug.
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl StoreConfig {
    /// Bearer credential, if one is configured in the environment.
    pub fn token(&self) -> Option<String> {
        std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty())
    }
}

fn default_branch() -> String {
    "main".to_string()
}
fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

/// Resilience tuning for the store client.
#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    /// Retries after the first attempt; a request is tried `max_retries + 1` times.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Minimum spacing between state-changing requests.
    #[serde(default = "default_mutative_throttle_ms")]
    pub mutative_throttle_ms: u64,
    /// Version-token refresh attempts on write conflict, separate from the
    /// backoff budget.
    #[serde(default = "default_conflict_retries")]
    pub conflict_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            mutative_throttle_ms: default_mutative_throttle_ms(),
            conflict_retries: default_conflict_retries(),
        }
    }
}

fn default_max_retries() -> u32 {
    5
}
fn default_initial_backoff_ms() -> u64 {
    1000
}
fn default_max_backoff_ms() -> u64 {
    32_000
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_mutative_throttle_ms() -> u64 {
    1000
}
fn default_conflict_retries() -> u32 {
    3
}

/// Content layout of the site inside the store.
#[derive(Debug, Deserialize, Clone)]
pub struct SiteConfig {
    #[serde(default = "default_locales")]
    pub locales: Vec<String>,
    #[serde(default = "default_locale")]
    pub default_locale: String,
    /// Directory of per-page content files named `{slug}.{locale}.html`.
    #[serde(default = "default_pages_root")]
    pub pages_root: String,
    /// Per-locale paths of the home page, addressed by the `index` pseudo-slug.
    #[serde(default = "default_home")]
    pub home: HashMap<String, String>,
    /// File names under `pages_root` considered editable pages.
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default = "default_slides_dir")]
    pub slides_dir: String,
    #[serde(default = "default_slides_manifest")]
    pub slides_manifest: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_locales() -> Vec<String> {
    vec!["en".to_string(), "sv".to_string()]
}
fn default_locale() -> String {
    "en".to_string()
}
fn default_pages_root() -> String {
    "src/content/pages".to_string()
}
fn default_home() -> HashMap<String, String> {
    HashMap::from([
        ("en".to_string(), "src/site/index.html".to_string()),
        ("sv".to_string(), "src/site/sv/index.html".to_string()),
    ])
}
fn default_include_globs() -> Vec<String> {
    vec!["*.html".to_string()]
}
fn default_slides_dir() -> String {
    "src/site/images/slide".to_string()
}
fn default_slides_manifest() -> String {
    "src/site/images/slide/slides.json".to_string()
}
fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.store.repo.split('/').filter(|s| !s.is_empty()).count() != 2 {
        anyhow::bail!(
            "store.repo must be an 'owner/repo' slug, got '{}'",
            config.store.repo
        );
    }

    if config.store.branch.is_empty() {
        anyhow::bail!("store.branch must not be empty");
    }

    if config.client.max_backoff_ms < config.client.initial_backoff_ms {
        anyhow::bail!("client.max_backoff_ms must be >= client.initial_backoff_ms");
    }

    if config.client.request_timeout_secs == 0 {
        anyhow::bail!("client.request_timeout_secs must be > 0");
    }

    if config.site.locales.is_empty() {
        anyhow::bail!("site.locales must not be empty");
    }

    if !config.site.locales.contains(&config.site.default_locale) {
        anyhow::bail!(
            "site.default_locale '{}' is not in site.locales",
            config.site.default_locale
        );
    }

    if config.site.max_upload_bytes == 0 {
        anyhow::bail!("site.max_upload_bytes must be > 0");
    }

    Ok(config)
}
