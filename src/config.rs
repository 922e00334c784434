//! Application configuration: TOML file loading, CLI overrides, and defaults.
//!
//! Resolution order (first found wins, values merge/override):
//! 1. CLI flags (`--threshold`, `--sort`, `--full`, etc.)
//! 2. Explicit `--config` file
//! 3. `$RBROWSER_CONFIG` environment variable (path to config file)
//! 4. Project-local `.rbrowser.toml` in the current working directory
//! 5. Global `~/.config/rbrowser/config.toml`
//! 6. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::model::DEFAULT_THRESHOLD;
use crate::protocol::SortOrder;

// ── Section configs ──────────────────────────────────────────────────────────

/// General application settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory to browse (overridden by CLI positional arg).
    pub default_path: Option<String>,
    /// List dot-files.
    pub show_hidden: Option<bool>,
    /// Enable mouse support.
    pub mouse: Option<bool>,
}

/// Tree model settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BrowserConfig {
    /// Prefetch margin and default request size.
    pub threshold: Option<usize>,
    /// "", "direct" or "reverse".
    pub sort_order: Option<String>,
    /// Load the whole hierarchy up front instead of paging.
    pub full_model: Option<bool>,
    /// Depth read in full-model mode.
    pub full_depth: Option<usize>,
    /// Give up on a reply after this many milliseconds. Unset waits forever.
    pub request_timeout_ms: Option<u64>,
}

/// Directory source settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SourceConfig {
    /// Artificial delay before each reply.
    pub latency_ms: Option<u64>,
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LogConfig {
    /// Filter string, `RUST_LOG` syntax.
    pub level: Option<String>,
    /// Log file path.
    pub file: Option<String>,
}

// ── Top-level config ─────────────────────────────────────────────────────────

/// Top-level application configuration.
///
/// All fields are optional so that partial configs from different sources
/// can be merged together (CLI overrides file, file overrides defaults).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub browser: BrowserConfig,
    pub source: SourceConfig,
    pub log: LogConfig,
}

// ── Default constants ────────────────────────────────────────────────────────

/// Default depth read in full-model mode.
pub const DEFAULT_FULL_DEPTH: usize = 3;
/// Default log filter.
pub const DEFAULT_LOG_LEVEL: &str = "warn";

// ── Config file locator ──────────────────────────────────────────────────────

/// Return the list of candidate config file paths in priority order.
///
/// Does NOT include the CLI `--config` path, which is handled separately.
fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(env_path) = std::env::var("RBROWSER_CONFIG") {
        paths.push(PathBuf::from(env_path));
    }

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".rbrowser.toml"));
    }

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("rbrowser").join("config.toml"));
    }

    paths
}

/// Try to read and parse a TOML config file. Returns `None` if the file
/// doesn't exist or can't be parsed (with a warning printed to stderr).
///
/// Runs before the logger is up, hence stderr.
fn load_file(path: &Path) -> Option<AppConfig> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str::<AppConfig>(&content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            eprintln!(
                "Warning: failed to parse config file {}: {}",
                path.display(),
                e
            );
            None
        }
    }
}

// ── Merge logic ──────────────────────────────────────────────────────────────

impl AppConfig {
    /// Merge `other` on top of `self`; `other`'s `Some` values win.
    pub fn merge(self, other: &AppConfig) -> AppConfig {
        AppConfig {
            general: GeneralConfig {
                default_path: other
                    .general
                    .default_path
                    .clone()
                    .or(self.general.default_path),
                show_hidden: other.general.show_hidden.or(self.general.show_hidden),
                mouse: other.general.mouse.or(self.general.mouse),
            },
            browser: BrowserConfig {
                threshold: other.browser.threshold.or(self.browser.threshold),
                sort_order: other
                    .browser
                    .sort_order
                    .clone()
                    .or(self.browser.sort_order),
                full_model: other.browser.full_model.or(self.browser.full_model),
                full_depth: other.browser.full_depth.or(self.browser.full_depth),
                request_timeout_ms: other
                    .browser
                    .request_timeout_ms
                    .or(self.browser.request_timeout_ms),
            },
            source: SourceConfig {
                latency_ms: other.source.latency_ms.or(self.source.latency_ms),
            },
            log: LogConfig {
                level: other.log.level.clone().or(self.log.level),
                file: other.log.file.clone().or(self.log.file),
            },
        }
    }

    /// Load the final merged configuration.
    ///
    /// `cli_config_path` is an explicit config file path from `--config`.
    /// `cli_overrides` are partial overrides derived from CLI flags.
    pub fn load(cli_config_path: Option<&Path>, cli_overrides: Option<&AppConfig>) -> AppConfig {
        let mut config = AppConfig::default();

        // Lowest priority first so higher ones overwrite.
        for path in candidate_paths().iter().rev() {
            if let Some(file_cfg) = load_file(path) {
                config = config.merge(&file_cfg);
            }
        }

        if let Some(cli_path) = cli_config_path {
            if let Some(file_cfg) = load_file(cli_path) {
                config = config.merge(&file_cfg);
            }
        }

        if let Some(overrides) = cli_overrides {
            config = config.merge(overrides);
        }

        config
    }

    // ── Convenience getters with built-in defaults ──────────────────────────

    pub fn show_hidden(&self) -> bool {
        self.general.show_hidden.unwrap_or(false)
    }

    pub fn mouse_enabled(&self) -> bool {
        self.general.mouse.unwrap_or(true)
    }

    /// Prefetch margin; zero is treated as unset.
    pub fn threshold(&self) -> usize {
        self.browser
            .threshold
            .filter(|t| *t > 0)
            .unwrap_or(DEFAULT_THRESHOLD)
    }

    /// Raw sort order string, validated by the model.
    pub fn sort_order(&self) -> &str {
        self.browser.sort_order.as_deref().unwrap_or("")
    }

    /// Parsed sort order, falling back to the default for unknown values.
    pub fn parsed_sort_order(&self) -> SortOrder {
        SortOrder::parse(self.sort_order()).unwrap_or_default()
    }

    pub fn full_model(&self) -> bool {
        self.browser.full_model.unwrap_or(false)
    }

    pub fn full_depth(&self) -> usize {
        self.browser.full_depth.unwrap_or(DEFAULT_FULL_DEPTH)
    }

    /// `None` means pending requests never expire.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.browser.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.source.latency_ms.unwrap_or(0))
    }

    pub fn log_level(&self) -> &str {
        self.log.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    /// Log file; defaults to `<data dir>/rbrowser/rbrowser.log`.
    pub fn log_file(&self) -> Option<PathBuf> {
        match &self.log.file {
            Some(file) => Some(PathBuf::from(file)),
            None => dirs::data_local_dir().map(|d| d.join("rbrowser").join("rbrowser.log")),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
