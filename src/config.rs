use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILENAME: &str = "config.json";

/// Top-level configuration.
///
/// Loaded once at startup and passed by reference to everything that needs
/// it. Unlike most settings files, a missing config is fatal: without it the
/// sentinel tags and the cache location are unknown.
///
/// # Loading
///
/// ```rust,no_run
/// use postcode_locator::config::Config;
///
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
/// println!("cache: {}", config.cache.filename.display());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Log destination and level.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Where the location cache lives.
    pub cache: CacheConfig,
    /// Reverse geocoding client settings.
    pub geocoding: GeocodingConfig,
    /// Strings printed instead of a postal code.
    pub tags: SentinelTags,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Optional log file. Logs go to stderr when unset.
    #[serde(default)]
    pub filename: Option<PathBuf>,
    /// `DEBUG`, `INFO`, `WARNING`, `ERROR` or `CRITICAL` (Rust-style names work too).
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Location cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    pub filename: PathBuf,
}

/// Reverse geocoding configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeocodingConfig {
    /// Identity prefix; the attempt number is appended on every call.
    pub user_agent: String,
    /// Base URL of the Nominatim instance.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Decimal places kept when converting and caching coordinates.
    #[serde(default = "default_precision")]
    pub precision: u32,
    /// Attempts per coordinate before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff step; attempt `i` failing waits `i` steps.
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Output strings for files that did not resolve to a postal code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentinelTags {
    pub not_jpeg: String,
    pub no_geocode: String,
    pub file_not_found: String,
    pub internal_error: String,
}

/// Highest supported coordinate precision.
pub const MAX_PRECISION: u32 = 10;

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_endpoint() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_precision() -> u32 {
    4
}

fn default_max_attempts() -> u32 {
    20
}

fn default_backoff_unit_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filename: None,
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            cache: CacheConfig {
                filename: PathBuf::from("location_cache.json"),
            },
            geocoding: GeocodingConfig {
                user_agent: "postcode-locator".to_string(),
                endpoint: default_endpoint(),
                precision: default_precision(),
                max_attempts: default_max_attempts(),
                backoff_unit_ms: default_backoff_unit_ms(),
                timeout_secs: default_timeout_secs(),
            },
            tags: SentinelTags {
                not_jpeg: "not_jpeg".to_string(),
                no_geocode: "no_geocode".to_string(),
                file_not_found: "file_not_found".to_string(),
                internal_error: "internal_error".to_string(),
            },
        }
    }
}

impl Config {
    /// Resolve the config file path — `config.json` in the working directory.
    pub fn config_path() -> Result<PathBuf> {
        let cwd = std::env::current_dir().context("Failed to get working directory")?;
        Ok(cwd.join(CONFIG_FILENAME))
    }

    /// Load and validate config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = std::fs::read_to_string(&config_path).with_context(|| {
            format!("Failed to read config file {}", config_path.display())
        })?;
        let config: Config = serde_json::from_str(&contents).with_context(|| {
            format!("Failed to parse config file {}", config_path.display())
        })?;
        config
            .validate()
            .with_context(|| format!("Invalid config file {}", config_path.display()))?;

        log::debug!("Config loaded from {}", config_path.display());
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Check the values serde cannot.
    pub fn validate(&self) -> Result<()> {
        let tags = [
            ("not_jpeg", &self.tags.not_jpeg),
            ("no_geocode", &self.tags.no_geocode),
            ("file_not_found", &self.tags.file_not_found),
            ("internal_error", &self.tags.internal_error),
        ];
        for (name, value) in tags {
            if value.trim().is_empty() {
                anyhow::bail!("tags.{name} must not be empty");
            }
        }
        if self.geocoding.user_agent.trim().is_empty() {
            anyhow::bail!("geocoding.user_agent must not be empty");
        }
        if self.geocoding.precision > MAX_PRECISION {
            anyhow::bail!(
                "geocoding.precision must be at most {MAX_PRECISION}, got {}",
                self.geocoding.precision
            );
        }
        if self.geocoding.max_attempts == 0 {
            anyhow::bail!("geocoding.max_attempts must be at least 1");
        }
        if self.cache.filename.as_os_str().is_empty() {
            anyhow::bail!("cache.filename must not be empty");
        }
        Ok(())
    }

    /// Translate `logging.level` into a `log` filter.
    ///
    /// Accepts the Python-style names used by older config files alongside
    /// the Rust ones. Unknown values fall back to `Info`.
    pub fn log_level(&self) -> log::LevelFilter {
        match self.logging.level.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => log::LevelFilter::Debug,
            "TRACE" => log::LevelFilter::Trace,
            "INFO" => log::LevelFilter::Info,
            "WARNING" | "WARN" => log::LevelFilter::Warn,
            "ERROR" | "CRITICAL" => log::LevelFilter::Error,
            "OFF" | "NOTSET" => log::LevelFilter::Off,
            other => {
                log::warn!("Unknown log level \"{other}\", using INFO");
                log::LevelFilter::Info
            }
        }
    }
}
