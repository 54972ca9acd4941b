//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// HTTP listen port.
    pub port: u16,
    /// Path to the job database file.
    pub db_path: PathBuf,
    /// Directory for transient uploaded documents.
    pub upload_dir: PathBuf,
    /// Accepted file extension (without the dot, compared case-insensitively).
    pub allowed_extension: String,
    /// Maximum accepted request body size for uploads.
    pub max_upload_bytes: usize,
    /// How long the worker waits on an empty queue before re-checking the stop flag.
    pub poll_interval: Duration,
    /// Bounded wait for the worker to finish its current item on shutdown.
    pub shutdown_grace: Duration,
    /// Terminal jobs older than this are pruned. `None` keeps records forever.
    pub retention: Option<Duration>,
    /// Directory service settings.
    pub directory: DirectoryConfig,
    /// Optional directory for daily-rolling log files.
    pub log_dir: Option<PathBuf>,
}

/// Settings for the GitHub directory client.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// API base URL, without trailing slash.
    pub base_url: String,
    /// Bearer token. Absent means unauthenticated (rate limited) requests.
    pub token: Option<SecretString>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Upper bound on followed pages per lookup.
    pub max_pages: u32,
    /// Page size requested from the API.
    pub per_page: u32,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.github.com".to_string(),
            token: None,
            timeout: Duration::from_secs(10),
            max_pages: 10,
            per_page: 100,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            db_path: PathBuf::from("./data/jobs.db"),
            upload_dir: PathBuf::from("./uploads"),
            allowed_extension: "pdf".to_string(),
            max_upload_bytes: 20 * 1024 * 1024,
            poll_interval: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(30),
            retention: None,
            directory: DirectoryConfig::default(),
            log_dir: None,
        }
    }
}

impl ServiceConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup (used by `from_env` and tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = parse_or(&get, "ORGSCAN_PORT", defaults.port)?;
        let db_path = get("ORGSCAN_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);
        let upload_dir = get("ORGSCAN_UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.upload_dir);
        let allowed_extension = get("ORGSCAN_ALLOWED_EXTENSION")
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .unwrap_or(defaults.allowed_extension);
        let max_upload_bytes =
            parse_or(&get, "ORGSCAN_MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?;
        let poll_interval = Duration::from_millis(parse_or(
            &get,
            "ORGSCAN_POLL_INTERVAL_MS",
            defaults.poll_interval.as_millis() as u64,
        )?);
        let shutdown_grace = Duration::from_secs(parse_or(
            &get,
            "ORGSCAN_SHUTDOWN_GRACE_SECS",
            defaults.shutdown_grace.as_secs(),
        )?);

        let retention = match get("ORGSCAN_RETENTION_DAYS") {
            Some(raw) => {
                let days: u64 = parse_value("ORGSCAN_RETENTION_DAYS", &raw)?;
                (days > 0).then(|| Duration::from_secs(days * 24 * 60 * 60))
            }
            None => None,
        };

        let directory = DirectoryConfig {
            base_url: get("GITHUB_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.directory.base_url),
            token: get("GITHUB_TOKEN").map(SecretString::from),
            timeout: Duration::from_secs(parse_or(
                &get,
                "GITHUB_TIMEOUT_SECS",
                defaults.directory.timeout.as_secs(),
            )?),
            max_pages: parse_or(&get, "GITHUB_MAX_PAGES", defaults.directory.max_pages)?,
            per_page: defaults.directory.per_page,
        };

        if poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "ORGSCAN_POLL_INTERVAL_MS".into(),
                message: "must be greater than zero".into(),
            });
        }
        if directory.max_pages == 0 {
            return Err(ConfigError::InvalidValue {
                key: "GITHUB_MAX_PAGES".into(),
                message: "must be greater than zero".into(),
            });
        }

        Ok(Self {
            port,
            db_path,
            upload_dir,
            allowed_extension,
            max_upload_bytes,
            poll_interval,
            shutdown_grace,
            retention,
            directory,
            log_dir: get("ORGSCAN_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{raw:?}: {e}"),
    })
}
