use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Default interval between background reconciliation passes.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

const DEFAULT_DB_URL: &str = "sqlite:flashcards.sqlite3";

/// Connection settings for the remote flashcard API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: String,
}

impl RemoteConfig {
    /// Reads `FLASHCARDS_API_URL` and `FLASHCARDS_API_KEY`; `None` unless both are set.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let base_url = lookup("FLASHCARDS_API_URL").filter(|v| !v.trim().is_empty())?;
        let api_key = lookup("FLASHCARDS_API_KEY").filter(|v| !v.trim().is_empty())?;
        Some(Self {
            base_url: base_url.trim().trim_end_matches('/').to_owned(),
            api_key: api_key.trim().to_owned(),
        })
    }
}

/// Runtime configuration for [`crate::AppContext`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub db_url: String,
    pub remote: Option<RemoteConfig>,
    /// `None` disables background reconciliation.
    pub reconcile_interval: Option<Duration>,
}

impl AppConfig {
    /// Build configuration from `FLASHCARDS_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but unusable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// `FLASHCARDS_RECONCILE_SECS=0` disables background reconciliation.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but unusable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let db_url = match lookup("FLASHCARDS_DB_URL") {
            Some(raw) if raw.trim().is_empty() => return Err(ConfigError::EmptyDbUrl),
            Some(raw) => normalize_sqlite_url(&raw),
            None => normalize_sqlite_url(DEFAULT_DB_URL),
        };

        let reconcile_interval = match lookup("FLASHCARDS_RECONCILE_SECS") {
            None => Some(DEFAULT_RECONCILE_INTERVAL),
            Some(raw) => {
                let secs: u64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidReconcileInterval { raw: raw.clone() })?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
        };

        Ok(Self {
            db_url,
            remote: RemoteConfig::from_lookup(&lookup),
            reconcile_interval,
        })
    }
}

/// Turns a bare path or `sqlite:` URL into an absolute `sqlite://` URL that
/// creates the database file on first use.
fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" || trimmed.starts_with("sqlite://") {
        return trimmed.to_owned();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}?mode=rwc", absolute.display())
}
