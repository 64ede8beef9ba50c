//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core services.
//! Nothing in the core reads environment variables while handling a request; binaries call
//! [`CoreConfig::from_env`] (or build a [`CoreConfig`] directly) before constructing services.

use crate::constants::{
    DEFAULT_DATA_DIR, DEFAULT_LOCK_TIMEOUT_MS, DEFAULT_PAGE_SIZE, DEFAULT_REPOSITORY_TIMEOUT_MS,
};
use crate::{RegulationError, RegulationResult};
use chrono::{FixedOffset, Offset, Utc};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const ENV_REPOSITORY: &str = "REGULACAO_REPOSITORY";
pub const ENV_DATA_DIR: &str = "REGULACAO_DATA_DIR";
pub const ENV_REPOSITORY_TIMEOUT_MS: &str = "REGULACAO_REPOSITORY_TIMEOUT_MS";
pub const ENV_LOCK_TIMEOUT_MS: &str = "REGULACAO_LOCK_TIMEOUT_MS";
pub const ENV_DATE_OFFSET_MINUTES: &str = "REGULACAO_DATE_OFFSET_MINUTES";

/// Which [`Repository`](crate::repositories::Repository) implementation to build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RepositoryBackend {
    #[default]
    Memory,
    File,
}

impl FromStr for RepositoryBackend {
    type Err = RegulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "file" | "fs" => Ok(Self::File),
            other => Err(RegulationError::InvalidInput(format!(
                "unknown repository backend '{other}' (expected 'memory' or 'file')"
            ))),
        }
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    backend: RepositoryBackend,
    data_dir: PathBuf,
    repository_timeout: Duration,
    lock_timeout: Duration,
    default_page_size: usize,
    date_offset: FixedOffset,
}

impl CoreConfig {
    pub fn new(
        backend: RepositoryBackend,
        data_dir: PathBuf,
        repository_timeout: Duration,
        lock_timeout: Duration,
        default_page_size: usize,
    ) -> RegulationResult<Self> {
        if repository_timeout.is_zero() || lock_timeout.is_zero() {
            return Err(RegulationError::InvalidInput(
                "timeouts must be greater than zero".into(),
            ));
        }
        if default_page_size == 0 {
            return Err(RegulationError::InvalidInput(
                "default page size must be greater than zero".into(),
            ));
        }
        if backend == RepositoryBackend::File && data_dir.as_os_str().is_empty() {
            return Err(RegulationError::InvalidInput(
                "file repository requires a data directory".into(),
            ));
        }

        Ok(Self {
            backend,
            data_dir,
            repository_timeout,
            lock_timeout,
            default_page_size,
            date_offset: Utc.fix(),
        })
    }

    /// Offset whose calendar days the `dateFrom`/`dateTo` filters use. UTC unless set.
    pub fn with_date_offset(mut self, offset: FixedOffset) -> Self {
        self.date_offset = offset;
        self
    }

    /// In-memory storage with default timeouts.
    pub fn in_memory() -> Self {
        Self {
            backend: RepositoryBackend::Memory,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            repository_timeout: Duration::from_millis(DEFAULT_REPOSITORY_TIMEOUT_MS),
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
            default_page_size: DEFAULT_PAGE_SIZE,
            date_offset: Utc.fix(),
        }
    }

    /// Reads the `REGULACAO_*` variables. Call once, at startup.
    pub fn from_env() -> RegulationResult<Self> {
        let var = |name: &str| std::env::var(name).ok();
        let date_offset = offset_from_env_value(var(ENV_DATE_OFFSET_MINUTES))?;
        Self::new(
            backend_from_env_value(var(ENV_REPOSITORY))?,
            data_dir_from_env_value(var(ENV_DATA_DIR)),
            millis_from_env_value(
                ENV_REPOSITORY_TIMEOUT_MS,
                var(ENV_REPOSITORY_TIMEOUT_MS),
                DEFAULT_REPOSITORY_TIMEOUT_MS,
            )?,
            millis_from_env_value(
                ENV_LOCK_TIMEOUT_MS,
                var(ENV_LOCK_TIMEOUT_MS),
                DEFAULT_LOCK_TIMEOUT_MS,
            )?,
            DEFAULT_PAGE_SIZE,
        )
        .map(|cfg| cfg.with_date_offset(date_offset))
    }

    pub fn backend(&self) -> RepositoryBackend {
        self.backend
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn repository_timeout(&self) -> Duration {
        self.repository_timeout
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    pub fn default_page_size(&self) -> usize {
        self.default_page_size
    }

    pub fn date_offset(&self) -> FixedOffset {
        self.date_offset
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse the repository backend; absent or blank means in-memory.
pub fn backend_from_env_value(value: Option<String>) -> RegulationResult<RepositoryBackend> {
    non_blank(value)
        .map(|v| v.parse::<RepositoryBackend>())
        .transpose()
        .map(Option::unwrap_or_default)
}

pub fn data_dir_from_env_value(value: Option<String>) -> PathBuf {
    non_blank(value)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

/// Parse a millisecond duration, falling back to `default_ms` when absent or blank.
pub fn millis_from_env_value(
    name: &str,
    value: Option<String>,
    default_ms: u64,
) -> RegulationResult<Duration> {
    let ms = match non_blank(value) {
        None => default_ms,
        Some(v) => v.parse::<u64>().map_err(|_| {
            RegulationError::InvalidInput(format!("{name} must be a whole number of milliseconds"))
        })?,
    };
    Ok(Duration::from_millis(ms))
}

/// Parse an offset from UTC in minutes (`-180` for Brasília); absent or blank means UTC.
pub fn offset_from_env_value(value: Option<String>) -> RegulationResult<FixedOffset> {
    let Some(v) = non_blank(value) else {
        return Ok(Utc.fix());
    };
    let invalid = || {
        RegulationError::InvalidInput(format!(
            "{ENV_DATE_OFFSET_MINUTES} must be a whole number of minutes under 24 hours"
        ))
    };
    let minutes = v.parse::<i32>().map_err(|_| invalid())?;
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(invalid)
}
