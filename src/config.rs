// =====================================================
// ENGINE CONFIGURATION
// Pool sizing, timeouts, chunk and page sizes
// =====================================================

use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_POOL_MAX_SIZE: u32 = 10;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;
const DEFAULT_MAX_LIFETIME_SECS: u64 = 1800;
const DEFAULT_TRANSFER_CHUNK_SIZE: usize = 100;
const DEFAULT_PAGE_SIZE: usize = 10;
const DEFAULT_MAX_PAGE_SIZE: usize = 1_000;

const ENV_PREFIX: &str = "DATABRIDGE_";

fn default_pool_max_size() -> u32 {
    DEFAULT_POOL_MAX_SIZE
}

fn default_acquire_timeout_secs() -> u64 {
    DEFAULT_ACQUIRE_TIMEOUT_SECS
}

fn default_idle_timeout_secs() -> u64 {
    DEFAULT_IDLE_TIMEOUT_SECS
}

fn default_max_lifetime_secs() -> u64 {
    DEFAULT_MAX_LIFETIME_SECS
}

fn default_transfer_chunk_size() -> usize {
    DEFAULT_TRANSFER_CHUNK_SIZE
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_max_page_size() -> usize {
    DEFAULT_MAX_PAGE_SIZE
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PoolSettings {
    #[serde(default = "default_pool_max_size")]
    pub max_size: u32,
    #[serde(default)]
    pub min_idle: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_max_lifetime_secs")]
    pub max_lifetime_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_POOL_MAX_SIZE,
            min_idle: 0,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            max_lifetime_secs: DEFAULT_MAX_LIFETIME_SECS,
        }
    }
}

impl PoolSettings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default = "default_transfer_chunk_size")]
    pub transfer_chunk_size: usize,
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool: PoolSettings::default(),
            transfer_chunk_size: DEFAULT_TRANSFER_CHUNK_SIZE,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `DATABRIDGE_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok())
    }

    pub(crate) fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        override_from(&lookup, "POOL_MAX_SIZE", &mut self.pool.max_size);
        override_from(&lookup, "POOL_MIN_IDLE", &mut self.pool.min_idle);
        override_from(&lookup, "POOL_ACQUIRE_TIMEOUT_SECS", &mut self.pool.acquire_timeout_secs);
        override_from(&lookup, "POOL_IDLE_TIMEOUT_SECS", &mut self.pool.idle_timeout_secs);
        override_from(&lookup, "POOL_MAX_LIFETIME_SECS", &mut self.pool.max_lifetime_secs);
        override_from(&lookup, "TRANSFER_CHUNK_SIZE", &mut self.transfer_chunk_size);
        override_from(&lookup, "DEFAULT_PAGE_SIZE", &mut self.default_page_size);
        override_from(&lookup, "MAX_PAGE_SIZE", &mut self.max_page_size);
        self.validated()
    }

    /// Clamps values that would make pools or paging unusable.
    pub fn validated(mut self) -> Self {
        self.pool.max_size = self.pool.max_size.max(1);
        self.pool.min_idle = self.pool.min_idle.min(self.pool.max_size);
        self.transfer_chunk_size = self.transfer_chunk_size.max(1);
        self.max_page_size = self.max_page_size.max(1);
        self.default_page_size = self.default_page_size.clamp(1, self.max_page_size);
        self
    }
}

fn override_from<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *target = value,
        Err(_) => log::warn!(
            "Ignoring {}{}='{}': not a valid number",
            ENV_PREFIX,
            key,
            raw
        ),
    }
}
