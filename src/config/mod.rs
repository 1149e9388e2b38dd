//! Configuration management for the in-memory KV backend.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Component-wise validation
mod lock;
mod watch;
pub use lock::*;
pub use watch::*;


use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::CONFIG_ENV_PREFIX;
use crate::constants::CONFIG_PATH_ENV;
use crate::Result;
use crate::ValueCodec;

/// Main configuration container for a store instance
///
/// Sources are merged with increasing priority:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables prefixed with `MEMKV__`
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct MemKvConfig {
    /// Namespace prefix applied to every key of the facade built from this config
    #[serde(default)]
    pub domain: String,

    /// Lock polling cadence and deadline
    #[serde(default)]
    pub lock: LockConfig,

    /// Watch subsystem switches
    #[serde(default)]
    pub watch: WatchConfig,

    /// Codec used by typed reads and writes
    #[serde(default)]
    pub codec: ValueCodec,
}

impl Debug for MemKvConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("MemKvConfig")
            .field("domain", &self.domain)
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

impl MemKvConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// # Note
    /// Validation is deferred so further overrides can be layered with
    /// `with_override_config()`. Callers must call `validate()` last.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("MEMKV__DOMAIN", "pwx/test");
    /// let cfg = MemKvConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every section and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.lock.validate()?;
        self.watch.validate()?;
        Ok(self)
    }

    /// Convenience for the common case of a default config under a domain.
    pub fn with_domain(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Default::default()
        }
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(CONFIG_ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}
