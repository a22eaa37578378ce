//! Sweeper schedule read from the environment.

use std::time::Duration;

use storyforge_store::ConfigError;
use storyforge_store::config::parse_or;

/// How often and how aggressively the sweeper runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweeperConfig {
    /// `SWEEP_INTERVAL_SECS`, default 300. Must be positive.
    pub interval: Duration,
    /// `SWEEP_STALE_THRESHOLD_SECS`, default 3600. Zero fails every in-flight row.
    pub stale_threshold: Duration,
    /// `SWEEP_INITIAL_DELAY_SECS`, default 10.
    pub initial_delay: Duration,
    /// `SWEEP_DEADLINE_SECS`, default 60. Must be positive.
    pub deadline: Duration,
    /// `RUN_MIGRATIONS`, default false.
    pub run_migrations: bool,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            stale_threshold: Duration::from_secs(3600),
            initial_delay: Duration::from_secs(10),
            deadline: Duration::from_secs(60),
            run_migrations: false,
        }
    }
}

fn positive_secs<F>(lookup: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs: u64 = parse_or(lookup, key, default, "a positive number of seconds")?;
    if secs == 0 {
        return Err(ConfigError::Invalid {
            key,
            expected: "a positive number of seconds",
            value: "0".to_owned(),
        });
    }
    Ok(Duration::from_secs(secs))
}

impl SweeperConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a value is set but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a value is set but invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let stale_threshold: u64 = parse_or(
            &lookup,
            "SWEEP_STALE_THRESHOLD_SECS",
            defaults.stale_threshold.as_secs(),
            "a number of seconds",
        )?;
        let initial_delay: u64 = parse_or(
            &lookup,
            "SWEEP_INITIAL_DELAY_SECS",
            defaults.initial_delay.as_secs(),
            "a number of seconds",
        )?;

        Ok(Self {
            interval: positive_secs(&lookup, "SWEEP_INTERVAL_SECS", defaults.interval.as_secs())?,
            stale_threshold: Duration::from_secs(stale_threshold),
            initial_delay: Duration::from_secs(initial_delay),
            deadline: positive_secs(&lookup, "SWEEP_DEADLINE_SECS", defaults.deadline.as_secs())?,
            run_migrations: parse_or(&lookup, "RUN_MIGRATIONS", false, "true or false")?,
        })
    }
}
