//! Engine configuration.
//!
//! All sections implement `Default`, and every field is optional when loading
//! from TOML. Durations are expressed in milliseconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Top-level configuration for a Strata repository.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    /// Commit retry behaviour.
    pub commit: CommitConfig,
    /// Merge and rebase behaviour.
    pub merge: MergeConfig,
    /// Branch compare defaults.
    pub compare: CompareConfig,
}

impl StrataConfig {
    /// Parse a configuration from TOML text.
    ///
    /// ```
    /// use strata_types::StrataConfig;
    ///
    /// let config = StrataConfig::from_toml_str("[commit]\nmax_attempts = 3\n").unwrap();
    /// assert_eq!(config.commit.max_attempts, 3);
    /// ```
    pub fn from_toml_str(s: &str) -> Result<Self, TypeError> {
        let config: Self = toml::from_str(s).map_err(|e| TypeError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), TypeError> {
        if self.commit.max_attempts == 0 {
            return Err(TypeError::InvalidConfig(
                "commit.max_attempts must be at least 1".into(),
            ));
        }
        if self.commit.initial_backoff > self.commit.max_backoff {
            return Err(TypeError::InvalidConfig(
                "commit.initial_backoff must not exceed commit.max_backoff".into(),
            ));
        }
        Ok(())
    }
}

/// Retry policy for the optimistic-concurrency commit path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitConfig {
    /// Total attempts (first try included) before a commit fails.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled on each following retry.
    #[serde(with = "duration_ms")]
    pub initial_backoff: Duration,
    /// Upper bound for a single retry delay.
    #[serde(with = "duration_ms")]
    pub max_backoff: Duration,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(500),
        }
    }
}

impl CommitConfig {
    /// Backoff before retry number `retry` (1-based), without jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Merge and rebase settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Wall-clock budget for computing and committing a merge.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    /// Squash flag used when a merge request does not set one.
    pub squash_by_default: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            squash_by_default: true,
        }
    }
}

/// Branch compare settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareConfig {
    /// Detail limit used when a compare request does not set one.
    pub default_limit: usize,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self { default_limit: 100 }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
