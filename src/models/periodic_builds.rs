//! Periodic build policy shared by repository configuration and user settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Interval used when periodic builds are enabled without one.
pub const DEFAULT_INTERVAL: &str = "monthly";

const DAY: u64 = 24 * 60 * 60;

/// Periodic-build settings as stored (repository config or user integration settings).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodicBuildSettings {
    pub periodic_builds: bool,
    /// `daily`, `weekly`, `monthly` or a humantime duration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub periodic_builds_interval: Option<String>,
}

impl PeriodicBuildSettings {
    /// Resolve into an effective policy.
    pub fn policy(&self) -> AppResult<PeriodicBuildPolicy> {
        let interval = parse_interval(
            self.periodic_builds_interval
                .as_deref()
                .unwrap_or(DEFAULT_INTERVAL),
        )?;
        Ok(PeriodicBuildPolicy {
            enabled: self.periodic_builds,
            interval,
        })
    }
}

/// Effective periodic-build policy of a workflow version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodicBuildPolicy {
    pub enabled: bool,
    pub interval: Duration,
}

impl PeriodicBuildPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(30 * DAY),
        }
    }
}

/// Parse a periodic-build interval.
pub fn parse_interval(value: &str) -> AppResult<Duration> {
    match value.trim().to_lowercase().as_str() {
        "daily" => Ok(Duration::from_secs(DAY)),
        "weekly" => Ok(Duration::from_secs(7 * DAY)),
        "monthly" => Ok(Duration::from_secs(30 * DAY)),
        other => humantime::parse_duration(other).map_err(|e| {
            AppError::InvalidInput(format!("Invalid periodic builds interval '{}': {}", value, e))
        }),
    }
}
