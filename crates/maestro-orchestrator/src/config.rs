//! Orchestrator configuration.
//!
//! Every knob has a serde default, so a partial (or empty) TOML document is a
//! valid configuration.

use maestro_core::{MaestroError, MaestroResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables for the directory, hub and coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Upper bound on tasks in flight (assigned or in progress) at once.
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    #[serde(default = "default_task_timeout_minutes")]
    pub default_task_timeout_minutes: f64,
    /// Name of a policy registered in the coordinator's [`crate::PolicyRegistry`].
    #[serde(default = "default_assignment_strategy")]
    pub assignment_strategy: String,
    /// Capacity of each mailbox.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    #[serde(default = "default_message_ttl_hours")]
    pub message_ttl_hours: f64,
    #[serde(default = "default_heartbeat_timeout_seconds")]
    pub heartbeat_timeout_seconds: u64,
    /// How long terminal tasks are kept before pruning.
    #[serde(default = "default_task_retention_hours")]
    pub task_retention_hours: f64,
    #[serde(default = "default_max_concurrent_per_agent")]
    pub max_concurrent_per_agent: usize,
    /// Monitor passes per coordinator run before consolidating regardless.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
    #[serde(default = "default_maintenance_interval_seconds")]
    pub maintenance_interval_seconds: u64,
    #[serde(default = "default_health_check_interval_seconds")]
    pub health_check_interval_seconds: u64,
}

const SECS_PER_MINUTE: f64 = 60.0;
const SECS_PER_HOUR: f64 = 3600.0;

/// Seconds to `Duration` without panicking: NaN and negatives clamp to zero,
/// overflow to `Duration::MAX`. `validate` rejects all three up front.
fn saturating_duration(secs: f64) -> Duration {
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) => duration,
        Err(_) if secs > 0.0 => Duration::MAX,
        Err(_) => Duration::ZERO,
    }
}

fn default_max_concurrent_tasks() -> usize {
    10
}
fn default_task_timeout_minutes() -> f64 {
    30.0
}
fn default_assignment_strategy() -> String {
    "capability_match".to_string()
}
fn default_max_queue_size() -> usize {
    1000
}
fn default_message_ttl_hours() -> f64 {
    24.0
}
fn default_heartbeat_timeout_seconds() -> u64 {
    300
}
fn default_task_retention_hours() -> f64 {
    24.0
}
fn default_max_concurrent_per_agent() -> usize {
    3
}
fn default_max_iterations() -> u32 {
    100
}
fn default_monitor_interval_ms() -> u64 {
    1000
}
fn default_maintenance_interval_seconds() -> u64 {
    60
}
fn default_health_check_interval_seconds() -> u64 {
    30
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            default_task_timeout_minutes: default_task_timeout_minutes(),
            assignment_strategy: default_assignment_strategy(),
            max_queue_size: default_max_queue_size(),
            message_ttl_hours: default_message_ttl_hours(),
            heartbeat_timeout_seconds: default_heartbeat_timeout_seconds(),
            task_retention_hours: default_task_retention_hours(),
            max_concurrent_per_agent: default_max_concurrent_per_agent(),
            max_iterations: default_max_iterations(),
            monitor_interval_ms: default_monitor_interval_ms(),
            maintenance_interval_seconds: default_maintenance_interval_seconds(),
            health_check_interval_seconds: default_health_check_interval_seconds(),
        }
    }
}

impl OrchestratorConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> MaestroResult<Self> {
        let config: OrchestratorConfig = toml::from_str(content)
            .map_err(|e| MaestroError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML config file.
    pub fn load(path: &Path) -> MaestroResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MaestroError::Config(format!(
                "Failed to read config '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Reject values the runtime cannot honour.
    pub fn validate(&self) -> MaestroResult<()> {
        if self.max_concurrent_tasks == 0 {
            return Err(MaestroError::Config(
                "max_concurrent_tasks must be greater than 0".to_string(),
            ));
        }
        if self.max_queue_size == 0 {
            return Err(MaestroError::Config(
                "max_queue_size must be greater than 0".to_string(),
            ));
        }
        if self.max_concurrent_per_agent == 0 {
            return Err(MaestroError::Config(
                "max_concurrent_per_agent must be greater than 0".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(MaestroError::Config(
                "max_iterations must be greater than 0".to_string(),
            ));
        }
        for (name, value) in [
            ("monitor_interval_ms", self.monitor_interval_ms),
            ("maintenance_interval_seconds", self.maintenance_interval_seconds),
            ("health_check_interval_seconds", self.health_check_interval_seconds),
        ] {
            if value == 0 {
                return Err(MaestroError::Config(format!(
                    "{name} must be greater than 0"
                )));
            }
        }
        for (name, value, unit) in [
            ("default_task_timeout_minutes", self.default_task_timeout_minutes, SECS_PER_MINUTE),
            ("message_ttl_hours", self.message_ttl_hours, SECS_PER_HOUR),
            ("task_retention_hours", self.task_retention_hours, SECS_PER_HOUR),
        ] {
            if let Err(e) = Duration::try_from_secs_f64(value * unit) {
                return Err(MaestroError::Config(format!(
                    "{name} must be a non-negative duration in range, got {value} ({e})"
                )));
            }
        }
        if self.assignment_strategy.trim().is_empty() {
            return Err(MaestroError::Config(
                "assignment_strategy must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn task_timeout(&self) -> Duration {
        saturating_duration(self.default_task_timeout_minutes * SECS_PER_MINUTE)
    }

    pub fn message_ttl(&self) -> Duration {
        saturating_duration(self.message_ttl_hours * SECS_PER_HOUR)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_seconds)
    }

    pub fn task_retention(&self) -> Duration {
        saturating_duration(self.task_retention_hours * SECS_PER_HOUR)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_seconds)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_seconds)
    }
}
