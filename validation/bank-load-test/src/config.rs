//! Configuration loading and management.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::user::BootstrapSettings;
use crate::workload::TaskSelection;

/// Main test configuration loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub duration_secs: u64,
    /// Number of virtual users to spawn.
    pub users: u32,
    /// Virtual users spawned per second; 0 spawns all at once.
    #[serde(default)]
    pub hatch_rate: f64,
    #[serde(default)]
    pub warmup_secs: u64,
    #[serde(default = "default_wait_min_ms")]
    pub wait_min_ms: u64,
    #[serde(default = "default_wait_max_ms")]
    pub wait_max_ms: u64,
    #[serde(default)]
    pub task_selection: TaskSelection,
    #[serde(default)]
    pub seed: Option<u64>, // Optional RNG seed for reproducible task order
    #[serde(default = "default_username_prefix")]
    pub username_prefix: String,
    /// First identity handed out; raise it to avoid usernames from earlier runs.
    #[serde(default)]
    pub identity_offset: u64,
    #[serde(default = "default_seed_amount")]
    pub seed_amount: i64,
    #[serde(default = "default_transfer_amount")]
    pub transfer_amount: i64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub log_requests: bool, // Log all transfer events to a JSONL file
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_wait_min_ms() -> u64 {
    100
}

fn default_wait_max_ms() -> u64 {
    500
}

fn default_username_prefix() -> String {
    "user".to_string()
}

fn default_seed_amount() -> i64 {
    100
}

fn default_transfer_amount() -> i64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl TestConfig {
    /// Configuration with every optional field at its default.
    pub fn new(name: impl Into<String>, duration_secs: u64, users: u32) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            base_url: default_base_url(),
            duration_secs,
            users,
            hatch_rate: 0.0,
            warmup_secs: 0,
            wait_min_ms: default_wait_min_ms(),
            wait_max_ms: default_wait_max_ms(),
            task_selection: TaskSelection::default(),
            seed: None,
            username_prefix: default_username_prefix(),
            identity_offset: 0,
            seed_amount: default_seed_amount(),
            transfer_amount: default_transfer_amount(),
            request_timeout_secs: default_request_timeout_secs(),
            log_requests: false,
        }
    }

    /// Load configuration from YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TestConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.base_url.trim().is_empty() {
            anyhow::bail!("base_url must not be empty");
        }
        if self.duration_secs == 0 {
            anyhow::bail!("duration_secs must be > 0");
        }
        if self.users == 0 {
            anyhow::bail!("users must be > 0");
        }
        if !self.hatch_rate.is_finite() || self.hatch_rate < 0.0 {
            anyhow::bail!("hatch_rate must be >= 0");
        }
        if self.hatch_rate > 0.0 && self.hatch_interval().is_none() {
            anyhow::bail!("hatch_rate {} is too small to schedule", self.hatch_rate);
        }
        if self.wait_min_ms > self.wait_max_ms {
            anyhow::bail!(
                "wait_min_ms ({}) must not exceed wait_max_ms ({})",
                self.wait_min_ms,
                self.wait_max_ms
            );
        }
        if self.seed_amount <= 0 {
            anyhow::bail!("seed_amount must be > 0");
        }
        if self.transfer_amount <= 0 {
            anyhow::bail!("transfer_amount must be > 0");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be > 0");
        }
        Ok(())
    }

    pub fn bootstrap_settings(&self) -> BootstrapSettings {
        BootstrapSettings {
            username_prefix: self.username_prefix.clone(),
            seed_amount: self.seed_amount,
        }
    }

    /// Delay between two spawned virtual users; `None` spawns all at once or
    /// when the rate has no representable interval.
    pub fn hatch_interval(&self) -> Option<Duration> {
        if self.hatch_rate > 0.0 {
            Duration::try_from_secs_f64(1.0 / self.hatch_rate).ok()
        } else {
            None
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
