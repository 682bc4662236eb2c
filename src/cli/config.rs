use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dispatch::dispatcher::DispatchConfig;
use crate::sync::scheduler::SchedulerConfig;

pub const DEFAULT_CONFIG_PATH: &str = "page-sync.yaml";

// ============================================================================
// CLI Argument Parsing (clap derive)
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "page-sync",
    version,
    about = "Replay page/agent context sync scenarios"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file (default: page-sync.yaml in current dir)
    #[arg(long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a scenario through a live sync session and print every context sent
    Replay {
        /// Scenario YAML file
        #[arg(long)]
        scenario: String,

        /// Append a JSONL trace of sends and agent commands to this file
        #[arg(long)]
        trace: Option<String>,
    },

    /// Print the context a scenario's initial document would produce
    Survey {
        /// Scenario YAML file
        #[arg(long)]
        scenario: String,
    },
}

// ============================================================================
// Config File Model (optional YAML)
// ============================================================================

/// Optional YAML config file: `page-sync.yaml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub dispatch: DispatchSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSection {
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,

    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            quiet_period_ms: default_quiet_period_ms(),
            max_wait_ms: default_max_wait_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSection {
    #[serde(default = "default_true")]
    pub automatic_context: bool,

    #[serde(default = "default_highlight_ms")]
    pub highlight_ms: u64,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            automatic_context: true,
            highlight_ms: default_highlight_ms(),
        }
    }
}

// Serde default helpers
fn default_quiet_period_ms() -> u64 { 50 }
fn default_max_wait_ms() -> u64 { 300 }
fn default_highlight_ms() -> u64 { 2000 }
fn default_true() -> bool { true }

impl SyncConfig {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            quiet_period: Duration::from_millis(self.scheduler.quiet_period_ms),
            max_wait: Duration::from_millis(self.scheduler.max_wait_ms),
        }
    }

    /// Dispatch settings without any overrides.
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            automatic_context: self.dispatch.automatic_context,
            highlight_duration: Duration::from_millis(self.dispatch.highlight_ms),
            ..Default::default()
        }
    }
}

// ============================================================================
// Config File Loading
// ============================================================================

/// Load config from a YAML file. Returns defaults if file is missing or malformed.
pub fn load_config(path: Option<&str>) -> SyncConfig {
    let config_path = path.unwrap_or(DEFAULT_CONFIG_PATH);
    let content = match std::fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => {
            debug!(path = config_path, error = %e, "no config file; using defaults");
            return SyncConfig::default();
        }
    };

    match serde_yaml::from_str(&content) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = config_path, error = %e, "malformed config file; using defaults");
            SyncConfig::default()
        }
    }
}
