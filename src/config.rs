//! Startup configuration
//!
//! One `StoreConfig` drives the whole process: storage layout, durability
//! toggles, checkpoint cadence, and the HTTP endpoint. Defaults favor full
//! durability (log enabled, recovery enabled, checkpoints throttled).

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Host the HTTP endpoint binds to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port the HTTP endpoint binds to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Storage root; contains `logs/`, `checkpoints/`, and `overflow/`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Minimum delay between checkpoints, in milliseconds.
    /// `None` disables the throttle: checkpoints run as fast as the engine
    /// requests them, trading I/O burstiness for lower staleness.
    #[serde(default)]
    pub checkpoint_flush_delay_ms: Option<u64>,

    /// Records applied since the last checkpoint before a new one is requested
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval_records: u64,

    /// Whether writes go through the durable log.
    /// Disabled, `set` acknowledges after the in-memory apply and durability
    /// rests on checkpoints alone.
    #[serde(default = "default_true")]
    pub enable_wal: bool,

    /// Whether large values spill to the overflow file instead of staying
    /// resident in memory
    #[serde(default)]
    pub enable_tiered_storage: bool,

    /// Value size, in bytes, at which tiered storage spills
    #[serde(default = "default_overflow_threshold")]
    pub overflow_value_threshold: usize,

    /// Whether startup rebuilds state from checkpoint + log
    #[serde(default = "default_true")]
    pub recover_on_start: bool,

    /// Bounded wait for the engine to become ready before startup fails
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_ms: u64,

    /// Grace period for the final checkpoint/flush during shutdown
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./statestore_data")
}

fn default_checkpoint_interval() -> u64 {
    1024
}

fn default_true() -> bool {
    true
}

fn default_overflow_threshold() -> usize {
    4096
}

fn default_startup_timeout() -> u64 {
    30_000
}

fn default_shutdown_grace() -> u64 {
    5_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            checkpoint_flush_delay_ms: None,
            checkpoint_interval_records: default_checkpoint_interval(),
            enable_wal: true,
            enable_tiered_storage: false,
            overflow_value_threshold: default_overflow_threshold(),
            recover_on_start: true,
            startup_timeout_ms: default_startup_timeout(),
            shutdown_grace_ms: default_shutdown_grace(),
        }
    }
}

impl StoreConfig {
    /// Convenience constructor rooted at `data_dir`, other fields default.
    pub fn at(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Directory of append-only log segments.
    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// Directory of checkpoint snapshots.
    pub fn checkpoints_dir(&self) -> PathBuf {
        self.data_dir.join("checkpoints")
    }

    /// Directory of the tiered-storage overflow file.
    pub fn overflow_dir(&self) -> PathBuf {
        self.data_dir.join("overflow")
    }

    /// Socket address string for the HTTP endpoint.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Bounded readiness wait as a `Duration`.
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    /// Shutdown grace period as a `Duration`.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Checkpoint throttle as a `Duration`, `None` when disabled.
    pub fn checkpoint_flush_delay(&self) -> Option<Duration> {
        self.checkpoint_flush_delay_ms.map(Duration::from_millis)
    }
}

/// statestore - a durable key-value store behind a small HTTP API
#[derive(Parser, Debug)]
#[command(name = "statestore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Host for the HTTP endpoint
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port for the HTTP endpoint
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Storage root directory
    #[arg(long, default_value = "./statestore_data")]
    pub data_dir: PathBuf,

    /// Minimum delay between checkpoints in milliseconds (omit to disable
    /// the throttle)
    #[arg(long)]
    pub checkpoint_flush_delay_ms: Option<u64>,

    /// Records between automatic checkpoint requests
    #[arg(long, default_value_t = default_checkpoint_interval())]
    pub checkpoint_interval_records: u64,

    /// Disable the durable log (in-memory acks, checkpoint-only durability)
    #[arg(long)]
    pub no_wal: bool,

    /// Spill large values to the overflow file
    #[arg(long)]
    pub tiered_storage: bool,

    /// Value size in bytes at which tiered storage spills
    #[arg(long, default_value_t = default_overflow_threshold())]
    pub overflow_value_threshold: usize,

    /// Skip recovery and start from an empty map
    #[arg(long)]
    pub no_recover: bool,

    /// Milliseconds to wait for the engine to become ready
    #[arg(long, default_value_t = default_startup_timeout())]
    pub startup_timeout_ms: u64,

    /// Milliseconds allowed for the final flush during shutdown
    #[arg(long, default_value_t = default_shutdown_grace())]
    pub shutdown_grace_ms: u64,
}

impl Cli {
    /// Convert parsed arguments into a `StoreConfig`.
    pub fn into_config(self) -> StoreConfig {
        StoreConfig {
            host: self.host,
            port: self.port,
            data_dir: self.data_dir,
            checkpoint_flush_delay_ms: self.checkpoint_flush_delay_ms,
            checkpoint_interval_records: self.checkpoint_interval_records,
            enable_wal: !self.no_wal,
            enable_tiered_storage: self.tiered_storage,
            overflow_value_threshold: self.overflow_value_threshold,
            recover_on_start: !self.no_recover,
            startup_timeout_ms: self.startup_timeout_ms,
            shutdown_grace_ms: self.shutdown_grace_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_durability() {
        let config = StoreConfig::default();
        assert!(config.enable_wal);
        assert!(config.recover_on_start);
        assert!(!config.enable_tiered_storage);
        assert!(config.checkpoint_flush_delay_ms.is_none());
    }

    #[test]
    fn directory_layout_hangs_off_data_dir() {
        let config = StoreConfig::at("/tmp/store");
        assert_eq!(config.logs_dir(), PathBuf::from("/tmp/store/logs"));
        assert_eq!(
            config.checkpoints_dir(),
            PathBuf::from("/tmp/store/checkpoints")
        );
        assert_eq!(config.overflow_dir(), PathBuf::from("/tmp/store/overflow"));
    }

    #[test]
    fn cli_flags_invert_into_config() {
        let cli = Cli::parse_from([
            "statestore",
            "--no-wal",
            "--no-recover",
            "--tiered-storage",
            "--port",
            "9000",
        ]);
        let config = cli.into_config();
        assert!(!config.enable_wal);
        assert!(!config.recover_on_start);
        assert!(config.enable_tiered_storage);
        assert_eq!(config.socket_addr(), "127.0.0.1:9000");
    }
}
