//! `profhub.toml` config loading.

use serde::{Deserialize, Serialize};

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::HumanDuration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Address the HTTP API listens on.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// JSON snapshot mirroring the store. In-memory only when unset.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,

    /// Upper bound for a single capture, applied to uploads and remote fetches.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Bare binary names `/api/exec` may run.
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,

    #[serde(default = "default_command_timeout")]
    pub command_timeout: HumanDuration,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout: HumanDuration,

    /// CPU capture length requested from remote endpoints when the caller omits it.
    #[serde(default = "default_cpu_seconds")]
    pub default_cpu_seconds: u64,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}

fn default_max_upload_bytes() -> usize {
    32 * 1024 * 1024
}

fn default_allowed_commands() -> Vec<String> {
    vec!["go".to_string(), "pprof".to_string()]
}

fn default_command_timeout() -> HumanDuration {
    HumanDuration::from_secs(60)
}

fn default_fetch_timeout() -> HumanDuration {
    HumanDuration::from_secs(90)
}

fn default_cpu_seconds() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            snapshot_path: None,
            max_upload_bytes: default_max_upload_bytes(),
            allowed_commands: default_allowed_commands(),
            command_timeout: default_command_timeout(),
            fetch_timeout: default_fetch_timeout(),
            default_cpu_seconds: default_cpu_seconds(),
        }
    }
}

impl Config {
    pub fn load_optional(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<Config>(&s) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!("failed to parse config {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                tracing::warn!("failed to read config {}: {err}", path.display());
                Self::default()
            }
        }
    }

    pub fn is_command_allowed(&self, name: &str) -> bool {
        self.allowed_commands.iter().any(|c| c == name)
    }
}
