//! Child process execution with a wall-clock budget.
//!
//! [`ProcessRunner`] starts a program with an argument vector (no shell is
//! involved), waits for it to exit and returns stdout followed by stderr as
//! one string. A child that outlives the timeout is killed.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{CaError, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Seam between issuance logic and the operating system.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run `program` with `args`; on success return the combined output.
    async fn run(&self, program: &str, args: &[String]) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
    inherit_env: bool,
    envs: Vec<(String, String)>,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            inherit_env: true,
            envs: Vec::new(),
        }
    }

    /// Start children with an empty environment plus whatever [`env`](Self::env) adds.
    pub fn clear_env(mut self) -> Self {
        self.inherit_env = false;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<String> {
        debug!(program, ?args, "running command");

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !self.inherit_env {
            command.env_clear();
        }
        command.envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let child = command.spawn().map_err(|source| CaError::Spawn {
            program: program.to_string(),
            source,
        })?;

        // dropping the wait future on timeout drops the child, which kills it
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(program, timeout_secs = self.timeout.as_secs(), "command timed out");
                return Err(CaError::Timeout {
                    program: program.to_string(),
                    timeout: self.timeout,
                });
            }
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            warn!(program, status = %output.status, output = %combined, "command failed");
            return Err(CaError::NonZeroExit {
                program: program.to_string(),
                status: output.status.to_string(),
                output: combined,
            });
        }

        debug!(program, "command finished");
        Ok(combined)
    }
}
