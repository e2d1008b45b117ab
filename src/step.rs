//! The step CLI as seen by the issuer: `certificate create` and
//! `certificate inspect`.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::command::{ProcessRunner, ToolRunner};
use crate::create_args::{CreateArgsBuilder, StepCommand, DEFAULT_COMMAND_BIN};
use crate::error::Result;

/// Runner plus executable name.
#[derive(Clone)]
pub struct StepCli {
    runner: Arc<dyn ToolRunner>,
    command_bin: String,
}

impl StepCli {
    pub fn new(runner: Arc<dyn ToolRunner>, command_bin: impl Into<String>) -> Self {
        let command_bin = command_bin.into();
        Self {
            runner,
            command_bin: if command_bin.is_empty() {
                DEFAULT_COMMAND_BIN.to_string()
            } else {
                command_bin
            },
        }
    }

    pub fn command_bin(&self) -> &str {
        &self.command_bin
    }

    /// A create builder preloaded with this CLI's executable.
    pub fn create_builder(&self) -> CreateArgsBuilder {
        CreateArgsBuilder::new().command_bin(self.command_bin.clone())
    }

    pub async fn run(&self, command: &StepCommand) -> Result<String> {
        self.runner.run(&command.program, &command.args).await
    }

    /// `step certificate inspect <path> [--short]`; the raw output is returned.
    pub async fn inspect(&self, crt_path: &Path, short: bool) -> Result<String> {
        let mut args = vec![
            "certificate".to_string(),
            "inspect".to_string(),
            crt_path.to_string_lossy().into_owned(),
        ];
        if short {
            args.push("--short".to_string());
        }
        debug!(path = %crt_path.display(), short, "inspecting certificate");
        self.runner.run(&self.command_bin, &args).await
    }
}

impl Default for StepCli {
    fn default() -> Self {
        Self::new(Arc::new(ProcessRunner::default()), DEFAULT_COMMAND_BIN)
    }
}
