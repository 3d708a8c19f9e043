//! Orchestrator wrapper around the `docker compose` CLI
//!
//! Every container lifecycle operation is a plain subprocess invocation. The
//! child's exit status is the only failure signal; a non-zero status is turned
//! into an error carrying the rendered command line and captured stderr.

use crate::config::EnvConfig;
use crate::error::OpsError;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Handle for invoking the compose CLI against a fixed compose file
#[derive(Debug, Clone)]
pub struct Compose {
    bin: String,
    compose_file: PathBuf,
}

impl Compose {
    pub fn new(bin: impl Into<String>, compose_file: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            compose_file: compose_file.into(),
        }
    }

    pub fn from_config(config: &EnvConfig) -> Self {
        Self::new(config.compose_bin.as_str(), &config.compose_file)
    }

    /// Start the stack in the background
    pub async fn up(&self) -> anyhow::Result<()> {
        self.run_streaming(&["up", "-d"]).await
    }

    /// Stop and remove the stack
    pub async fn down(&self) -> anyhow::Result<()> {
        self.run_streaming(&["down"]).await
    }

    /// Restart all services
    pub async fn restart(&self) -> anyhow::Result<()> {
        self.run_streaming(&["restart"]).await
    }

    /// Stream logs to the terminal, optionally for a single service.
    /// Blocks until the child exits (Ctrl+C is delivered to the whole group).
    pub async fn logs(&self, service: Option<&str>) -> anyhow::Result<()> {
        let mut args = vec!["logs", "-f", "--tail", "100"];
        if let Some(service) = service {
            args.push(service);
        }
        self.run_streaming(&args).await
    }

    /// Capture `compose ps` output for the status report
    pub async fn ps(&self) -> anyhow::Result<String> {
        self.run_capturing(&["ps"]).await
    }

    /// Run a command inside a running service container
    pub async fn exec(&self, service: &str, command: &[&str]) -> anyhow::Result<()> {
        let mut args = vec!["exec", "-T", service];
        args.extend_from_slice(command);
        self.run_streaming(&args).await
    }

    /// Run a one-off container for a service (used for certbot invocations)
    pub async fn run_service(&self, service: &str, command: &[String]) -> anyhow::Result<()> {
        let mut args: Vec<&str> = vec!["run", "--rm", service];
        args.extend(command.iter().map(String::as_str));
        self.run_streaming(&args).await
    }

    /// Arguments common to every invocation
    fn base_args(&self) -> Vec<String> {
        vec![
            "compose".to_string(),
            "-f".to_string(),
            self.compose_file.display().to_string(),
        ]
    }

    fn command_line(&self, args: &[&str]) -> String {
        let mut parts = vec![self.bin.clone()];
        parts.extend(self.base_args());
        parts.extend(args.iter().map(|s| s.to_string()));
        parts.join(" ")
    }

    /// Run with inherited stdio so output reaches the terminal as it happens
    async fn run_streaming(&self, args: &[&str]) -> anyhow::Result<()> {
        let rendered = self.command_line(args);
        info!(command = %rendered, "Running");

        let status = Command::new(&self.bin)
            .args(self.base_args())
            .args(args)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| anyhow::anyhow!("failed to spawn `{}`: {}", rendered, e))?;

        if !status.success() {
            return Err(OpsError::CommandFailed {
                command: rendered,
                status,
                stderr: String::new(),
            }
            .into());
        }
        Ok(())
    }

    /// Run with captured output, returning stdout
    async fn run_capturing(&self, args: &[&str]) -> anyhow::Result<String> {
        let rendered = self.command_line(args);
        debug!(command = %rendered, "Running");

        let output = Command::new(&self.bin)
            .args(self.base_args())
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| anyhow::anyhow!("failed to spawn `{}`: {}", rendered, e))?;

        if !output.status.success() {
            return Err(OpsError::CommandFailed {
                command: rendered,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            }
            .into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}
