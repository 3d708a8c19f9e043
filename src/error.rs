//! Structured failure classes for command preconditions and subprocess results

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced directly to the user by the CLI
#[derive(Debug, Error)]
pub enum OpsError {
    /// Environment file could not be found at the expected path
    #[error("environment file not found: {0} (copy .env.example or create it first)")]
    MissingEnvFile(PathBuf),

    /// One or more required configuration keys are missing or empty
    #[error("configuration errors:\n  - {}", .0.join("\n  - "))]
    InvalidConfig(Vec<String>),

    /// An external command exited with a non-zero status
    #[error("`{command}` failed with {status}{}", format_stderr(.stderr))]
    CommandFailed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    /// Restore was pointed at an archive that does not exist
    #[error("backup archive not found: {0}")]
    MissingBackup(PathBuf),

    /// No certificate has been issued yet for the configured domain
    #[error("certificate not found at {0} (run `bubblectl issue-cert` first)")]
    MissingCertificate(PathBuf),

    /// Template references a variable that is not defined in the env file
    #[error("unresolved placeholder `${{{0}}}` in template")]
    UnresolvedPlaceholder(String),
}

fn format_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(":\n{}", trimmed)
    }
}
