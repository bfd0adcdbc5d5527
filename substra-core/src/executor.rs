//! # Executor
//!
//! The executor runs an algorithm in isolation given an executable, a command
//! and a set of mounts, and returns the captured log lines. A non-zero exit is
//! reported as an `ExecutionFailure` error carrying whatever log was captured.
//!
//! Sandboxing itself is outside of this crate: [Executor] is the seam where a
//! container runtime plugs in. [LocalExecutor] runs the executable as a plain
//! child process and exposes the mounts through environment variables, which
//! is enough for local simulation and tests.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;

use crate::error::Error;

pub const CONTAINER_MODEL_PATH: &str = "/sandbox/model";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::ReadOnly => "ro",
            AccessMode::ReadWrite => "rw",
        }
    }
}

/// What a mount provides to the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MountRole {
    /// Staged data samples.
    Data,
    /// Dataset opener, the entry point reading the samples.
    Opener,
    /// Input models, and the output model of a train unit.
    Models,
    /// Scratch area shared by the units of one compute plan.
    Local,
    /// Predictions of a test unit.
    Pred,
}

impl MountRole {
    /// Path of the mount inside the sandbox.
    pub fn target(&self) -> &'static str {
        match self {
            MountRole::Data => "/sandbox/data",
            MountRole::Opener => "/sandbox/opener/__init__.py",
            MountRole::Models => CONTAINER_MODEL_PATH,
            MountRole::Local => "/sandbox/local",
            MountRole::Pred => "/sandbox/pred",
        }
    }

    /// Environment variable through which [LocalExecutor] exposes the mount.
    pub fn env_var(&self) -> &'static str {
        match self {
            MountRole::Data => "SANDBOX_DATA",
            MountRole::Opener => "SANDBOX_OPENER",
            MountRole::Models => "SANDBOX_MODELS",
            MountRole::Local => "SANDBOX_LOCAL",
            MountRole::Pred => "SANDBOX_PRED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host: PathBuf,
    pub role: MountRole,
    pub mode: AccessMode,
}

impl Mount {
    pub fn new(host: impl Into<PathBuf>, role: MountRole, mode: AccessMode) -> Self {
        Mount {
            host: host.into(),
            role,
            mode,
        }
    }

    pub fn read_only(host: impl Into<PathBuf>, role: MountRole) -> Self {
        Mount::new(host, role, AccessMode::ReadOnly)
    }

    pub fn read_write(host: impl Into<PathBuf>, role: MountRole) -> Self {
        Mount::new(host, role, AccessMode::ReadWrite)
    }

    pub fn target(&self) -> &'static str {
        self.role.target()
    }
}

#[async_trait]
pub trait Executor: Send + Sync {
    /// Run `executable` with `command` and `mounts` and return its log lines.
    ///
    /// The returned future may be dropped before completion (cancellation or
    /// timeout); implementations must stop the execution in that case.
    async fn spawn(
        &self,
        name: &str,
        executable: &Path,
        command: &str,
        mounts: &[Mount],
    ) -> Result<Vec<String>, Error>;
}

/// Runs the executable as a child process.
///
/// Command words become the process arguments. Each mount's host path is
/// exported in the environment variable of its role, e.g. `SANDBOX_DATA`.
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor;

impl LocalExecutor {
    pub fn new() -> Self {
        LocalExecutor
    }
}

#[async_trait]
impl Executor for LocalExecutor {
    async fn spawn(
        &self,
        name: &str,
        executable: &Path,
        command: &str,
        mounts: &[Mount],
    ) -> Result<Vec<String>, Error> {
        tracing::debug!("Spawning {}: {} {}", name, executable.display(), command);
        let mut process = tokio::process::Command::new(executable);
        process
            .args(command.split_whitespace())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        for mount in mounts {
            process.env(mount.role.env_var(), &mount.host);
        }
        let output = process.output().await.map_err(|e| {
            Error::execution_failure(format!(
                "Failed to start {} ({}): {}",
                name,
                executable.display(),
                e
            ))
        })?;

        let mut logs: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_owned)
            .collect();
        logs.extend(
            String::from_utf8_lossy(&output.stderr)
                .lines()
                .map(str::to_owned),
        );

        if output.status.success() {
            Ok(logs)
        } else {
            Err(Error::execution_failure(format!(
                "{} exited with {}",
                name, output.status
            ))
            .with_log(logs.join("\n")))
        }
    }
}
