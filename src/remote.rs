//! Remote command execution over SSH
//!
//! Every mutation of the target host flows through the [`RemoteExecutor`]
//! trait as an argv vector. Commands are joined with shell quoting only at
//! the last moment, immediately before the single `ssh` invocation, so no
//! interpolated shell strings exist anywhere above this layer.
//!
//! `run`/`sudo`/`local` surface the command's exit status in [`ExecOutput`];
//! only channel-level failures (connection, auth, spawn) are `Err`.

use std::io::Write;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use tracing::debug;

use crate::error::{DeployError, TransportError};
use crate::tools::{self, get_tool_path};

/// Captured result of one command execution
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    fn from_output(output: std::process::Output) -> Self {
        Self {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Outcome of one idempotent reconciliation step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Created,
    AlreadyPresent,
}

impl StepOutcome {
    pub fn created(self) -> bool {
        matches!(self, StepOutcome::Created)
    }
}

/// Command-execution channel to the deployment target.
///
/// Callers must probe with `path_exists` before mutating and no-op when the
/// resource is already in place; existence probes that fail at the channel
/// level surface as errors, never as `false`.
pub trait RemoteExecutor {
    /// Run a command on the remote host as the deploy user
    fn run(&self, argv: &[&str]) -> Result<ExecOutput, TransportError>;

    /// Run a command on the remote host with elevated privilege
    fn sudo(&self, argv: &[&str]) -> Result<ExecOutput, TransportError>;

    /// Copy a local file to a path the deploy user can write
    fn put(&self, local: &Path, remote: &str) -> Result<(), TransportError>;

    /// Run a command on the caller's host
    fn local(&self, argv: &[&str]) -> Result<ExecOutput, TransportError>;

    /// Whether a path exists on the remote host
    fn path_exists(&self, path: &str) -> Result<bool, TransportError>;
}

/// Executor backed by the system `ssh`/`scp` binaries.
///
/// ssh reserves exit status 255 for its own failures, which is how channel
/// errors are told apart from remote command failures.
pub struct SshExecutor {
    target: String,
}

impl SshExecutor {
    pub fn new(user: &str, host: &str) -> Self {
        Self {
            target: format!("{user}@{host}"),
        }
    }

    fn ssh(&self, remote_command: &str) -> Result<ExecOutput, TransportError> {
        let ssh = get_tool_path(tools::SSH);
        debug!("remote: {}", remote_command);
        let output = Command::new(&ssh)
            .args(["-o", "BatchMode=yes", &self.target, remote_command])
            .output()
            .map_err(|source| TransportError::Spawn {
                program: ssh.clone(),
                source,
            })?;
        let exec = ExecOutput::from_output(output);
        if exec.status == 255 {
            return Err(TransportError::ChannelFailed {
                command: remote_command.to_string(),
            });
        }
        Ok(exec)
    }
}

impl RemoteExecutor for SshExecutor {
    fn run(&self, argv: &[&str]) -> Result<ExecOutput, TransportError> {
        self.ssh(&shell_words::join(argv))
    }

    fn sudo(&self, argv: &[&str]) -> Result<ExecOutput, TransportError> {
        let mut elevated = Vec::with_capacity(argv.len() + 1);
        elevated.push("sudo");
        elevated.extend_from_slice(argv);
        self.ssh(&shell_words::join(&elevated))
    }

    fn put(&self, local: &Path, remote: &str) -> Result<(), TransportError> {
        let scp = get_tool_path(tools::SCP);
        let dest = format!("{}:{}", self.target, remote);
        debug!("upload: {} -> {}", local.display(), dest);
        let output = Command::new(&scp)
            .args(["-o", "BatchMode=yes"])
            .arg(local)
            .arg(&dest)
            .output()
            .map_err(|source| TransportError::Spawn {
                program: scp.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(TransportError::UploadFailed {
                local: local.display().to_string(),
                remote: remote.to_string(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn local(&self, argv: &[&str]) -> Result<ExecOutput, TransportError> {
        debug!("local: {}", shell_words::join(argv));
        let output = Command::new(argv[0])
            .args(&argv[1..])
            .output()
            .map_err(|source| TransportError::Spawn {
                program: argv[0].to_string(),
                source,
            })?;
        Ok(ExecOutput::from_output(output))
    }

    fn path_exists(&self, path: &str) -> Result<bool, TransportError> {
        let out = self.run(&["test", "-e", path])?;
        Ok(out.success())
    }
}

/// Run a remote command and fail on a non-zero exit status
pub fn run_checked<E: RemoteExecutor>(exec: &E, argv: &[&str]) -> Result<ExecOutput> {
    let out = exec.run(argv)?;
    if !out.success() {
        if !out.stderr.trim().is_empty() {
            debug!("stderr: {}", out.stderr.trim());
        }
        return Err(DeployError::RemoteCommandFailed {
            command: argv.join(" "),
            status: out.status,
        }
        .into());
    }
    Ok(out)
}

/// Run a privileged remote command and fail on a non-zero exit status
pub fn sudo_checked<E: RemoteExecutor>(exec: &E, argv: &[&str]) -> Result<ExecOutput> {
    let out = exec.sudo(argv)?;
    if !out.success() {
        if !out.stderr.trim().is_empty() {
            debug!("stderr: {}", out.stderr.trim());
        }
        return Err(DeployError::RemoteCommandFailed {
            command: format!("sudo {}", argv.join(" ")),
            status: out.status,
        }
        .into());
    }
    Ok(out)
}

/// Upload a file into a privileged location.
///
/// scp lands the file in /tmp under its own name, then a privileged move
/// puts it in place; the deploy user cannot write /etc directly.
pub fn install_file<E: RemoteExecutor>(exec: &E, local: &Path, remote: &str) -> Result<()> {
    let name = local
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Upload source has no file name: {}", local.display()))?;
    let tmp = format!("/tmp/{name}");
    exec.put(local, &tmp)?;
    sudo_checked(exec, &["mv", &tmp, remote])?;
    Ok(())
}

/// Materialize generated file content locally and upload it to a path the
/// deploy user owns.
pub fn put_content<E: RemoteExecutor>(exec: &E, content: &str, remote: &str) -> Result<()> {
    let mut file =
        tempfile::NamedTempFile::new().context("Failed to create temp file for upload")?;
    file.write_all(content.as_bytes())
        .context("Failed to write generated content")?;
    file.flush().context("Failed to flush generated content")?;
    exec.put(file.path(), remote)?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingExecutor;
    use super::*;

    #[test]
    fn test_exec_output_success() {
        assert!(RecordingExecutor::ok().success());
        assert!(!RecordingExecutor::failed(1).success());
    }

    #[test]
    fn test_step_outcome() {
        assert!(StepOutcome::Created.created());
        assert!(!StepOutcome::AlreadyPresent.created());
    }

    #[test]
    fn test_install_file_stages_through_tmp() {
        let exec = RecordingExecutor::new();
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("foo.bar");
        std::fs::write(&local, "server {}\n").unwrap();

        install_file(&exec, &local, "/etc/nginx/sites-available/foo.bar").unwrap();

        let calls = exec.commands();
        assert_eq!(
            calls,
            vec![
                "put: /tmp/foo.bar".to_string(),
                "sudo: mv /tmp/foo.bar /etc/nginx/sites-available/foo.bar".to_string(),
            ]
        );
        assert_eq!(exec.uploads.borrow()[0].0, "server {}\n");
    }

    #[test]
    fn test_install_file_fails_on_move_error() {
        let exec = RecordingExecutor::new();
        exec.script(
            "sudo: mv /tmp/foo.bar /etc/nginx/sites-available/foo.bar",
            RecordingExecutor::failed(1),
        );
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("foo.bar");
        std::fs::write(&local, "").unwrap();

        let err = install_file(&exec, &local, "/etc/nginx/sites-available/foo.bar").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DeployError>(),
            Some(DeployError::RemoteCommandFailed { .. })
        ));
    }

    #[test]
    fn test_put_content_uploads_exact_bytes() {
        let exec = RecordingExecutor::new();
        put_content(&exec, "#!/bin/sh\n", "/www/sites/foo.bar/git/hooks/post-receive").unwrap();
        let uploads = exec.uploads.borrow();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, "#!/bin/sh\n");
        assert_eq!(uploads[0].1, "/www/sites/foo.bar/git/hooks/post-receive");
    }

    #[test]
    fn test_checked_helpers_surface_status() {
        let exec = RecordingExecutor::new();
        exec.script("run: false", RecordingExecutor::failed(1));
        let err = run_checked(&exec, &["false"]).unwrap_err();
        match err.downcast_ref::<DeployError>() {
            Some(DeployError::RemoteCommandFailed { command, status }) => {
                assert_eq!(command, "false");
                assert_eq!(*status, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
