// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External command invocation.
//!
//! Nearly everything devstrap does to a machine happens through some other
//! program: a package manager, git, ssh-keygen, or the user's own shell
//! snippets. An [`Invocation`] is a fully built command line that can be
//! shown to the user in preview mode, or executed either blocking or on an
//! async runtime for pooled work.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    process::{Command, Output},
};
use tracing::debug;

/// Fully built external command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
}

impl Invocation {
    /// Construct new invocation.
    pub fn new(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Construct invocation of a raw snippet through the platform shell.
    pub fn shell(snippet: impl Into<String>) -> Self {
        if cfg!(target_os = "windows") {
            Self::new("powershell", [String::from("-NoProfile"), "-Command".into(), snippet.into()])
        } else {
            Self::new("sh", [String::from("-c"), snippet.into()])
        }
    }

    /// Prefix invocation with sudo.
    pub fn elevated(self) -> Self {
        let mut args = vec![self.program];
        args.extend(self.args);
        Self {
            program: "sudo".into(),
            args,
        }
    }

    /// Program to execute.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments handed to program.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Run invocation to completion, and report whether it exited cleanly.
    ///
    /// # Errors
    ///
    /// - Return [`SyscallError::Spawn`] if program cannot be started.
    pub fn succeeds(&self) -> Result<bool> {
        Ok(self.output()?.status.success())
    }

    /// Run invocation to completion, and collect its output.
    ///
    /// # Errors
    ///
    /// - Return [`SyscallError::Spawn`] if program cannot be started.
    /// - Return [`SyscallError::Failed`] if program exits unsuccessfully.
    pub fn run(&self) -> Result<String> {
        let output = self.output()?;
        self.collect(output)
    }

    /// Run invocation to completion on async runtime.
    ///
    /// # Errors
    ///
    /// - Return [`SyscallError::Spawn`] if program cannot be started.
    pub async fn succeeds_async(&self) -> Result<bool> {
        Ok(self.output_async().await?.status.success())
    }

    /// Run invocation to completion on async runtime, and collect its output.
    ///
    /// # Errors
    ///
    /// - Return [`SyscallError::Spawn`] if program cannot be started.
    /// - Return [`SyscallError::Failed`] if program exits unsuccessfully.
    pub async fn run_async(&self) -> Result<String> {
        let output = self.output_async().await?;
        self.collect(output)
    }

    fn output(&self) -> Result<Output> {
        debug!("run {self}");
        Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|source| SyscallError::Spawn {
                source,
                command: self.to_string(),
            })
    }

    async fn output_async(&self) -> Result<Output> {
        debug!("run {self}");
        tokio::process::Command::new(&self.program)
            .args(&self.args)
            .output()
            .await
            .map_err(|source| SyscallError::Spawn {
                source,
                command: self.to_string(),
            })
    }

    fn collect(&self, output: Output) -> Result<String> {
        let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
        let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();
        let mut message = String::new();

        if !stdout.is_empty() {
            message.push_str(format!("stdout: {stdout}").as_str());
        }

        if !stderr.is_empty() {
            message.push_str(format!("stderr: {stderr}").as_str());
        }

        // INVARIANT: Chomp trailing newlines.
        let message = message
            .strip_suffix("\r\n")
            .or(message.strip_suffix('\n'))
            .map(ToString::to_string)
            .unwrap_or(message);

        if !output.status.success() {
            return Err(SyscallError::Failed {
                command: self.to_string(),
                code: output.status.code(),
                message,
            });
        }

        Ok(message)
    }
}

impl Display for Invocation {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(fmt, " {arg:?}")?;
            } else {
                write!(fmt, " {arg}")?;
            }
        }

        Ok(())
    }
}

/// External command error types.
#[derive(Debug, thiserror::Error)]
pub enum SyscallError {
    /// Program could not be started, e.g., it is not installed.
    #[error("failed to run {command:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        command: String,
    },

    /// Program exited unsuccessfully.
    #[error("command {command:?} failed with exit code {code:?}:\n{message}")]
    Failed {
        command: String,
        code: Option<i32>,
        message: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = SyscallError> = std::result::Result<T, E>;
