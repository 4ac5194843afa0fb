use std::{path::Path, time::Duration};

use crate::{docker, git, process, secret::Secret};

pub const DEFAULT_GIT: &str = "git";
pub const DEFAULT_CONTAINER_CLI: &str = "docker";

pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_CLONE_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(3600);
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(1800);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Success,
    /// The tool ran and exited unsuccessfully. `None` if it was terminated by a signal.
    ExitCode(Option<i32>),
    /// The tool could not be started or did not finish before its deadline.
    NotRun(String),
}

/// The outcome of one external tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub status: StepStatus,
    pub stdout: String,
    pub stderr: String,
}

impl StepResult {
    pub fn success() -> Self {
        Self {
            status: StepStatus::Success,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: StepStatus::ExitCode(Some(code)),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }

    /// The captured stderr if there is any, then the last line the tool wrote to stdout, otherwise
    /// a description of how the tool failed.
    pub fn detail(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_owned();
        }
        if let Some(line) = self.stdout.lines().map(str::trim).rfind(|line| !line.is_empty()) {
            return line.to_owned();
        }
        match &self.status {
            StepStatus::Success => String::new(),
            StepStatus::ExitCode(Some(code)) => format!("exited with non-zero exit code `{code}`"),
            StepStatus::ExitCode(None) => "terminated by a signal".to_owned(),
            StepStatus::NotRun(reason) => reason.clone(),
        }
    }
}

impl From<process::Result<process::Output>> for StepResult {
    fn from(value: process::Result<process::Output>) -> Self {
        match value {
            Ok(output) => Self {
                status: if output.status.success() {
                    StepStatus::Success
                } else {
                    StepStatus::ExitCode(output.status.code())
                },
                stdout: output.stdout_lossy(),
                stderr: output.stderr_lossy(),
            },
            Err(error) => Self {
                status: StepStatus::NotRun(error.reason()),
                stdout: String::new(),
                stderr: String::new(),
            },
        }
    }
}

/// The external tools the pipeline drives. Every call blocks until the tool exits.
pub trait Toolchain {
    fn login(&self, host: &str, account: &str, credential: &Secret) -> StepResult;

    fn clone_repository(&self, location: &str, destination: &Path) -> StepResult;

    fn build(&self, image: &str, dockerfile: &Path, context: &Path) -> StepResult;

    fn push(&self, image: &str) -> StepResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub login: Duration,
    pub clone: Duration,
    pub build: Duration,
    pub push: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            login: DEFAULT_LOGIN_TIMEOUT,
            clone: DEFAULT_CLONE_TIMEOUT,
            build: DEFAULT_BUILD_TIMEOUT,
            push: DEFAULT_PUSH_TIMEOUT,
        }
    }
}

/// Runs the real `git` and container command line tools.
#[derive(Debug, Clone)]
pub struct SystemToolchain {
    pub git: String,
    pub container_cli: String,
    pub timeouts: Timeouts,
}

impl Default for SystemToolchain {
    fn default() -> Self {
        Self {
            git: DEFAULT_GIT.to_owned(),
            container_cli: DEFAULT_CONTAINER_CLI.to_owned(),
            timeouts: Timeouts::default(),
        }
    }
}

impl Toolchain for SystemToolchain {
    fn login(&self, host: &str, account: &str, credential: &Secret) -> StepResult {
        docker::login(
            &self.container_cli,
            host,
            account,
            credential,
            self.timeouts.login,
        )
        .into()
    }

    fn clone_repository(&self, location: &str, destination: &Path) -> StepResult {
        git::clone(&self.git, location, destination, self.timeouts.clone).into()
    }

    fn build(&self, image: &str, dockerfile: &Path, context: &Path) -> StepResult {
        docker::build(
            &self.container_cli,
            image,
            dockerfile,
            context,
            self.timeouts.build,
        )
        .into()
    }

    fn push(&self, image: &str) -> StepResult {
        docker::push(&self.container_cli, image, self.timeouts.push).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_prefers_stderr() {
        let result = StepResult::failure(128, "fatal: repository not found\n");
        assert!(!result.is_success());
        assert_eq!(result.detail(), "fatal: repository not found");
    }

    #[test]
    fn detail_falls_back_to_status() {
        assert_eq!(
            StepResult::failure(2, "  ").detail(),
            "exited with non-zero exit code `2`"
        );
        let result = StepResult {
            status: StepStatus::NotRun("`docker` timed out after 5s".to_owned()),
            stdout: String::new(),
            stderr: String::new(),
        };
        assert_eq!(result.detail(), "`docker` timed out after 5s");
    }

    #[test]
    fn detail_uses_the_last_stdout_line_without_stderr() {
        let result = StepResult {
            stdout: "The push refers to repository [ghcr.io/alice/my-app]\ndenied: permission_denied\n\n"
                .to_owned(),
            ..StepResult::failure(1, "")
        };
        assert_eq!(result.detail(), "denied: permission_denied");
    }

    #[test]
    fn missing_tool_becomes_not_run() {
        let toolchain = SystemToolchain {
            container_cli: "dockship-missing-container-cli".to_owned(),
            ..SystemToolchain::default()
        };
        let result = toolchain.push("ghcr.io/alice/my-app");
        assert!(matches!(result.status, StepStatus::NotRun(_)));
        assert!(result.detail().contains("dockship-missing-container-cli"));
    }
}
