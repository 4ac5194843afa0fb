use std::{path::Path, time::Duration};

use crate::process;

/// Clones `location` into `destination`, which must be empty. Git is told not to prompt for
/// credentials because nobody is there to answer.
pub fn clone(
    git: &str,
    location: &str,
    destination: &Path,
    timeout: Duration,
) -> process::Result<process::Output> {
    process::command!(git, "clone", "--quiet", "--", location, destination)
        .env("GIT_TERMINAL_PROMPT", "0")
        .capture(None, timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_of_a_missing_repository_fails_with_stderr() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("does-not-exist");
        let destination = root.path().join("clone");
        let Ok(output) = clone(
            "git",
            missing.to_str().unwrap(),
            &destination,
            Duration::from_secs(30),
        ) else {
            // git is not installed in this environment.
            return;
        };
        assert!(!output.status.success());
        assert!(!output.stderr_lossy().trim().is_empty());
    }
}
