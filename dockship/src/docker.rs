//! Thin wrappers around the container command line (`docker` or a compatible tool such as
//! `podman`).

use std::{path::Path, time::Duration};

use crate::{process, secret::Secret};

/// Runs `<cli> login <host> --username <account> --password-stdin`. The credential is only ever
/// written to the child's stdin.
pub fn login(
    cli: &str,
    host: &str,
    account: &str,
    credential: &Secret,
    timeout: Duration,
) -> process::Result<process::Output> {
    let mut input = credential.expose().as_bytes().to_vec();
    input.push(b'\n');
    process::command!(cli, "login", host, "--username", account, "--password-stdin")
        .capture(Some(input), timeout)
}

/// Runs `<cli> build --tag <image> --file <dockerfile> <context>`.
pub fn build(
    cli: &str,
    image: &str,
    dockerfile: &Path,
    context: &Path,
    timeout: Duration,
) -> process::Result<process::Output> {
    process::command!(cli, "build", "--tag", image, "--file", dockerfile, context)
        .capture(None, timeout)
}

/// Runs `<cli> push <image>`.
pub fn push(cli: &str, image: &str, timeout: Duration) -> process::Result<process::Output> {
    process::command!(cli, "push", image).capture(None, timeout)
}

#[cfg(all(test, unix))]
mod tests {
    use std::{fs, os::unix::fs::PermissionsExt};

    use super::*;

    /// Writes an executable script that records its arguments and stdin next to itself.
    fn fake_cli(dir: &Path) -> String {
        let path = dir.join("fake-cli");
        fs::write(
            &path,
            "#!/bin/sh\necho \"$@\" > \"$0.args\"\ncat > \"$0.stdin\"\n",
        )
        .unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_str().unwrap().to_owned()
    }

    #[test]
    fn login_passes_credential_on_stdin_only() {
        let dir = tempfile::tempdir().unwrap();
        let cli = fake_cli(dir.path());
        let output = login(
            &cli,
            "ghcr.io",
            "alice",
            &Secret::new("tok123"),
            Duration::from_secs(10),
        )
        .unwrap();
        assert!(output.status.success());

        let args = fs::read_to_string(format!("{cli}.args")).unwrap();
        assert_eq!(args.trim(), "login ghcr.io --username alice --password-stdin");
        let stdin = fs::read_to_string(format!("{cli}.stdin")).unwrap();
        assert_eq!(stdin, "tok123\n");
        assert!(!format!("{:?}", output.command).contains("tok123"));
    }

    #[test]
    fn build_passes_dockerfile_and_context() {
        let dir = tempfile::tempdir().unwrap();
        let cli = fake_cli(dir.path());
        build(
            &cli,
            "ghcr.io/alice/my-app",
            Path::new("/w/backend/Dockerfile"),
            Path::new("/w/backend"),
            Duration::from_secs(10),
        )
        .unwrap();
        let args = fs::read_to_string(format!("{cli}.args")).unwrap();
        assert_eq!(
            args.trim(),
            "build --tag ghcr.io/alice/my-app --file /w/backend/Dockerfile /w/backend"
        );
    }
}
