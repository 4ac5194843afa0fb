use std::{env, fs, path::PathBuf};

/// Runs git and returns its stdout, or `None` when git is missing or the source tree is not a
/// repository (e.g. a packaged crate).
fn git<'a, I: IntoIterator<Item = &'a str>>(args: I) -> Option<Vec<u8>> {
    let output = std::process::Command::new("git").args(args).output().ok()?;
    output.status.success().then_some(output.stdout)
}

fn git_commit_hash() -> Option<String> {
    let stdout = git(["rev-parse", "--short", "HEAD"])?;
    let hash = String::from_utf8(stdout).ok()?;
    let hash = hash.trim();
    (!hash.is_empty()).then(|| hash.to_owned())
}

fn git_is_clean() -> bool {
    git(["status", "--porcelain"])
        .map(|stdout| stdout.is_empty())
        .unwrap_or(true)
}

fn main() {
    let doing_release = option_env!("DOCKSHIP_RELEASE")
        .map(|env| matches!(env, "1" | "true"))
        .unwrap_or_default();

    let mut version = env!("CARGO_PKG_VERSION").to_owned();
    if !doing_release {
        if let Some(hash) = git_commit_hash() {
            version.push('+');
            version.push_str(&hash);
            if !git_is_clean() {
                version.push_str(".dirty");
            }
        }
    }

    let out_dir = PathBuf::from(env::var_os("OUT_DIR").expect("cargo sets OUT_DIR"));
    fs::write(
        out_dir.join("version.rs"),
        format!("pub const VERSION: &str = {version:?};"),
    )
    .expect("failed to write version.rs");
}
