use std::{
    io::{self, BufRead, IsTerminal},
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use clap::Args;
use constcat::concat;
use log::debug;

use super::render::{OutputFormat, Renderer};
use crate::{
    image_name, namespace,
    pipeline::{BuildRequest, Outcome, Pipeline},
    registry::Registry,
    secret::Secret,
    toolchain::{self, SystemToolchain, Timeouts},
    Result,
};

pub const TOKEN_ENV: &str = "DOCKSHIP_TOKEN";

#[derive(Debug, Args)]
pub struct BuildArgs {
    /// The repository to clone, e.g. `https://github.com/alice/app.git` or
    /// `git@github.com:alice/app.git`.
    pub repository: String,

    /// Name of the image, made of lowercase letters, digits, '.', '-' and '_', starting and ending
    /// with a letter or digit. Derived from the repository name when omitted.
    #[arg(long = "image-name")]
    pub image_name: Option<String>,

    /// The registry account or organization to push to. Defaults to the account that owns the
    /// repository.
    #[arg(long = "namespace")]
    pub namespace: Option<String>,

    #[arg(long = "registry", value_enum, default_value_t)]
    pub registry: Registry,

    /// Directory inside the repository that contains the Dockerfile. It is also used as the build
    /// context.
    #[arg(long = "dockerfile-subdir")]
    pub dockerfile_subdir: Option<PathBuf>,

    #[arg(long = "token-stdin", help = concat!("Read the registry token from the first line of stdin instead of the `", TOKEN_ENV, "` environment variable."))]
    pub token_stdin: bool,

    /// The container command line tool used to log in, build and push.
    #[arg(long = "container-cli", default_value = toolchain::DEFAULT_CONTAINER_CLI)]
    pub container_cli: String,

    #[arg(long = "git", default_value = toolchain::DEFAULT_GIT)]
    pub git: String,

    /// Seconds to wait for the registry login.
    #[arg(long = "login-timeout", default_value_t = toolchain::DEFAULT_LOGIN_TIMEOUT.as_secs(), value_parser = clap::value_parser!(u64).range(1..))]
    pub login_timeout: u64,

    /// Seconds to wait for the clone.
    #[arg(long = "clone-timeout", default_value_t = toolchain::DEFAULT_CLONE_TIMEOUT.as_secs(), value_parser = clap::value_parser!(u64).range(1..))]
    pub clone_timeout: u64,

    /// Seconds to wait for the image build.
    #[arg(long = "build-timeout", default_value_t = toolchain::DEFAULT_BUILD_TIMEOUT.as_secs(), value_parser = clap::value_parser!(u64).range(1..))]
    pub build_timeout: u64,

    /// Seconds to wait for the push.
    #[arg(long = "push-timeout", default_value_t = toolchain::DEFAULT_PUSH_TIMEOUT.as_secs(), value_parser = clap::value_parser!(u64).range(1..))]
    pub push_timeout: u64,

    #[arg(long = "output", value_enum, default_value_t)]
    pub output: OutputFormat,
}

fn read_token(token_stdin: bool) -> Result<Secret> {
    let token = if token_stdin {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        line.trim_end_matches(['\r', '\n']).to_owned()
    } else {
        std::env::var(TOKEN_ENV).map_err(|_| {
            format!("the `{TOKEN_ENV}` environment variable is not set, set it or pass `--token-stdin`")
        })?
    };
    Ok(Secret::new(token))
}

/// Picks the explicit image name or derives one from the repository name.
fn resolve_image_name(explicit: Option<String>, repository: &str) -> Result<String> {
    if let Some(name) = explicit {
        return Ok(name);
    }
    let location = namespace::parse_location(repository)?;
    let name = image_name::to_image_name_lossy(location.repository)
        .ok_or_else(|| {
            format!(
                "can not derive an image name from repository {name:?}, please pass `--image-name`",
                name = location.repository
            )
        })?
        .into_owned();
    debug!("derived image name {name:?} from {repository:?}", repository = location.repository);
    Ok(name)
}

pub fn build(args: BuildArgs) -> Result<()> {
    let BuildArgs {
        repository,
        image_name: explicit_image_name,
        namespace,
        registry,
        dockerfile_subdir,
        token_stdin,
        container_cli,
        git,
        login_timeout,
        clone_timeout,
        build_timeout,
        push_timeout,
        output,
    } = args;

    let credential = read_token(token_stdin)?;
    let image_name = resolve_image_name(explicit_image_name, &repository)?;

    // Child processes receive the signal too and fail, which lets the run clean up after itself.
    let interrupted = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler({
        let interrupted = Arc::clone(&interrupted);
        move || interrupted.store(true, Ordering::SeqCst)
    })
    .map_err(|error| format!("failed to install the Ctrl-C handler: {error}"))?;

    let toolchain = SystemToolchain {
        git,
        container_cli,
        timeouts: Timeouts {
            login: Duration::from_secs(login_timeout),
            clone: Duration::from_secs(clone_timeout),
            build: Duration::from_secs(build_timeout),
            push: Duration::from_secs(push_timeout),
        },
    };
    let pipeline = Pipeline::new(toolchain).with_interrupt_flag(interrupted);

    let request = BuildRequest {
        repository,
        credential,
        image_name,
        namespace,
        registry,
        dockerfile_subdir,
    };

    let stdout = io::stdout();
    let color = stdout.is_terminal();
    let mut renderer = Renderer::new(stdout.lock(), output, color);

    let mut outcome = None;
    for snapshot in pipeline.run(request)? {
        renderer.render(&snapshot)?;
        outcome = snapshot.outcome();
    }

    match outcome {
        Some(Outcome::Success) => Ok(()),
        _ => Err("the image was not published".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_image_name_is_used_verbatim() {
        assert_eq!(
            resolve_image_name(Some("My App".to_owned()), "https://github.com/alice/app.git").unwrap(),
            "My App"
        );
    }

    #[test]
    fn image_name_is_derived_from_the_repository() {
        assert_eq!(
            resolve_image_name(None, "https://github.com/alice/My_Service.git").unwrap(),
            "my_service"
        );
        assert_eq!(
            resolve_image_name(None, "git@github.com:alice/app.git").unwrap(),
            "app"
        );
        assert!(resolve_image_name(None, "https://github.com/alice/x.git").is_err());
        assert!(resolve_image_name(None, "garbage").is_err());
    }
}
