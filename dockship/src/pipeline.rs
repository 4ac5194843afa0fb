//! The build pipeline: validate the request, log in to the registry, clone the repository into a
//! transient workspace, build the image and push it. Progress is reported as a sequence of
//! [`Snapshot`]s of an append-only log, one per completed step.

mod steps;

use std::{
    any::Any,
    fmt,
    panic::{self, AssertUnwindSafe},
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

pub use steps::*;

use crate::{
    image_name::{self, InvalidImageName},
    namespace::{self, InvalidNamespace, UnparseableLocation},
    progress::{Log, LogEntry},
    registry::{Registry, ResolvedTarget},
    secret::Secret,
    toolchain::Toolchain,
    workspace::Workspace,
};

/// Everything needed to build and publish one image.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub repository: String,
    pub credential: Secret,
    pub image_name: String,
    pub namespace: Option<String>,
    pub registry: Registry,
    pub dockerfile_subdir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Validating,
    Authenticating,
    Acquiring,
    Cloning,
    Locating,
    Building,
    Publishing,
    CleaningUp,
    Done(Outcome),
}

impl State {
    /// Whether the step for this state invokes an external tool or touches the filesystem.
    const fn has_side_effects(&self) -> bool {
        matches!(
            self,
            State::Authenticating
                | State::Acquiring
                | State::Cloning
                | State::Locating
                | State::Building
                | State::Publishing
        )
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            State::Validating => "validating",
            State::Authenticating => "authenticating",
            State::Acquiring => "acquiring workspace",
            State::Cloning => "cloning",
            State::Locating => "locating Dockerfile",
            State::Building => "building",
            State::Publishing => "publishing",
            State::CleaningUp => "cleaning up",
            State::Done(Outcome::Success) => "done",
            State::Done(Outcome::Failure) => "failed",
        })
    }
}

/// Why a run failed. Every variant is terminal for the run.
#[derive(Debug)]
pub enum Failure {
    InvalidImageName(InvalidImageName),
    UnparseableLocation(UnparseableLocation),
    InvalidNamespace(InvalidNamespace),
    AuthFailed(String),
    CloneFailed(String),
    DescriptorMissing(PathBuf),
    BuildFailed(String),
    PublishFailed(String),
    Interrupted(State),
    Internal(String),
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::InvalidImageName(error) => write!(f, "Invalid image name: {error}"),
            Failure::UnparseableLocation(error) => write!(f, "Invalid repository location: {error}"),
            Failure::InvalidNamespace(error) => write!(f, "Invalid namespace: {error}"),
            Failure::AuthFailed(detail) => write!(f, "Registry login failed: {detail}"),
            Failure::CloneFailed(detail) => write!(f, "Cloning the repository failed: {detail}"),
            Failure::DescriptorMissing(path) => write!(
                f,
                "No build descriptor found at `{path}` in the repository",
                path = path.display()
            ),
            Failure::BuildFailed(detail) => write!(f, "Building the image failed: {detail}"),
            Failure::PublishFailed(detail) => write!(f, "Pushing the image failed: {detail}"),
            Failure::Interrupted(state) => write!(f, "Interrupted while {state}"),
            Failure::Internal(detail) => write!(f, "Internal error: {detail}"),
        }
    }
}

impl Failure {
    /// Replaces the credential in text that came from a tool or a panic. Messages built by the
    /// pipeline itself never contain it.
    fn redacted(self, credential: &Secret) -> Self {
        let secret = credential.expose();
        if secret.is_empty() {
            return self;
        }
        let redact = |detail: String| {
            if detail.contains(secret) {
                detail.replace(secret, "***")
            } else {
                detail
            }
        };
        match self {
            Failure::AuthFailed(detail) => Failure::AuthFailed(redact(detail)),
            Failure::CloneFailed(detail) => Failure::CloneFailed(redact(detail)),
            Failure::BuildFailed(detail) => Failure::BuildFailed(redact(detail)),
            Failure::PublishFailed(detail) => Failure::PublishFailed(redact(detail)),
            Failure::Internal(detail) => Failure::Internal(redact(detail)),
            failure => failure,
        }
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Failure::InvalidImageName(error) => Some(error),
            Failure::UnparseableLocation(error) => Some(error),
            Failure::InvalidNamespace(error) => Some(error),
            _ => None,
        }
    }
}

/// Removing the workspace went wrong. Reported, but does not change the outcome of a run.
#[derive(Debug)]
pub struct TeardownWarning {
    pub path: PathBuf,
    pub error: std::io::Error,
}

impl fmt::Display for TeardownWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Warning: could not remove workspace {path}: {error}",
            path = self.path.display(),
            error = self.error
        )
    }
}

impl std::error::Error for TeardownWarning {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Busy;

impl fmt::Display for Busy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("another build is already running, try again once it has finished")
    }
}

impl std::error::Error for Busy {}

/// The log as it was after a step completed, together with the state the run moved to.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub state: State,
    pub entries: Vec<LogEntry>,
}

impl Snapshot {
    pub fn outcome(&self) -> Option<Outcome> {
        match self.state {
            State::Done(outcome) => Some(outcome),
            _ => None,
        }
    }
}

pub struct Pipeline<T> {
    toolchain: T,
    workspace_root: PathBuf,
    interrupted: Option<Arc<AtomicBool>>,
    running: AtomicBool,
}

impl<T: Toolchain> Pipeline<T> {
    pub fn new(toolchain: T) -> Self {
        Self {
            toolchain,
            workspace_root: std::env::temp_dir(),
            interrupted: None,
            running: AtomicBool::new(false),
        }
    }

    /// Directory under which workspaces are created. Defaults to [`std::env::temp_dir`].
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    /// Once `flag` is set, runs stop before their next step.
    pub fn with_interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupted = Some(flag);
        self
    }

    pub fn toolchain(&self) -> &T {
        &self.toolchain
    }

    /// Starts a run. Nothing happens until the returned iterator is advanced; every call to
    /// [`Iterator::next`] performs one step and yields the log so far. Only one run can be in
    /// flight per pipeline.
    pub fn run(&self, request: BuildRequest) -> Result<Run<'_, T>, Busy> {
        let permit = RunPermit::acquire(&self.running).ok_or(Busy)?;
        Ok(Run {
            pipeline: self,
            _permit: permit,
            request,
            state: State::Validating,
            log: Log::new(),
            target: None,
            workspace: None,
            build_context: None,
            failure: None,
            finished: false,
        })
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

struct RunPermit<'a>(&'a AtomicBool);

impl<'a> RunPermit<'a> {
    fn acquire(running: &'a AtomicBool) -> Option<Self> {
        running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(running))
    }
}

impl Drop for RunPermit<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "a step panicked".to_owned()
    }
}

fn missing(what: &str) -> Failure {
    Failure::Internal(format!("{what} is not available in this state"))
}

/// One execution of the pipeline. Dropping a run before it is done still removes its workspace.
pub struct Run<'a, T> {
    pipeline: &'a Pipeline<T>,
    _permit: RunPermit<'a>,
    request: BuildRequest,
    state: State,
    log: Log,
    target: Option<ResolvedTarget>,
    workspace: Option<Workspace>,
    build_context: Option<BuildContext>,
    failure: Option<Failure>,
    finished: bool,
}

impl<T: Toolchain> Run<'_, T> {
    pub fn state(&self) -> State {
        self.state
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state,
            entries: self.log.entries().to_vec(),
        }
    }

    fn info(&mut self, message: String) {
        self.log.info(message);
    }

    fn success(&mut self, message: String) {
        self.log.success(message);
    }

    fn step(&mut self, state: State) -> State {
        if state.has_side_effects() && self.pipeline.is_interrupted() {
            return self.fail(Failure::Interrupted(state));
        }

        let result = match state {
            State::Validating => self.validate(),
            State::Authenticating => self.authenticate(),
            State::Acquiring => self.acquire(),
            State::Cloning => self.clone_repository(),
            State::Locating => self.locate_descriptor(),
            State::Building => self.build(),
            State::Publishing => self.publish(),
            State::CleaningUp => return self.clean_up(),
            State::Done(outcome) => return State::Done(outcome),
        };

        match result {
            Ok(next) => next,
            Err(failure) => self.fail(failure),
        }
    }

    fn fail(&mut self, failure: Failure) -> State {
        let failure =
            if self.pipeline.is_interrupted() && !matches!(failure, Failure::Interrupted(_)) {
                Failure::Interrupted(self.state)
            } else {
                failure
            };
        log::debug!("run failed while {state}", state = self.state);
        self.record(failure);
        State::CleaningUp
    }

    /// Keeps the first failure of the run, with the credential scrubbed from its detail.
    fn record(&mut self, failure: Failure) {
        if self.failure.is_none() {
            self.failure = Some(failure.redacted(&self.request.credential));
        }
    }

    fn validate(&mut self) -> Result<State, Failure> {
        self.info(format!(
            "Validating image name {name:?}",
            name = self.request.image_name
        ));
        image_name::validate(&self.request.image_name).map_err(Failure::InvalidImageName)?;

        let account = namespace::resolve_namespace(
            &self.request.repository,
            self.request.namespace.as_deref(),
        )
        .map_err(Failure::UnparseableLocation)?;
        namespace::validate_namespace(&account).map_err(Failure::InvalidNamespace)?;

        let target = ResolvedTarget::new(self.request.registry, &account, &self.request.image_name);
        self.info(format!(
            "Image will be published to {registry} as {reference}",
            registry = target.registry,
            reference = target.reference
        ));
        self.target = Some(target);
        Ok(State::Authenticating)
    }

    fn authenticate(&mut self) -> Result<State, Failure> {
        let target = self.target.clone().ok_or_else(|| missing("the target"))?;
        self.info(format!(
            "Logging in to {host} as {account}",
            host = target.host,
            account = target.account
        ));
        steps::authenticate(
            &self.pipeline.toolchain,
            &target,
            &self.request.credential,
        )?;
        self.success(format!("Logged in to {host}", host = target.host));
        Ok(State::Acquiring)
    }

    fn acquire(&mut self) -> Result<State, Failure> {
        let root = &self.pipeline.workspace_root;
        let workspace = Workspace::acquire(root).map_err(|error| {
            Failure::Internal(format!(
                "could not create a workspace in {root}: {error}",
                root = root.display()
            ))
        })?;
        self.info(format!(
            "Created workspace {path}",
            path = workspace.path().display()
        ));
        self.workspace = Some(workspace);
        Ok(State::Cloning)
    }

    fn clone_repository(&mut self) -> Result<State, Failure> {
        self.info(format!(
            "Cloning {location}",
            location = namespace::display_location(&self.request.repository)
        ));
        let workspace = self.workspace.as_ref().ok_or_else(|| missing("the workspace"))?;
        steps::populate(&self.pipeline.toolchain, workspace, &self.request.repository)?;
        self.success("Cloned repository".to_owned());
        Ok(State::Locating)
    }

    fn locate_descriptor(&mut self) -> Result<State, Failure> {
        let workspace = self.workspace.as_ref().ok_or_else(|| missing("the workspace"))?;
        let build_context =
            steps::locate_descriptor(workspace, self.request.dockerfile_subdir.as_deref())?;
        let relative = build_context
            .dockerfile
            .strip_prefix(workspace.path())
            .unwrap_or(&build_context.dockerfile)
            .to_owned();
        self.info(format!("Found {path}", path = relative.display()));
        self.build_context = Some(build_context);
        Ok(State::Building)
    }

    fn build(&mut self) -> Result<State, Failure> {
        let target = self.target.clone().ok_or_else(|| missing("the target"))?;
        self.info(format!(
            "Building image {reference}",
            reference = target.reference
        ));
        let build_context = self
            .build_context
            .as_ref()
            .ok_or_else(|| missing("the build context"))?;
        steps::build(&self.pipeline.toolchain, &target.reference, build_context)?;
        self.success(format!("Built image {reference}", reference = target.reference));
        Ok(State::Publishing)
    }

    fn publish(&mut self) -> Result<State, Failure> {
        let target = self.target.clone().ok_or_else(|| missing("the target"))?;
        self.info(format!(
            "Pushing image {reference}",
            reference = target.reference
        ));
        steps::publish(&self.pipeline.toolchain, &target.reference)?;
        Ok(State::CleaningUp)
    }

    /// Releases the workspace, if one was acquired, and appends the final entry of the run.
    fn clean_up(&mut self) -> State {
        let released = self
            .workspace
            .as_mut()
            .map(|workspace| (workspace.path().to_owned(), workspace.release()));
        match released {
            Some((_, Ok(()))) => self.info("Removed workspace".to_owned()),
            Some((path, Err(error))) => {
                let warning = TeardownWarning { path, error };
                log::warn!("{warning}");
                self.info(warning.to_string());
            }
            None => {}
        }

        self.finish()
    }

    fn finish(&mut self) -> State {
        match self.failure.as_ref().map(ToString::to_string) {
            None => {
                let reference = self
                    .target
                    .as_ref()
                    .map(|target| target.reference.clone())
                    .unwrap_or_default();
                self.success(format!("Successfully pushed {reference}"));
                State::Done(Outcome::Success)
            }
            Some(message) => {
                self.log.error(message);
                State::Done(Outcome::Failure)
            }
        }
    }
}

impl<T: Toolchain> Iterator for Run<'_, T> {
    type Item = Snapshot;

    fn next(&mut self) -> Option<Snapshot> {
        if self.finished {
            return None;
        }

        let state = self.state;
        let next = match panic::catch_unwind(AssertUnwindSafe(|| self.step(state))) {
            Ok(next) => next,
            Err(payload) => {
                let failure = Failure::Internal(panic_message(&*payload));
                if state == State::CleaningUp {
                    self.record(failure);
                    self.finish()
                } else {
                    self.fail(failure)
                }
            }
        };

        self.state = next;
        self.finished = matches!(next, State::Done(_));
        Some(self.snapshot())
    }
}
