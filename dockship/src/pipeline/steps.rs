use std::path::{Path, PathBuf};

use super::Failure;
use crate::{
    registry::ResolvedTarget,
    secret::Secret,
    toolchain::{StepResult, Toolchain},
    workspace::Workspace,
};

pub const DOCKERFILE: &str = "Dockerfile";

/// Paths handed to the image build tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    pub dockerfile: PathBuf,
    pub context: PathBuf,
}

fn require_success(result: StepResult, failure: fn(String) -> Failure) -> Result<(), Failure> {
    if result.is_success() {
        Ok(())
    } else {
        Err(failure(result.detail()))
    }
}

pub fn authenticate(
    toolchain: &impl Toolchain,
    target: &ResolvedTarget,
    credential: &Secret,
) -> Result<(), Failure> {
    if credential.is_empty() {
        return Err(Failure::AuthFailed(
            "no registry credential was provided".to_owned(),
        ));
    }
    require_success(
        toolchain.login(target.host, &target.account, credential),
        Failure::AuthFailed,
    )
}

pub fn populate(
    toolchain: &impl Toolchain,
    workspace: &Workspace,
    location: &str,
) -> Result<(), Failure> {
    require_success(
        toolchain.clone_repository(location, workspace.path()),
        Failure::CloneFailed,
    )
}

/// Looks for `{workspace}/{subdir}/Dockerfile`. A subdirectory that points outside of the
/// workspace is treated like a missing descriptor.
pub fn locate_descriptor(
    workspace: &Workspace,
    subdir: Option<&Path>,
) -> Result<BuildContext, Failure> {
    let subdir = subdir.unwrap_or(Path::new(""));
    let missing = || Failure::DescriptorMissing(subdir.join(DOCKERFILE));

    let context = workspace.join_relative(subdir).ok_or_else(missing)?;
    let dockerfile = context.join(DOCKERFILE);
    if !dockerfile.is_file() {
        return Err(missing());
    }

    Ok(BuildContext {
        dockerfile,
        context,
    })
}

pub fn build(
    toolchain: &impl Toolchain,
    image: &str,
    context: &BuildContext,
) -> Result<(), Failure> {
    require_success(
        toolchain.build(image, &context.dockerfile, &context.context),
        Failure::BuildFailed,
    )
}

pub fn publish(toolchain: &impl Toolchain, image: &str) -> Result<(), Failure> {
    require_success(toolchain.push(image), Failure::PublishFailed)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn locate_descriptor_in_root_and_subdir() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::acquire(root.path()).unwrap();
        fs::write(workspace.path().join(DOCKERFILE), "FROM scratch\n").unwrap();
        fs::create_dir(workspace.path().join("backend")).unwrap();
        fs::write(workspace.path().join("backend").join(DOCKERFILE), "FROM scratch\n").unwrap();

        let found = locate_descriptor(&workspace, None).unwrap();
        assert_eq!(found.context, workspace.path());
        assert_eq!(found.dockerfile, workspace.path().join(DOCKERFILE));

        let found = locate_descriptor(&workspace, Some(Path::new("backend"))).unwrap();
        assert_eq!(found.context, workspace.path().join("backend"));
        assert_eq!(
            found.dockerfile,
            workspace.path().join("backend").join(DOCKERFILE)
        );
    }

    #[test]
    fn locate_descriptor_reports_missing() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::acquire(root.path()).unwrap();
        fs::write(workspace.path().join(DOCKERFILE), "FROM scratch\n").unwrap();

        let Err(Failure::DescriptorMissing(path)) =
            locate_descriptor(&workspace, Some(Path::new("backend")))
        else {
            panic!("expected a missing descriptor");
        };
        assert_eq!(path, Path::new("backend").join(DOCKERFILE));

        assert!(matches!(
            locate_descriptor(&workspace, Some(Path::new("../.."))),
            Err(Failure::DescriptorMissing(_))
        ));
    }

    #[test]
    fn a_directory_named_dockerfile_is_not_a_descriptor() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::acquire(root.path()).unwrap();
        fs::create_dir(workspace.path().join(DOCKERFILE)).unwrap();
        assert!(locate_descriptor(&workspace, None).is_err());
    }
}
