use std::{
    fmt, io,
    path::{Component, Path, PathBuf},
};

use log::{debug, warn};

const PREFIX: &str = "dockship-";
const LEN: usize = 16;
const MAX_ATTEMPTS: usize = 8;

fn random_dir_name() -> String {
    use rand::distributions::{Alphanumeric, DistString};

    let mut name = String::with_capacity(PREFIX.len() + LEN);
    name.push_str(PREFIX);
    Alphanumeric.append_string(&mut rand::thread_rng(), &mut name, LEN);
    name
}

/// A transient directory that is owned by exactly one pipeline run. The directory is removed by
/// [`Workspace::release`] or, if that never happened, when the value is dropped.
pub struct Workspace {
    path: PathBuf,
    released: bool,
}

impl fmt::Debug for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workspace")
            .field("path", &self.path)
            .field("released", &self.released)
            .finish()
    }
}

impl Workspace {
    /// Creates a fresh, uniquely named directory under `root`. Creation fails instead of reusing a
    /// directory that already exists.
    pub fn acquire(root: &Path) -> io::Result<Self> {
        let mut attempts = 0;
        loop {
            let path = root.join(random_dir_name());
            match std::fs::create_dir(&path) {
                Ok(()) => {
                    debug!("acquired workspace {path:?}");
                    return Ok(Self {
                        path,
                        released: false,
                    });
                }
                Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
                    attempts += 1;
                    if attempts == MAX_ATTEMPTS {
                        return Err(error);
                    }
                }
                Err(error) => return Err(error),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Resolves a path relative to the workspace. Returns `None` for absolute paths or paths that
    /// climb out of the workspace through `..`.
    pub fn join_relative(&self, relative: &Path) -> Option<PathBuf> {
        let mut out = self.path.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => out.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        Some(out)
    }

    /// Removes the directory tree. Only the first call does any work, later calls return `Ok`.
    pub fn release(&mut self) -> io::Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {
                debug!("released workspace {path:?}", path = self.path);
                Ok(())
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(error) = self.release() {
            warn!(
                "failed to remove workspace {path:?}: {error}",
                path = self.path
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_creates_unique_directories() {
        let root = tempfile::tempdir().unwrap();
        let a = Workspace::acquire(root.path()).unwrap();
        let b = Workspace::acquire(root.path()).unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().is_dir());
        assert!(b.path().is_dir());
        assert!(a
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(PREFIX));
    }

    #[test]
    fn release_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let mut workspace = Workspace::acquire(root.path()).unwrap();
        std::fs::create_dir_all(workspace.path().join("nested/deeper")).unwrap();
        std::fs::write(workspace.path().join("nested/deeper/file"), "x").unwrap();

        workspace.release().unwrap();
        assert!(workspace.is_released());
        assert!(!workspace.path().exists());
        workspace.release().unwrap();
    }

    #[test]
    fn drop_removes_the_directory() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let workspace = Workspace::acquire(root.path()).unwrap();
            workspace.path().to_owned()
        };
        assert!(!path.exists());
    }

    #[test]
    fn join_relative_stays_inside() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::acquire(root.path()).unwrap();
        assert_eq!(
            workspace.join_relative(Path::new("backend/./api")),
            Some(workspace.path().join("backend").join("api"))
        );
        assert_eq!(
            workspace.join_relative(Path::new("")),
            Some(workspace.path().to_owned())
        );
        assert_eq!(workspace.join_relative(Path::new("../escape")), None);
        assert_eq!(workspace.join_relative(Path::new("/etc")), None);
    }
}
