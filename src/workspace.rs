use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::{Builder, TempDir};
use tracing::info;

use crate::error::BatchError;

/// Scratch directory owned by a single run. Removed when closed or dropped, unless
/// explicitly kept.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    path: Utf8PathBuf,
}

impl Workspace {
    /// Creates `<root>/<32 random alphanumerics>`. The root is created if needed and
    /// canonicalized so links pointing into the workspace are absolute.
    pub fn create(root: &Utf8Path) -> Result<Self, BatchError> {
        fs::create_dir_all(root.as_std_path()).map_err(|err| {
            BatchError::Filesystem(format!("create scratch root {root}: {err}"))
        })?;
        let root = fs::canonicalize(root.as_std_path())
            .map_err(|err| BatchError::Filesystem(format!("resolve {root}: {err}")))?;
        let dir = Builder::new()
            .prefix("")
            .rand_bytes(32)
            .tempdir_in(&root)
            .map_err(|err| BatchError::Filesystem(format!("create workspace: {err}")))?;
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .map_err(|_| BatchError::Filesystem("non-utf8 workspace path".to_string()))?;
        info!("Using temporary folder {path}");
        Ok(Self { dir, path })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn join(&self, name: &str) -> Utf8PathBuf {
        self.path.join(name)
    }

    pub fn contains(&self, path: &Utf8Path) -> bool {
        path.starts_with(&self.path)
    }

    pub fn close(self) -> Result<(), BatchError> {
        info!("Deleting temporary folder {}", self.path);
        let path = self.path;
        self.dir
            .close()
            .map_err(|err| BatchError::Filesystem(format!("remove workspace {path}: {err}")))
    }

    /// Leaves the directory on disk and returns its path.
    pub fn keep(self) -> Utf8PathBuf {
        info!("Keeping temporary folder {}", self.path);
        let _ = self.dir.keep();
        self.path
    }
}
