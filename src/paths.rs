use std::path::{Path, PathBuf};

/// Filesystem layout of the hosting environment.
///
/// Everything lives under a single data root: per-instance directories under
/// `servers/<id>/` and launch-core definitions under `cores/<name>/` with
/// their copyable file tree in `cores/<name>/files/`.
#[derive(Debug, Clone)]
pub struct DataDirs {
    root: PathBuf,
}

impl DataDirs {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn servers(&self) -> PathBuf {
        self.root.join("servers")
    }

    pub fn server(&self, id: i64) -> PathBuf {
        self.servers().join(id.to_string())
    }

    pub fn cores(&self) -> PathBuf {
        self.root.join("cores")
    }

    pub fn core(&self, name: &str) -> PathBuf {
        self.cores().join(name)
    }

    pub fn core_files(&self, name: &str) -> PathBuf {
        self.core(name).join("files")
    }
}
