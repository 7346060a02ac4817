use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SandboxError;

/// The directory all reads must stay inside. Fixed at construction.
#[derive(Debug, Clone)]
pub struct SandboxRoot {
    path: PathBuf,
}

impl SandboxRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SandboxRoot { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `rel` appended to the configured root, not yet validated.
    pub fn join(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.path.join(rel)
    }

    /// Canonicalizes `requested` (relative paths are taken from the working
    /// directory) and checks that it names a regular file under the
    /// canonicalized root. The root is canonicalized on every call so it may
    /// be created after startup.
    pub fn try_resolve(&self, requested: impl AsRef<Path>) -> Result<PathBuf, SandboxError> {
        let requested = requested.as_ref();
        let path = fs::canonicalize(requested).map_err(|source| SandboxError::Canonicalize {
            path: requested.to_path_buf(),
            source,
        })?;
        let root = fs::canonicalize(&self.path).map_err(|source| SandboxError::RootUnavailable {
            root: self.path.clone(),
            source,
        })?;

        // component-wise, so /srv/www-old is not inside /srv/www
        if !path.starts_with(&root) {
            return Err(SandboxError::OutsideRoot(path));
        }

        let meta = fs::metadata(&path).map_err(|source| SandboxError::Metadata {
            path: path.clone(),
            source,
        })?;
        if !meta.is_file() {
            return Err(SandboxError::NotRegularFile(path));
        }
        Ok(path)
    }

    pub fn resolve(&self, requested: impl AsRef<Path>) -> Option<PathBuf> {
        self.try_resolve(requested).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, SandboxRoot) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("public");
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::write(root.join("index.html"), "<h1>hi</h1>").unwrap();
        fs::write(root.join("docs/a.txt"), "a").unwrap();
        fs::write(dir.path().join("secret.txt"), "top secret").unwrap();
        (dir, SandboxRoot::new(root))
    }

    #[test]
    fn test_resolves_file_inside_root() {
        let (_dir, root) = setup();
        let resolved = root.resolve(root.join("docs/../index.html")).unwrap();
        assert_eq!(resolved, fs::canonicalize(root.join("index.html")).unwrap());
    }

    #[test]
    fn test_rejects_traversal() {
        let (_dir, root) = setup();
        assert!(matches!(
            root.try_resolve(root.join("../secret.txt")),
            Err(SandboxError::OutsideRoot(_))
        ));
        assert!(root.resolve(root.join("../../../../../../etc/passwd")).is_none());
    }

    #[test]
    fn test_rejects_directory_and_missing() {
        let (_dir, root) = setup();
        assert!(matches!(
            root.try_resolve(root.join("docs")),
            Err(SandboxError::NotRegularFile(_))
        ));
        assert!(matches!(
            root.try_resolve(root.path()),
            Err(SandboxError::NotRegularFile(_))
        ));
        assert!(matches!(
            root.try_resolve(root.join("nope.html")),
            Err(SandboxError::Canonicalize { .. })
        ));
    }

    #[test]
    fn test_rejects_sibling_sharing_prefix() {
        let (dir, root) = setup();
        let sibling = dir.path().join("public-old");
        fs::create_dir_all(&sibling).unwrap();
        fs::write(sibling.join("x.txt"), "x").unwrap();
        assert!(root.resolve(sibling.join("x.txt")).is_none());
    }

    #[test]
    fn test_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("f.txt"), "f").unwrap();
        let root = SandboxRoot::new(dir.path().join("absent"));
        assert!(matches!(
            root.try_resolve(dir.path().join("f.txt")),
            Err(SandboxError::RootUnavailable { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escaping_root_is_rejected() {
        let (dir, root) = setup();
        std::os::unix::fs::symlink(dir.path().join("secret.txt"), root.join("link.txt")).unwrap();
        assert!(matches!(
            root.try_resolve(root.join("link.txt")),
            Err(SandboxError::OutsideRoot(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_within_root_is_followed() {
        let (_dir, root) = setup();
        std::os::unix::fs::symlink(root.join("docs/a.txt"), root.join("alias.txt")).unwrap();
        let resolved = root.resolve(root.join("alias.txt")).unwrap();
        assert!(resolved.ends_with("docs/a.txt"));
    }
}
