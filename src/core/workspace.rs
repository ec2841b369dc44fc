use crate::domain::model::LayerId;
use crate::utils::error::{DiffError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Scratch directory tree for one diff run.
///
/// `open` is destructive on purpose: whatever lives at `root` (typically the
/// leftovers of a crashed run) is removed before the fresh tree is created.
/// The tree is removed again by `close`, or by `Drop` when a run unwinds
/// before reaching `close`. Two concurrent runs must not share a root.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    closed: bool,
}

impl Workspace {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        if root.exists() {
            tracing::warn!("🧹 Removing stale workspace at {}", root.display());
            remove_tree(&root)?;
        }

        for dir in [root.clone(), root.join("old"), root.join("new"), root.join("images")] {
            fs::create_dir_all(&dir).map_err(|source| DiffError::Workspace { path: dir, source })?;
        }

        tracing::debug!("Workspace ready at {}", root.display());
        Ok(Self {
            root,
            closed: false,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn old_dir(&self) -> PathBuf {
        self.root.join("old")
    }

    pub fn new_dir(&self) -> PathBuf {
        self.root.join("new")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    /// `001-GTL`. Identifiers such as `G$1` and `G_1` sanitize to the same
    /// stem, the page number keeps their files apart.
    pub fn page_stem(page: usize, layer: &LayerId) -> String {
        format!("{:03}-{}", page, layer.file_stem())
    }

    pub fn image_path(&self, page: usize, layer: &LayerId) -> PathBuf {
        self.images_dir()
            .join(format!("{}.png", Self::page_stem(page, layer)))
    }

    /// gerbv 專案描述檔位置
    pub fn descriptor_path(&self, page: usize, layer: &LayerId) -> PathBuf {
        self.root.join(format!("{}.gvp", Self::page_stem(page, layer)))
    }

    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        remove_tree(&self.root)?;
        tracing::debug!("Workspace {} removed", self.root.display());
        Ok(())
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = remove_tree(&self.root) {
            tracing::warn!("⚠️ Failed to remove workspace {}: {}", self.root.display(), e);
        }
    }
}

fn remove_tree(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(DiffError::Workspace {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_layout() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("ws");

        let workspace = Workspace::open(&root).unwrap();

        assert!(workspace.old_dir().is_dir());
        assert!(workspace.new_dir().is_dir());
        assert!(workspace.images_dir().is_dir());
        assert_eq!(
            workspace.image_path(1, &LayerId::from("GTL")),
            root.join("images").join("001-GTL.png")
        );
        assert_eq!(
            workspace.descriptor_path(1, &LayerId::from("GTL")),
            root.join("001-GTL.gvp")
        );
        workspace.close().unwrap();
    }

    #[test]
    fn test_layers_with_same_sanitized_stem_get_distinct_files() {
        let temp_dir = TempDir::new().unwrap();
        let workspace = Workspace::open(temp_dir.path().join("ws")).unwrap();
        let dollar = LayerId::from("G$1");
        let underscore = LayerId::from("G_1");
        assert_eq!(dollar.file_stem(), underscore.file_stem());

        assert_ne!(workspace.image_path(1, &dollar), workspace.image_path(2, &underscore));
        assert_ne!(
            workspace.descriptor_path(1, &dollar),
            workspace.descriptor_path(2, &underscore)
        );
        workspace.close().unwrap();
    }

    #[test]
    fn test_open_clobbers_stale_tree() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("ws");
        fs::create_dir_all(root.join("images")).unwrap();
        fs::write(root.join("images").join("stale.png"), b"old").unwrap();
        fs::write(root.join("leftover.gvp"), b"old").unwrap();

        let workspace = Workspace::open(&root).unwrap();

        assert!(!root.join("images").join("stale.png").exists());
        assert!(!root.join("leftover.gvp").exists());
        assert!(workspace.images_dir().is_dir());
        workspace.close().unwrap();
    }

    #[test]
    fn test_close_removes_tree() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("ws");

        let workspace = Workspace::open(&root).unwrap();
        fs::write(workspace.images_dir().join("GTL.png"), b"png").unwrap();
        workspace.close().unwrap();

        assert!(!root.exists());
    }

    #[test]
    fn test_drop_removes_tree_without_close() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("ws");

        {
            let _workspace = Workspace::open(&root).unwrap();
            assert!(root.exists());
        }

        assert!(!root.exists());
    }
}
