//! Local folder pool source.

use super::{FetchedImage, ImageSource};
use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Pool source that lists image files straight from a folder on disk.
///
/// Pool ids are the full file paths, so a delivery needs no further fetch
/// step beyond checking the file is still there.
pub struct LocalFolderSource {
    root: PathBuf,
    extensions: Vec<String>,
}

impl LocalFolderSource {
    /// Create a source over `root`, keeping files whose extension is in
    /// `extensions` (lowercase, no leading dot).
    pub fn new(root: PathBuf, extensions: Vec<String>) -> Self {
        Self { root, extensions }
    }

    fn is_image(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|allowed| *allowed == ext)
            })
    }
}

#[async_trait]
impl ImageSource for LocalFolderSource {
    fn id(&self) -> &'static str {
        "local"
    }

    async fn list(&self) -> anyhow::Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.root)
            .with_context(|| format!("cannot read image folder '{}'", self.root.display()))?;

        let mut images = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() && self.is_image(&path) {
                images.push(path.to_string_lossy().into_owned());
            }
        }
        Ok(images)
    }

    async fn fetch(&self, id: &str) -> anyhow::Result<FetchedImage> {
        let path = PathBuf::from(id);
        if !path.is_file() {
            anyhow::bail!("image '{id}' is not a readable file");
        }
        Ok(FetchedImage {
            path,
            temporary: false,
        })
    }
}
