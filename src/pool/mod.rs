//! Image pool sources.
//!
//! A pool source lists the candidate image ids and materializes one as a
//! local file for delivery. Local folders return their paths directly;
//! remote folders download into a cache directory and flag the copy
//! temporary so the dispatcher can remove it after a successful send.

pub mod local;
pub mod remote;

use crate::config::{SourceConfig, SourceKind};
use crate::error::{DripError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// A locally materialized image ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    /// Local filesystem path of the image bytes.
    pub path: PathBuf,
    /// Whether the file is a temporary copy owned by the dispatch cycle.
    pub temporary: bool,
}

/// Pool source contract. New sources only need to implement this trait.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Stable source identifier (e.g. `local`, `remote`).
    fn id(&self) -> &'static str;

    /// List the current pool of image ids. Called fresh per dispatch cycle.
    async fn list(&self) -> anyhow::Result<Vec<String>>;

    /// Materialize `id` as a local file.
    async fn fetch(&self, id: &str) -> anyhow::Result<FetchedImage>;
}

/// Build the configured pool source.
pub fn source_from_config(config: &SourceConfig) -> Result<Arc<dyn ImageSource>> {
    match config.kind {
        SourceKind::Local => {
            let root = config.local_path.clone().ok_or_else(|| {
                DripError::Config("source.local_path is required for a local source".to_owned())
            })?;
            Ok(Arc::new(local::LocalFolderSource::new(
                root,
                config.extensions.clone(),
            )))
        }
        SourceKind::Remote => {
            let folder_id = config.folder_id.clone().ok_or_else(|| {
                DripError::Config("source.folder_id is required for a remote source".to_owned())
            })?;
            let api_key = config.api_key.clone().ok_or_else(|| {
                DripError::Config("source.api_key is required for a remote source".to_owned())
            })?;
            Ok(Arc::new(remote::RemoteFolderSource::new(
                config.api_base.clone(),
                folder_id,
                api_key,
                config.cache_dir.clone(),
                config.extensions.clone(),
            )))
        }
    }
}
