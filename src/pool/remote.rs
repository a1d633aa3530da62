//! Remote folder pool source (Drive-style REST API).
//!
//! Lists image files inside a single remote folder and downloads them on
//! demand into a local cache directory. Listing and download follow the
//! Drive v3 shapes: a `files` query filtered by parent folder, and an
//! `alt=media` content download.

use super::{FetchedImage, ImageSource};
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteFile>,
}

#[derive(Debug, Deserialize)]
struct RemoteFile {
    id: String,
    name: String,
}

/// Pool source backed by a remote folder service.
///
/// Pool ids are file names, unique within the folder; the backend file id
/// is resolved per fetch so nothing is cached across dispatch cycles.
pub struct RemoteFolderSource {
    api_base: String,
    folder_id: String,
    api_key: String,
    cache_dir: PathBuf,
    extensions: Vec<String>,
    client: reqwest::Client,
}

impl RemoteFolderSource {
    /// Create a source over one remote folder. `api_base` is injectable so
    /// tests can point it at a mock server.
    pub fn new(
        api_base: String,
        folder_id: String,
        api_key: String,
        cache_dir: PathBuf,
        extensions: Vec<String>,
    ) -> Self {
        Self {
            api_base,
            folder_id,
            api_key,
            cache_dir,
            extensions,
            client: reqwest::Client::new(),
        }
    }

    fn is_image(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        self.extensions
            .iter()
            .any(|ext| lower.ends_with(&format!(".{ext}")))
    }

    async fn query_files(&self, query: &str) -> anyhow::Result<Vec<RemoteFile>> {
        let url = format!("{}/files", self.api_base);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", query),
                ("fields", "files(id,name)"),
                ("pageSize", "1000"),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .context("folder listing request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("folder listing failed ({status}): {body}");
        }

        let list: FileList = response
            .json()
            .await
            .context("cannot parse folder listing")?;
        Ok(list.files)
    }
}

#[async_trait]
impl ImageSource for RemoteFolderSource {
    fn id(&self) -> &'static str {
        "remote"
    }

    async fn list(&self) -> anyhow::Result<Vec<String>> {
        let query = format!("'{}' in parents and trashed=false", self.folder_id);
        let files = self.query_files(&query).await?;
        Ok(files
            .into_iter()
            .map(|f| f.name)
            .filter(|name| self.is_image(name))
            .collect())
    }

    async fn fetch(&self, id: &str) -> anyhow::Result<FetchedImage> {
        // The pool id is a file name; resolve the backend file id first.
        let query = format!(
            "name='{}' and '{}' in parents and trashed=false",
            id, self.folder_id
        );
        let files = self.query_files(&query).await?;
        let file = files
            .into_iter()
            .find(|f| f.name == id)
            .ok_or_else(|| anyhow::anyhow!("image '{id}' not found in remote folder"))?;

        let url = format!("{}/files/{}", self.api_base, file.id);
        let response = self
            .client
            .get(&url)
            .query(&[("alt", "media"), ("key", self.api_key.as_str())])
            .send()
            .await
            .context("image download request failed")?;
        if !response.status().is_success() {
            anyhow::bail!("image download failed ({})", response.status());
        }
        let bytes = response
            .bytes()
            .await
            .context("image download interrupted")?;

        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .with_context(|| {
                format!("cannot create cache dir '{}'", self.cache_dir.display())
            })?;
        let path = self.cache_dir.join(id);
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("cannot write cached image '{}'", path.display()))?;

        debug!("downloaded {} ({} bytes)", id, bytes.len());
        Ok(FetchedImage {
            path,
            temporary: true,
        })
    }
}
