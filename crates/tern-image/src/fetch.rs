//! Image archive download and extraction.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use futures::StreamExt;
use reqwest::Client;
use tern_common::{TernError, TernResult, TOOL_ENV};
use tokio::io::AsyncWriteExt;

/// Default archive server, a local mirror.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/images";

/// Downloads `<base-url>/<image>.tar.bz2` archives into image subvolumes.
#[derive(Debug, Clone)]
pub struct ArchiveFetcher {
    client: Client,
    base_url: String,
}

impl ArchiveFetcher {
    /// Create a fetcher for the given archive server.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Archive URL of an image.
    #[must_use]
    pub fn archive_url(&self, image: &str) -> String {
        format!("{}/{image}.tar.bz2", self.base_url.trim_end_matches('/'))
    }

    /// Fetch `image` and unpack it into the existing directory `dest`.
    ///
    /// The archive is streamed next to `dest` and deleted once extracted.
    /// Returns the number of bytes downloaded.
    ///
    /// # Errors
    ///
    /// Returns [`TernError::Fetch`] if `dest` is missing, the download fails
    /// or the archive tool exits unsuccessfully.
    pub async fn fetch(&self, image: &str, dest: &Path) -> TernResult<u64> {
        let url = self.archive_url(image);
        let fail = |reason: String| TernError::Fetch {
            url: url.clone(),
            reason,
        };

        if !dest.is_dir() {
            return Err(fail(format!("destination {} is not a directory", dest.display())));
        }

        let archive = archive_path(image, dest);

        tracing::info!(image, url = %url, "Fetching image");
        let downloaded = match self.download(&url, &archive).await {
            Ok(n) => n,
            Err(reason) => {
                // Never leave a truncated archive behind.
                let _ = tokio::fs::remove_file(&archive).await;
                return Err(fail(reason));
            }
        };
        tracing::info!(image, bytes = downloaded, "Fetched image");

        extract(&archive, dest).await.map_err(fail)?;

        tokio::fs::remove_file(&archive)
            .await
            .map_err(|e| fail(format!("cannot remove {}: {e}", archive.display())))?;

        tracing::info!(image, dest = %dest.display(), "Image extracted");
        Ok(downloaded)
    }

    async fn download(&self, url: &str, archive: &Path) -> Result<u64, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("server answered {}", response.status()));
        }

        let mut file = tokio::fs::File::create(archive)
            .await
            .map_err(|e| format!("cannot create {}: {e}", archive.display()))?;

        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| format!("download error: {e}"))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| format!("write error: {e}"))?;
            downloaded += chunk.len() as u64;
        }

        file.flush()
            .await
            .map_err(|e| format!("flush error: {e}"))?;

        Ok(downloaded)
    }
}

impl Default for ArchiveFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

/// Local archive path: `<image>.tar.bz2` beside the destination.
fn archive_path(image: &str, dest: &Path) -> PathBuf {
    let dir = dest.parent().unwrap_or(dest);
    dir.join(format!("{image}.tar.bz2"))
}

/// Unpack `archive` into `dest` with the system `tar`.
async fn extract(archive: &Path, dest: &Path) -> Result<(), String> {
    tracing::debug!(archive = %archive.display(), dest = %dest.display(), "Extracting");

    let status = tokio::process::Command::new("tar")
        .arg("xjf")
        .arg(archive)
        .current_dir(dest)
        .env_clear()
        .envs(TOOL_ENV.iter().copied())
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|e| format!("cannot run tar: {e}"))?;

    if status.success() {
        Ok(())
    } else {
        Err(format!("tar exited with {status}"))
    }
}
