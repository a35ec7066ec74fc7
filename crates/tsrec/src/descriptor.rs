//! Stream descriptors: the static list of capture targets read at startup.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::{DownloadError, path::resolve_path};

/// File suffixes that mark a URL as a playlist even without `isPlaylist`.
const PLAYLIST_SUFFIXES: [&str; 2] = [".m3u8", ".m3u"];

/// One capture target.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDescriptor {
    pub url: Url,
    pub output_file_prefix: PathBuf,
    #[serde(default)]
    pub is_playlist: bool,
}

impl StreamDescriptor {
    pub fn new(url: Url, output_file_prefix: impl Into<PathBuf>) -> Self {
        Self {
            url,
            output_file_prefix: output_file_prefix.into(),
            is_playlist: false,
        }
    }

    pub fn with_playlist(mut self, is_playlist: bool) -> Self {
        self.is_playlist = is_playlist;
        self
    }

    /// Whether this target is handled by the playlist fetcher.
    ///
    /// True when flagged explicitly or when the URL ends in `.m3u`/`.m3u8`,
    /// checked against both the raw URL and its path (ignoring query and fragment).
    pub fn is_playlist_target(&self) -> bool {
        if self.is_playlist {
            return true;
        }
        let raw = self.url.as_str().to_ascii_lowercase();
        let path = self.url.path().to_ascii_lowercase();
        PLAYLIST_SUFFIXES
            .iter()
            .any(|suffix| raw.ends_with(suffix) || path.ends_with(suffix))
    }

    /// Short label used in log spans.
    pub fn label(&self) -> String {
        self.output_file_prefix
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.output_file_prefix.display().to_string())
    }

    fn resolve_prefix(&mut self) -> Result<(), DownloadError> {
        let raw = self.output_file_prefix.to_string_lossy().into_owned();
        self.output_file_prefix = resolve_path(&raw)?;
        Ok(())
    }
}

/// Parse descriptors from a JSON array and expand their output prefixes.
pub fn parse_descriptors(json: &str, source: &Path) -> Result<Vec<StreamDescriptor>, DownloadError> {
    let mut descriptors: Vec<StreamDescriptor> =
        serde_json::from_str(json).map_err(|source_err| DownloadError::Descriptor {
            path: source.to_path_buf(),
            source: source_err,
        })?;

    for descriptor in &mut descriptors {
        descriptor.resolve_prefix()?;
        debug!(
            url = %descriptor.url,
            prefix = %descriptor.output_file_prefix.display(),
            playlist = descriptor.is_playlist_target(),
            "Loaded stream descriptor"
        );
    }

    Ok(descriptors)
}

/// Read and parse the descriptor file. Any failure here is fatal for the process.
pub async fn load_descriptors(path: &Path) -> Result<Vec<StreamDescriptor>, DownloadError> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| DownloadError::DescriptorRead {
            path: path.to_path_buf(),
            source,
        })?;

    let descriptors = parse_descriptors(&json, path)?;
    info!(
        path = %path.display(),
        count = descriptors.len(),
        "Stream descriptors loaded"
    );
    Ok(descriptors)
}
