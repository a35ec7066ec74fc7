//! One-shot download of every segment listed in a playlist document.

use std::path::Path;

use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::{DownloadError, path::part_path};

/// Result of one playlist pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaylistSummary {
    /// Segment references found in the document.
    pub segments: usize,
    pub downloaded: usize,
    pub failed: usize,
}

/// Segment references of a playlist body, resolved against the playlist URL.
///
/// A line is a reference when it is non-empty after trimming and does not start
/// with `#`. Relative references are joined onto `base`; absolute ones are kept as
/// they are. Unresolvable references stay in the list as errors so that part
/// numbering follows document order.
pub fn segment_urls(body: &str, base: &Url) -> Vec<Result<Url, DownloadError>> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            base.join(line)
                .map_err(|e| DownloadError::invalid_url(line, e.to_string()))
        })
        .collect()
}

pub struct PlaylistFetcher {
    client: Client,
}

impl PlaylistFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Fetch the playlist once and download its segments, in order, to
    /// `<prefix>_part<N>.ts` starting at 1.
    ///
    /// Only a failure to get the playlist itself is returned; a failed segment is
    /// logged and skipped.
    #[instrument(skip(self, prefix, token), fields(prefix = %prefix.display()))]
    pub async fn fetch(
        &self,
        playlist_url: &Url,
        prefix: &Path,
        token: &CancellationToken,
    ) -> Result<PlaylistSummary, DownloadError> {
        info!(url = %playlist_url, "Downloading from playlist");

        let body = self.fetch_playlist(playlist_url, token).await?;
        let segments = segment_urls(&body, playlist_url);
        let mut summary = PlaylistSummary {
            segments: segments.len(),
            ..PlaylistSummary::default()
        };
        debug!(segments = summary.segments, "Playlist parsed");

        if let Some(parent) = prefix.parent().filter(|p| !p.as_os_str().is_empty())
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            warn!(path = %parent.display(), error = %e, "Failed to create output directory");
        }

        for (index, segment) in segments.into_iter().enumerate() {
            if token.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }

            let part = index as u64 + 1;
            let path = part_path(prefix, part);
            let result = match segment {
                Ok(url) => self.download_segment(&url, &path, token).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(bytes) => {
                    summary.downloaded += 1;
                    debug!(part, path = %path.display(), bytes, "Segment downloaded");
                }
                Err(DownloadError::Cancelled) => return Err(DownloadError::Cancelled),
                Err(e) => {
                    summary.failed += 1;
                    warn!(part, path = %path.display(), error = %e, "Error downloading segment, skipped");
                }
            }
        }

        info!(
            url = %playlist_url,
            segments = summary.segments,
            downloaded = summary.downloaded,
            failed = summary.failed,
            "Playlist download finished"
        );
        Ok(summary)
    }

    async fn fetch_playlist(
        &self,
        playlist_url: &Url,
        token: &CancellationToken,
    ) -> Result<String, DownloadError> {
        tokio::select! {
            _ = token.cancelled() => Err(DownloadError::Cancelled),
            body = self.request_playlist(playlist_url) => body,
        }
    }

    async fn request_playlist(&self, playlist_url: &Url) -> Result<String, DownloadError> {
        let response = self.client.get(playlist_url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(DownloadError::http_status(
                response.status(),
                playlist_url.as_str(),
                "playlist fetch",
            ));
        }
        Ok(response.text().await?)
    }

    /// One GET, body streamed straight into a freshly created (truncated) file.
    async fn download_segment(
        &self,
        url: &Url,
        path: &Path,
        token: &CancellationToken,
    ) -> Result<u64, DownloadError> {
        debug!(url = %url, path = %path.display(), "Downloading segment");

        let response = tokio::select! {
            _ = token.cancelled() => return Err(DownloadError::Cancelled),
            response = self.client.get(url.clone()).send() => response?,
        };
        if !response.status().is_success() {
            return Err(DownloadError::http_status(
                response.status(),
                url.as_str(),
                "segment fetch",
            ));
        }

        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| DownloadError::io_path("creating segment file", path, e))?;

        let mut body = response.bytes_stream();
        let mut written: u64 = 0;
        loop {
            let chunk = tokio::select! {
                _ = token.cancelled() => return Err(DownloadError::Cancelled),
                chunk = body.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io_path("writing segment file", path, e))?;
            written += chunk.len() as u64;
        }

        file.flush()
            .await
            .map_err(|e| DownloadError::io_path("flushing segment file", path, e))?;
        Ok(written)
    }
}
