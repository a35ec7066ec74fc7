//! Runs one independent capture task per stream descriptor.

use std::sync::Arc;

use reqwest::Client;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

use crate::{
    CaptureConfig, DownloadError, StreamDescriptor,
    capture::{CaptureOutcome, HttpConnector, StreamCapture},
    playlist::{PlaylistFetcher, PlaylistSummary},
};

/// What a finished task reported.
#[derive(Debug)]
pub enum TaskOutcome {
    Playlist(Result<PlaylistSummary, DownloadError>),
    Capture(CaptureOutcome),
}

/// Totals over every task of one [`Orchestrator::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub playlists_completed: usize,
    pub playlists_failed: usize,
    pub playlists_cancelled: usize,
    pub captures_stopped: usize,
    pub tasks_panicked: usize,
}

pub struct Orchestrator {
    capture: Arc<StreamCapture<HttpConnector>>,
    playlists: Arc<PlaylistFetcher>,
}

impl Orchestrator {
    pub fn new(client: Client, config: CaptureConfig) -> Result<Self, DownloadError> {
        Ok(Self {
            capture: Arc::new(StreamCapture::with_client(client.clone(), config)?),
            playlists: Arc::new(PlaylistFetcher::new(client)),
        })
    }

    /// Launch a task per descriptor and wait for all of them.
    ///
    /// Playlist tasks finish after one pass. Stream captures only finish when
    /// `token` is cancelled, so with any raw stream configured this waits until then.
    pub async fn run(&self, descriptors: Vec<StreamDescriptor>, token: CancellationToken) -> RunReport {
        let mut tasks = JoinSet::new();

        for descriptor in descriptors {
            let span = info_span!("stream", name = %descriptor.label());
            let token = token.child_token();

            if descriptor.is_playlist_target() {
                let fetcher = self.playlists.clone();
                tasks.spawn(
                    async move {
                        let result = fetcher
                            .fetch(&descriptor.url, &descriptor.output_file_prefix, &token)
                            .await;
                        TaskOutcome::Playlist(result)
                    }
                    .instrument(span),
                );
            } else {
                let capture = self.capture.clone();
                tasks.spawn(
                    async move { TaskOutcome::Capture(capture.run(&descriptor, token).await) }
                        .instrument(span),
                );
            }
        }

        info!(tasks = tasks.len(), "Capture tasks started");

        let mut report = RunReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(TaskOutcome::Playlist(Ok(_))) => report.playlists_completed += 1,
                Ok(TaskOutcome::Playlist(Err(DownloadError::Cancelled))) => {
                    report.playlists_cancelled += 1;
                    info!("Playlist download cancelled");
                }
                Ok(TaskOutcome::Playlist(Err(e))) => {
                    report.playlists_failed += 1;
                    warn!(error = %e, "Error fetching playlist");
                }
                Ok(TaskOutcome::Capture(CaptureOutcome::Cancelled)) => report.captures_stopped += 1,
                Err(e) => {
                    report.tasks_panicked += 1;
                    error!(error = %e, "Capture task aborted");
                }
            }
        }

        info!(
            playlists_completed = report.playlists_completed,
            playlists_failed = report.playlists_failed,
            playlists_cancelled = report.playlists_cancelled,
            captures_stopped = report.captures_stopped,
            "All capture tasks finished"
        );
        report
    }
}
