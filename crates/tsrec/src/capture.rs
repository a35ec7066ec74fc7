//! # Stream Capture
//!
//! Long-running capture of a raw HTTP media stream into rotating part files.
//!
//! Each task cycles through three states until its cancellation token fires:
//!
//! - **Connecting**: one GET to the stream URL. A failure goes straight to the
//!   reconnect delay.
//! - **Streaming**: chunks from the response body are appended to the current
//!   part file, rotating at the configured size. Empty reads are treated as an idle
//!   stream and retried after a short pause. A read error or the end of the body
//!   closes the part file and the connection.
//! - **Reconnect delay**: a fixed pause, then back to connecting.
//!
//! Part numbers keep counting across reconnects: every connection starts a fresh
//! part with the next number, so nothing written earlier is ever overwritten.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};
use url::Url;

use crate::{
    CaptureConfig, DownloadError, StreamDescriptor,
    part::{ClosedPart, PartWriter},
};

/// Body of an established stream connection.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, DownloadError>> + Send>>;

/// Opens the byte stream behind a capture URL.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<ByteStream, DownloadError>;
}

#[async_trait]
impl<T: StreamConnector + ?Sized> StreamConnector for Arc<T> {
    async fn connect(&self, url: &Url) -> Result<ByteStream, DownloadError> {
        (**self).connect(url).await
    }
}

/// [`StreamConnector`] over plain HTTP(S) GET requests.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    client: Client,
}

impl HttpConnector {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StreamConnector for HttpConnector {
    async fn connect(&self, url: &Url) -> Result<ByteStream, DownloadError> {
        debug!(url = %url, "Sending stream request");
        let response = self.client.get(url.clone()).send().await?;

        if !response.status().is_success() {
            return Err(DownloadError::http_status(
                response.status(),
                url.as_str(),
                "stream connect",
            ));
        }

        debug!(
            url = %url,
            status = %response.status(),
            content_type = ?response.headers().get(reqwest::header::CONTENT_TYPE),
            "Stream connected"
        );

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(DownloadError::from))
            .boxed())
    }
}

/// Why a capture loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The cancellation token fired. The only way out of the loop.
    Cancelled,
}

/// How one connection's streaming phase ended.
#[derive(Debug)]
enum StreamEnd {
    /// The server ended the body and nothing more arrived after the idle pause.
    Closed,
    /// A read on the connection failed.
    ReadFailed(DownloadError),
    /// The next part file could not be created.
    PartUnavailable(DownloadError),
    Cancelled,
}

pub struct StreamCapture<C = HttpConnector> {
    connector: C,
    config: CaptureConfig,
}

impl StreamCapture<HttpConnector> {
    pub fn with_client(client: Client, config: CaptureConfig) -> Result<Self, DownloadError> {
        Self::new(HttpConnector::new(client), config)
    }
}

impl<C: StreamConnector> StreamCapture<C> {
    /// Fails with [`DownloadError::Configuration`] when `config` does not validate.
    pub fn new(connector: C, config: CaptureConfig) -> Result<Self, DownloadError> {
        config.validate()?;
        Ok(Self { connector, config })
    }

    /// Capture `descriptor` until `token` is cancelled.
    ///
    /// Connection and read failures are logged and retried after the reconnect
    /// delay, forever. Nothing escapes this loop.
    #[instrument(skip_all, fields(stream = %descriptor.label()))]
    pub async fn run(&self, descriptor: &StreamDescriptor, token: CancellationToken) -> CaptureOutcome {
        let url = &descriptor.url;
        let mut writer = PartWriter::new(&descriptor.output_file_prefix, self.config.max_part_size);
        let mut connections: u64 = 0;

        ensure_parent_dir(&descriptor.output_file_prefix).await;
        info!(
            url = %url,
            prefix = %descriptor.output_file_prefix.display(),
            max_part_size = self.config.max_part_size,
            "Starting stream capture"
        );

        loop {
            if token.is_cancelled() {
                break;
            }

            let connected = tokio::select! {
                _ = token.cancelled() => break,
                result = self.connector.connect(url) => result,
            };

            match connected {
                Ok(stream) => {
                    connections += 1;
                    info!(url = %url, connection = connections, "Connected to stream");

                    let (end, received) = self.stream_into_parts(stream, &mut writer, &token).await;
                    match end {
                        StreamEnd::Cancelled => break,
                        StreamEnd::Closed => {
                            info!(
                                url = %url,
                                received,
                                part = writer.part_number(),
                                part_bytes = writer.bytes_in_part(),
                                "Stream ended by server"
                            );
                        }
                        StreamEnd::ReadFailed(e) => {
                            warn!(
                                url = %url,
                                error = %e,
                                received,
                                part = writer.part_number(),
                                part_bytes = writer.bytes_in_part(),
                                "Error reading from stream"
                            );
                        }
                        StreamEnd::PartUnavailable(e) => {
                            error!(url = %url, error = %e, "Cannot open part file");
                        }
                    }
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Error connecting to stream");
                }
            }

            debug!(
                delay_ms = self.config.reconnect_delay.as_millis() as u64,
                "Waiting before reconnect"
            );
            if !pause(self.config.reconnect_delay, &token).await {
                break;
            }
        }

        writer.close().await;
        info!(
            url = %url,
            connections,
            parts = writer.part_number(),
            "Stream capture stopped"
        );
        CaptureOutcome::Cancelled
    }

    /// Streaming state for one connection. Always leaves the part file closed and
    /// the connection dropped. Returns how it ended and the bytes received.
    async fn stream_into_parts(
        &self,
        mut stream: ByteStream,
        writer: &mut PartWriter,
        token: &CancellationToken,
    ) -> (StreamEnd, u64) {
        if let Err(e) = writer.start_part().await {
            return (StreamEnd::PartUnavailable(e), 0);
        }

        let mut received: u64 = 0;
        let end = loop {
            let next = tokio::select! {
                _ = token.cancelled() => break StreamEnd::Cancelled,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(chunk)) if chunk.is_empty() => {
                    trace!("Empty read, stream idle");
                    if !pause(self.config.idle_read_delay, token).await {
                        break StreamEnd::Cancelled;
                    }
                }
                Some(Ok(chunk)) => {
                    received += chunk.len() as u64;
                    if let Err(e) = writer.write(&chunk).await {
                        break StreamEnd::PartUnavailable(e);
                    }
                }
                Some(Err(e)) => break StreamEnd::ReadFailed(e),
                None => {
                    debug!(received, "End of stream body, waiting for idle delay");
                    if !pause(self.config.idle_read_delay, token).await {
                        break StreamEnd::Cancelled;
                    }
                    break StreamEnd::Closed;
                }
            }
        };

        drop(stream);
        if let Some(ClosedPart { number, path, bytes }) = writer.close().await {
            debug!(part = number, path = %path.display(), bytes, "Part file finished");
        }
        (end, received)
    }
}

/// Sleep for `duration`. Returns `false` if cancelled first.
async fn pause(duration: Duration, token: &CancellationToken) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

async fn ensure_parent_dir(prefix: &std::path::Path) {
    let Some(parent) = prefix.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return;
    };
    if let Err(e) = tokio::fs::create_dir_all(parent).await {
        warn!(path = %parent.display(), error = %e, "Failed to create output directory");
    }
}
