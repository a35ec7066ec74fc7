//! # tsrec engine
//!
//! Captures live media to size-bounded `<prefix>_part<N>.ts` files. Raw HTTP
//! streams are recorded by [`StreamCapture`], an endless connect/stream/reconnect
//! loop; HLS-style playlists are downloaded once, segment by segment, by
//! [`PlaylistFetcher`]. [`Orchestrator`] runs one task per [`StreamDescriptor`].

pub mod capture;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod orchestrator;
pub mod part;
pub mod path;
pub mod playlist;

pub use capture::{ByteStream, CaptureOutcome, HttpConnector, StreamCapture, StreamConnector};
pub use config::{
    CaptureConfig, DEFAULT_IDLE_READ_DELAY, DEFAULT_MAX_PART_SIZE, DEFAULT_RECONNECT_DELAY,
    HttpConfig, create_client,
};
pub use descriptor::{StreamDescriptor, load_descriptors, parse_descriptors};
pub use error::DownloadError;
pub use orchestrator::{Orchestrator, RunReport, TaskOutcome};
pub use part::{ClosedPart, PartWriter};
pub use path::{part_path, resolve_path};
pub use playlist::{PlaylistFetcher, PlaylistSummary, segment_urls};

pub use tokio_util::sync::CancellationToken;
