use std::path::{Path, PathBuf};

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("download cancelled")]
    Cancelled,

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} during {operation} for {url}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        operation: &'static str,
    },

    #[error("I/O error while {op} `{}`: {source}", path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("cannot read stream descriptors from `{}`: {source}", path.display())]
    DescriptorRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid stream descriptors in `{}`: {source}", path.display())]
    Descriptor {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot expand `{path}`: home directory is unavailable")]
    HomeDirUnavailable { path: String },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },
}

impl DownloadError {
    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn http_status(
        status: StatusCode,
        url: impl Into<String>,
        operation: &'static str,
    ) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            operation,
        }
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Startup errors that leave the process unable to continue.
    ///
    /// Everything else is contained inside a single capture task and retried or
    /// skipped there.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::DescriptorRead { .. }
            | Self::Descriptor { .. }
            | Self::HomeDirUnavailable { .. }
            | Self::Configuration { .. } => true,
            Self::Cancelled
            | Self::InvalidUrl { .. }
            | Self::Network { .. }
            | Self::HttpStatus { .. }
            | Self::IoPath { .. }
            | Self::Io { .. } => false,
        }
    }
}
