use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download error: {0}")]
    Download(#[from] tsrec_engine::DownloadError),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),
}
