use std::sync::OnceLock;
use std::time::Duration;

use tracing::debug;

use crate::DownloadError;

pub const DEFAULT_USER_AGENT: &str = concat!("tsrec/", env!("CARGO_PKG_VERSION"));

/// Pause between losing a stream connection and the next connect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Pause before re-reading a connection that delivered no data.
pub const DEFAULT_IDLE_READ_DELAY: Duration = Duration::from_secs(1);

/// Size at which a part file is closed and the next one is started (4 GiB).
pub const DEFAULT_MAX_PART_SIZE: u64 = 4 * 1024 * 1024 * 1024;

/// Timing and rotation settings for raw stream capture
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Fixed delay before reconnecting after a failed connect or a terminated stream.
    /// Not exponential, no retry limit.
    pub reconnect_delay: Duration,

    /// Delay before retrying a read that returned no bytes
    pub idle_read_delay: Duration,

    /// Maximum number of bytes written to a single part file
    pub max_part_size: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            idle_read_delay: DEFAULT_IDLE_READ_DELAY,
            max_part_size: DEFAULT_MAX_PART_SIZE,
        }
    }
}

impl CaptureConfig {
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_idle_read_delay(mut self, delay: Duration) -> Self {
        self.idle_read_delay = delay;
        self
    }

    pub fn with_max_part_size(mut self, bytes: u64) -> Self {
        self.max_part_size = bytes;
        self
    }

    pub fn validate(&self) -> Result<(), DownloadError> {
        if self.max_part_size == 0 {
            return Err(DownloadError::configuration(
                "max part size must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// HTTP client options shared by every capture task
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// Maximum time between body chunks. `None` lets live streams idle indefinitely.
    pub read_timeout: Option<Duration>,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// User agent string
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: None,
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate got there first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build the `reqwest::Client` used for stream, playlist and segment requests.
pub fn create_client(config: &HttpConfig) -> Result<reqwest::Client, DownloadError> {
    install_rustls_provider();

    let redirect = if config.follow_redirects {
        reqwest::redirect::Policy::limited(10)
    } else {
        reqwest::redirect::Policy::none()
    };

    let mut builder = reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .user_agent(config.user_agent.as_str())
        .redirect(redirect);

    if let Some(read_timeout) = config.read_timeout {
        builder = builder.read_timeout(read_timeout);
    }

    Ok(builder.build()?)
}
