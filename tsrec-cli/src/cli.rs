use clap::Parser;
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Record live media streams into rotating .ts part files",
    long_about = "Reads a list of stream descriptors and records each one concurrently.\n\
                  \n\
                  Raw HTTP streams are captured forever, reconnecting after every failure,\n\
                  into <prefix>_part<N>.ts files that rotate at a fixed size. HLS playlists\n\
                  (isPlaylist, or a .m3u/.m3u8 URL) are downloaded once, one part per segment.\n\
                  Press Ctrl-C to stop."
)]
pub struct CliArgs {
    /// Stream descriptor file
    #[arg(
        short,
        long,
        default_value = "streams.json",
        help = "JSON list of {url, outputFilePrefix, isPlaylist} objects"
    )]
    pub config: PathBuf,

    /// Seconds to wait before reconnecting a dropped stream
    #[arg(long, default_value_t = 10, help = "Seconds to wait before reconnecting a dropped stream")]
    pub reconnect_delay: u64,

    /// Seconds to wait after a read that returned no data
    #[arg(long, default_value_t = 1, help = "Seconds to wait after a read that returned no data")]
    pub idle_delay: u64,

    /// Part file size limit with optional unit (K, M, G, T)
    /// Examples: "4G", "500M", "2048K"
    #[arg(
        short,
        long,
        default_value = "4G",
        help = "Size at which a part file is closed and the next one started. Examples: \"4G\", \"500M\""
    )]
    pub max_part_size: String,

    /// Connection timeout in seconds
    #[arg(long, default_value_t = 30, help = "HTTP connection timeout in seconds")]
    pub connect_timeout: u64,

    /// Maximum seconds between body chunks before a connection is dropped
    #[arg(
        long,
        help = "Drop a connection after this many seconds without data (default: never)"
    )]
    pub read_timeout: Option<u64>,

    /// Do not follow HTTP redirects
    #[arg(long, help = "Do not follow HTTP redirects")]
    pub no_redirects: bool,

    /// Enable verbose logging
    #[arg(short, long, conflicts_with = "quiet", help = "Enable detailed debug logging")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, help = "Only log errors")]
    pub quiet: bool,

    /// Also write logs to daily rolling files in this directory
    #[arg(long, help = "Directory for daily rolling log files")]
    pub log_dir: Option<PathBuf>,
}
