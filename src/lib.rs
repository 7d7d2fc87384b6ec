//! ndt7 client library
//!
//! Measures download and upload goodput against an ndt7 measurement server
//! over WebSocket, with server discovery through the Measurement Lab Locate
//! API.
//!
//! # Example
//!
//! ```no_run
//! use ndt7_client::settings::Settings;
//! use ndt7_client::test::SpeedTest;
//!
//! # async fn run() -> ndt7_client::error::Result<()> {
//! let test = SpeedTest::new(Settings::new());
//! test.start_test(true, true).await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod cli;
pub mod error;
pub mod locate;
pub mod logging;
pub mod measurement;
pub mod output;
pub mod settings;
pub mod subtest;
pub mod test;

pub use error::{Result, TestError};
pub use measurement::{Kind, Measurement, Origin};
pub use settings::Settings;
pub use test::{SpeedTest, TestObserver};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

/// Protocol and client constants
pub mod defaults {
    use std::time::Duration;

    /// Locate API endpoint returning the nearest ndt7 servers
    pub const LOCATE_URL: &str = "https://locate.measurementlab.net/v2/nearest/ndt/ndt7";

    /// Client name reported to the Locate API
    pub const CLIENT_NAME: &str = "ndt7-client-rs";

    /// WebSocket path of the download subtest
    pub const DOWNLOAD_PATH: &str = "/ndt/v7/download";

    /// WebSocket path of the upload subtest
    pub const UPLOAD_PATH: &str = "/ndt/v7/upload";

    /// Subprotocol negotiation header sent on every channel open
    pub const WS_PROTOCOL_HEADER: &str = "Sec-WebSocket-Protocol";

    /// ndt7 WebSocket subprotocol
    pub const WS_PROTOCOL_VALUE: &str = "net.measurementlab.ndt.v7";

    /// The protocol forbids emitting measurements more often than this
    pub const MIN_MEASUREMENT_INTERVAL: Duration = Duration::from_millis(250);

    /// Size of each binary upload message
    pub const BULK_MESSAGE_SIZE: usize = 1 << 13;

    /// Upload backlog budget, in messages of [`BULK_MESSAGE_SIZE`] bytes
    pub const MAX_BUFFERED_MESSAGES: usize = 7;

    /// Fixed duration of the upload send loop
    pub const UPLOAD_MAX_DURATION: Duration = Duration::from_secs(10);

    /// Pause between upload loop iterations when the backlog is full
    pub const UPLOAD_LOOP_DELAY: Duration = Duration::from_micros(16384);

    /// Fixed pause between discovery attempts
    pub const DISCOVERY_RETRY_BACKOFF: Duration = Duration::from_millis(500);

    /// Discovery attempts after the first before giving up
    pub const DEFAULT_DISCOVERY_RETRIES: u32 = 4;

    /// HTTP timeout of one discovery request
    pub const DISCOVERY_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    /// Default timeout for opening a channel
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Default max duration of one subtest
    pub const DEFAULT_SUBTEST_TIMEOUT: Duration = Duration::from_secs(15);
}
