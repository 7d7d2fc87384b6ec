//! Command line interface

use crate::defaults;
use crate::error::{Result, TestError};
use crate::settings::{Settings, Timeouts};
use clap::Parser;
use std::time::Duration;

/// ndt7 network performance client
#[derive(Parser, Debug)]
#[command(
    name = "ndt7",
    version,
    about = "Measure download and upload goodput against an ndt7 server",
    long_about = "Runs the ndt7 download and upload subtests against the nearest \
                  Measurement Lab server (or a server you pin with --server) and \
                  reports application-level goodput."
)]
pub struct Cli {
    /// Measurement server hostname (skips discovery)
    #[arg(short, long)]
    pub server: Option<String>,

    /// Use ws:// instead of wss:// when --server is given
    #[arg(long, requires = "server")]
    pub no_tls: bool,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure: bool,

    /// Skip the download subtest
    #[arg(long)]
    pub no_download: bool,

    /// Skip the upload subtest
    #[arg(long)]
    pub no_upload: bool,

    /// Locate API endpoint used for discovery
    #[arg(long, default_value = defaults::LOCATE_URL)]
    pub locate_url: String,

    /// Restrict discovery to servers in this country (ISO code)
    #[arg(long)]
    pub country: Option<String>,

    /// Max duration of each subtest in seconds
    #[arg(long, default_value_t = 15)]
    pub timeout: u64,

    /// Interval between progress updates in milliseconds (min 250)
    #[arg(long, default_value_t = 250)]
    pub interval: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Append logs to this file
    #[arg(long)]
    pub log_file: Option<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl Cli {
    /// Translate the parsed arguments into test settings
    pub fn to_settings(&self) -> Result<Settings> {
        if self.no_download && self.no_upload {
            return Err(TestError::config(
                "Both subtests skipped; nothing to measure",
            ));
        }
        if self.timeout == 0 {
            return Err(TestError::config("Timeout must be at least one second"));
        }

        let subtest_timeout = Duration::from_secs(self.timeout);
        let mut settings = Settings::new()
            .with_timeouts(Timeouts {
                request: defaults::DEFAULT_REQUEST_TIMEOUT,
                download: subtest_timeout,
                upload: subtest_timeout,
            })
            .with_measurement_interval(Duration::from_millis(self.interval))
            .with_skip_tls_verification(self.insecure);

        settings = match &self.server {
            Some(hostname) => settings.with_hostname(hostname, !self.no_tls),
            None => settings.with_discovery(self.locate_url.clone(), self.country.clone()),
        };
        Ok(settings)
    }
}
