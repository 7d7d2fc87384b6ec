//! Test configuration
//!
//! `Settings` is built once per test invocation and never mutated afterwards.
//! The discovered server is recorded on the test instance, not here.

use crate::defaults;
use std::time::Duration;

/// How the measurement server is chosen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerSelection {
    /// Connect to a fixed hostname, no discovery call
    Fixed { hostname: String, secure: bool },
    /// Query the Locate API for the nearest servers
    Discover {
        /// Base URL of the locate endpoint
        locate_url: String,
        /// Optional country filter for geo-diverse results
        country: Option<String>,
    },
}

impl ServerSelection {
    /// True when this selection pins a non-empty hostname and discovery
    /// must be skipped.
    pub fn is_fixed(&self) -> bool {
        matches!(self, Self::Fixed { hostname, .. } if !hostname.is_empty())
    }
}

impl Default for ServerSelection {
    fn default() -> Self {
        Self::Discover {
            locate_url: defaults::LOCATE_URL.to_string(),
            country: None,
        }
    }
}

/// Per-phase timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Connection/io timeout for opening a channel and for discovery
    pub request: Duration,
    /// Max duration of the download subtest
    pub download: Duration,
    /// Max duration of the upload subtest
    pub upload: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request: defaults::DEFAULT_REQUEST_TIMEOUT,
            download: defaults::DEFAULT_SUBTEST_TIMEOUT,
            upload: defaults::DEFAULT_SUBTEST_TIMEOUT,
        }
    }
}

/// Immutable configuration for one test run
#[derive(Debug, Clone)]
pub struct Settings {
    /// Server selection strategy
    pub server: ServerSelection,
    /// Per-phase timeouts
    pub timeouts: Timeouts,
    /// Minimum interval between emitted measurements.
    ///
    /// The protocol forbids sending measurements more frequently than every
    /// 250 ms; any smaller value is clamped up at construction.
    pub measurement_interval: Duration,
    /// Skip TLS certificate verification (test/dev use only)
    pub skip_tls_verification: bool,
    /// Headers sent on every channel open
    pub headers: Vec<(String, String)>,
    /// Discovery retry budget
    pub max_discovery_retries: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSelection::default(),
            timeouts: Timeouts::default(),
            measurement_interval: defaults::MIN_MEASUREMENT_INTERVAL,
            skip_tls_verification: false,
            headers: vec![(
                defaults::WS_PROTOCOL_HEADER.to_string(),
                defaults::WS_PROTOCOL_VALUE.to_string(),
            )],
            max_discovery_retries: defaults::DEFAULT_DISCOVERY_RETRIES,
        }
    }
}

impl Settings {
    /// Create settings with default values (discovery-based selection)
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin a fixed server hostname, skipping discovery
    pub fn with_hostname<S: Into<String>>(mut self, hostname: S, secure: bool) -> Self {
        self.server = ServerSelection::Fixed {
            hostname: hostname.into(),
            secure,
        };
        self
    }

    /// Use a non-default locate endpoint, optionally filtered by country
    pub fn with_discovery<S: Into<String>>(mut self, locate_url: S, country: Option<String>) -> Self {
        self.server = ServerSelection::Discover {
            locate_url: locate_url.into(),
            country,
        };
        self
    }

    /// Set per-phase timeouts
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the measurement interval, clamped up to the protocol minimum
    pub fn with_measurement_interval(mut self, interval: Duration) -> Self {
        self.measurement_interval = interval.max(defaults::MIN_MEASUREMENT_INTERVAL);
        self
    }

    /// Control TLS certificate verification
    pub fn with_skip_tls_verification(mut self, skip: bool) -> Self {
        self.skip_tls_verification = skip;
        self
    }

    /// Add a header to every channel open request
    pub fn with_header<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the discovery retry budget
    pub fn with_max_discovery_retries(mut self, retries: u32) -> Self {
        self.max_discovery_retries = retries;
        self
    }
}
