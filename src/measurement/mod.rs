//! Measurement wire schema and codec
//!
//! Client and server exchange JSON measurements as textual WebSocket
//! messages. The canonical schema is the PascalCase protocol revision
//! (`AppInfo`, `TCPInfo`, `BBRInfo`, `ConnectionInfo`, `Origin`, `Test`);
//! the older snake_case revision is accepted on decode where the mapping is
//! unambiguous. Elapsed time is carried as microseconds (`i64`).

use crate::error::{Result, TestError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Origin of a measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Synthesized by this client
    Client,
    /// Reported by the measurement server
    Server,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Client => f.write_str("client"),
            Origin::Server => f.write_str("server"),
        }
    }
}

/// Kind of subtest a measurement belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Download,
    Upload,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Download => f.write_str("download"),
            Kind::Upload => f.write_str("upload"),
        }
    }
}

/// Application-level progress counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AppInfo {
    /// Microseconds elapsed since the beginning of the subtest
    #[serde(
        rename = "ElapsedTime",
        alias = "elapsed_time",
        skip_serializing_if = "Option::is_none"
    )]
    pub elapsed_time: Option<i64>,
    /// Bytes transferred at application level since the subtest began
    #[serde(
        rename = "NumBytes",
        alias = "num_bytes",
        skip_serializing_if = "Option::is_none"
    )]
    pub num_bytes: Option<i64>,
}

/// Kernel TCP_INFO counters, forwarded verbatim when the server provides them
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct TcpInfo {
    /// Smoothed RTT
    #[serde(rename = "RTT", alias = "smoothed_rtt", skip_serializing_if = "Option::is_none")]
    pub rtt: Option<f64>,
    /// RTT variance
    #[serde(rename = "RTTVar", alias = "rtt_var", skip_serializing_if = "Option::is_none")]
    pub rtt_var: Option<f64>,
    #[serde(rename = "MinRTT", skip_serializing_if = "Option::is_none")]
    pub min_rtt: Option<f64>,
    #[serde(rename = "BytesAcked", skip_serializing_if = "Option::is_none")]
    pub bytes_acked: Option<i64>,
    #[serde(rename = "BytesSent", skip_serializing_if = "Option::is_none")]
    pub bytes_sent: Option<i64>,
    #[serde(rename = "BytesReceived", skip_serializing_if = "Option::is_none")]
    pub bytes_received: Option<i64>,
    #[serde(rename = "BytesRetrans", skip_serializing_if = "Option::is_none")]
    pub bytes_retrans: Option<i64>,
    #[serde(rename = "BusyTime", skip_serializing_if = "Option::is_none")]
    pub busy_time: Option<i64>,
    #[serde(rename = "RWndLimited", skip_serializing_if = "Option::is_none")]
    pub rwnd_limited: Option<i64>,
    #[serde(rename = "SndBufLimited", skip_serializing_if = "Option::is_none")]
    pub sndbuf_limited: Option<i64>,
    #[serde(rename = "ElapsedTime", skip_serializing_if = "Option::is_none")]
    pub elapsed_time: Option<i64>,
}

/// BBR congestion-control stats, forwarded verbatim when available
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct BbrInfo {
    /// Max bandwidth estimate, bits per second
    #[serde(rename = "BW", alias = "max_bandwidth", skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<i64>,
    #[serde(rename = "MinRTT", alias = "min_rtt", skip_serializing_if = "Option::is_none")]
    pub min_rtt: Option<f64>,
    #[serde(rename = "PacingGain", skip_serializing_if = "Option::is_none")]
    pub pacing_gain: Option<f64>,
    #[serde(rename = "CwndGain", skip_serializing_if = "Option::is_none")]
    pub cwnd_gain: Option<f64>,
    #[serde(rename = "ElapsedTime", skip_serializing_if = "Option::is_none")]
    pub elapsed_time: Option<i64>,
}

/// Socket identifiers, sent at most once per subtest by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ConnectionInfo {
    #[serde(rename = "Client", skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(rename = "Server", skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(rename = "UUID", skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

/// One point-in-time snapshot of test progress
///
/// Every field is optional; unknown fields in inbound messages are ignored.
/// The raw JSON text of a decoded message is preserved in `raw` for
/// forwarding and logging fidelity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Measurement {
    #[serde(rename = "AppInfo", alias = "app_info", skip_serializing_if = "Option::is_none")]
    pub app_info: Option<AppInfo>,
    #[serde(rename = "TCPInfo", alias = "tcp_info", skip_serializing_if = "Option::is_none")]
    pub tcp_info: Option<TcpInfo>,
    #[serde(rename = "BBRInfo", alias = "bbr_info", skip_serializing_if = "Option::is_none")]
    pub bbr_info: Option<BbrInfo>,
    #[serde(
        rename = "ConnectionInfo",
        alias = "connection_info",
        skip_serializing_if = "Option::is_none"
    )]
    pub connection_info: Option<ConnectionInfo>,
    #[serde(rename = "Origin", alias = "origin", skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
    #[serde(rename = "Test", alias = "test", skip_serializing_if = "Option::is_none")]
    pub direction: Option<Kind>,
    /// Legacy float-seconds elapsed field of the older protocol revision,
    /// accepted on decode only
    #[serde(default, rename = "elapsed", skip_serializing)]
    pub elapsed: Option<f64>,
    /// Raw JSON text this measurement was decoded from
    #[serde(skip)]
    pub raw: Option<String>,
}

impl Measurement {
    /// Parse one JSON measurement, preserving the raw text alongside the
    /// decoded structure. Malformed JSON or a type mismatch yields
    /// `TestError::Decode`; callers log and skip such messages.
    pub fn decode(text: &str) -> Result<Measurement> {
        let mut measurement: Measurement =
            serde_json::from_str(text).map_err(|e| TestError::decode(e.to_string()))?;
        measurement.raw = Some(text.to_string());
        Ok(measurement)
    }

    /// Produce canonical JSON for this measurement
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| TestError::decode(e.to_string()))
    }

    /// Build a client-origin progress snapshot for the given subtest,
    /// carrying elapsed microseconds and the cumulative byte count. The
    /// encoded JSON is stored back as `raw`.
    pub fn client_snapshot(kind: Kind, elapsed_micros: i64, num_bytes: i64) -> Measurement {
        let mut measurement = Measurement {
            app_info: Some(AppInfo {
                elapsed_time: Some(elapsed_micros),
                num_bytes: Some(num_bytes),
            }),
            origin: Some(Origin::Client),
            direction: Some(kind),
            ..Measurement::default()
        };
        measurement.raw = measurement.encode().ok();
        measurement
    }
}
