//! Console rendering of measurements
//!
//! Converts byte/elapsed counters into goodput figures and renders colored
//! progress and summary lines for the CLI.

use crate::measurement::{Kind, Measurement, Origin};
use colored::Colorize;

/// Goodput in Mbit/s from application-level counters. Returns `None` when
/// the elapsed time is not positive.
pub fn goodput_mbps(num_bytes: i64, elapsed_micros: i64) -> Option<f64> {
    if elapsed_micros <= 0 {
        return None;
    }
    let seconds = elapsed_micros as f64 / 1_000_000.0;
    Some(num_bytes as f64 * 8.0 / seconds / 1_000_000.0)
}

/// Goodput for a measurement carrying `AppInfo`, if it does
pub fn measurement_mbps(measurement: &Measurement) -> Option<f64> {
    let app_info = measurement.app_info.as_ref()?;
    goodput_mbps(app_info.num_bytes?, app_info.elapsed_time?)
}

/// Render a speed with color keyed to how fast it is
pub fn format_speed(mbps: f64) -> String {
    let text = format!("{:8.2} Mbit/s", mbps);
    if mbps >= 100.0 {
        text.green().to_string()
    } else if mbps >= 10.0 {
        text.yellow().to_string()
    } else {
        text.red().to_string()
    }
}

/// One progress line for a client-side measurement
pub fn progress_line(kind: Kind, measurement: &Measurement) -> Option<String> {
    let mbps = measurement_mbps(measurement)?;
    let label = match kind {
        Kind::Download => "download",
        Kind::Upload => "  upload",
    };
    Some(format!("{} {}", label.bold(), format_speed(mbps)))
}

/// Final summary for one subtest
pub fn summary_line(kind: Kind, mbps: Option<f64>) -> String {
    let label = match kind {
        Kind::Download => "Download",
        Kind::Upload => "Upload",
    };
    match mbps {
        Some(mbps) => format!("{}: {}", label.bold(), format_speed(mbps)),
        None => format!("{}: {}", label.bold(), "no result".dimmed()),
    }
}

/// Minimum RTT in milliseconds from the latest kernel snapshot, if present
pub fn min_rtt_ms(measurement: &Measurement) -> Option<f64> {
    let tcp_info = measurement.tcp_info.as_ref()?;
    tcp_info.min_rtt.map(|rtt| rtt / 1000.0)
}

/// Keep the most recent client-side goodput per subtest.
///
/// Fed from [`crate::test::TestObserver::measurement`]; `Origin::Server`
/// measurements only contribute the RTT figure.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpeedSummary {
    pub download_mbps: Option<f64>,
    pub upload_mbps: Option<f64>,
    pub min_rtt_ms: Option<f64>,
}

impl SpeedSummary {
    pub fn record(&mut self, origin: Origin, kind: Kind, measurement: &Measurement) {
        match origin {
            Origin::Client => {
                if let Some(mbps) = measurement_mbps(measurement) {
                    match kind {
                        Kind::Download => self.download_mbps = Some(mbps),
                        Kind::Upload => self.upload_mbps = Some(mbps),
                    }
                }
            }
            Origin::Server => {
                if let Some(rtt) = min_rtt_ms(measurement) {
                    self.min_rtt_ms = Some(rtt);
                }
            }
        }
    }
}
