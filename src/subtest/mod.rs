//! Single-subtest lifecycle
//!
//! Runs one download or upload subtest against one channel: open the
//! channel, forward inbound measurements to the delegate, enforce the
//! per-subtest deadline, and collapse the close/timeout/error/cancel races
//! into a single completion. Deadline expiry is the designed way a subtest
//! ends and is not an error.

pub mod upload;

use crate::channel::{ChannelConnector, ChannelEvent};
use crate::defaults;
use crate::error::{Result, TestError};
use crate::logging;
use crate::measurement::{Kind, Measurement, Origin};
use crate::settings::Settings;
use crate::test::{RunningFlag, TestObserver};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub(crate) async fn run(
    kind: Kind,
    url: &str,
    server_name: &str,
    settings: &Settings,
    connector: &dyn ChannelConnector,
    observer: &dyn TestObserver,
    running: &mut RunningFlag,
    cancel: &CancellationToken,
) -> Result<()> {
    logging::info(format!("{} subtest setup against {}", kind, server_name));
    let connected = tokio::select! {
        _ = cancel.cancelled() => {
            logging::info(format!("{} subtest cancelled before the channel opened", kind));
            return Err(TestError::Cancelled);
        }
        connected = connector.connect(url, settings) => connected,
    };
    let mut handle = match connected {
        Ok(handle) => handle,
        Err(e) => {
            logging::error(format!("{} subtest failed to open channel: {}", kind, e));
            observer.test_error(kind, &e);
            return Err(e);
        }
    };

    let max_duration = match kind {
        Kind::Download => settings.timeouts.download,
        Kind::Upload => settings.timeouts.upload,
    };
    let deadline = tokio::time::sleep(max_duration);
    tokio::pin!(deadline);

    // Client-side snapshots synthesized by the upload loop funnel through
    // this queue so delegate calls stay on this task. The sender is handed
    // to the uploader once the channel opens; the loop ending (queue
    // closed) is the upload completion signal.
    let (client_tx, mut client_rx) = mpsc::channel::<Measurement>(8);
    let mut client_tx = Some(client_tx);
    let upload_stop = CancellationToken::new();

    let mut t0: Option<Instant> = None;
    let mut t_last = Instant::now();

    let result = loop {
        // Biased: queued client snapshots drain before the deadline ends
        // the subtest, and the deadline beats a still-chattering channel.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                logging::info(format!("{} subtest cancelled", kind));
                break Err(TestError::Cancelled);
            }
            snapshot = client_rx.recv() => match snapshot {
                Some(measurement) => {
                    observer.measurement(Origin::Client, kind, &measurement);
                }
                // Uploader finished its 10 s run: clean end of the subtest.
                None => break Ok(()),
            },
            _ = &mut deadline => {
                logging::info(format!("{} subtest reached its max duration", kind));
                break Ok(());
            }
            event = handle.events.recv() => match event {
                Some(ChannelEvent::Open) => {
                    running.set(true, observer);
                    t0 = Some(Instant::now());
                    t_last = Instant::now();
                    if kind == Kind::Upload {
                        if let Some(tx) = client_tx.take() {
                            tokio::spawn(upload::run(
                                handle.sender.clone(),
                                handle.counters.clone(),
                                tx,
                                settings.measurement_interval,
                                defaults::UPLOAD_MAX_DURATION,
                                upload_stop.clone(),
                            ));
                        }
                    }
                }
                Some(ChannelEvent::Text(text)) => match Measurement::decode(&text) {
                    Ok(mut measurement) => {
                        measurement.origin = Some(Origin::Server);
                        measurement.direction = Some(kind);
                        observer.measurement(Origin::Server, kind, &measurement);
                        if kind == Kind::Download {
                            if let Some(start) = t0 {
                                if t_last.elapsed() >= settings.measurement_interval {
                                    t_last = Instant::now();
                                    let snapshot = Measurement::client_snapshot(
                                        kind,
                                        start.elapsed().as_micros() as i64,
                                        handle.counters.bytes_received() as i64,
                                    );
                                    observer.measurement(Origin::Client, kind, &snapshot);
                                }
                            }
                        }
                    }
                    // Malformed measurements are dropped; the subtest goes on.
                    Err(e) => logging::error(format!("{}", e)),
                },
                // Binary frames only matter by byte count, which the
                // channel already tracks.
                Some(ChannelEvent::Binary(_)) => {}
                Some(ChannelEvent::Closed) | None => break Ok(()),
                Some(ChannelEvent::Error(message)) => {
                    let error = TestError::channel(server_name, message);
                    logging::error(format!("{} subtest error: {}", kind, error));
                    observer.test_error(kind, &error);
                    break Err(error);
                }
            },
        }
    };

    upload_stop.cancel();
    handle.sender.close().await;
    result
}
