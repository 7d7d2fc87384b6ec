//! Flow-controlled upload send loop
//!
//! Repeatedly pushes a fixed-size pseudorandom payload onto the channel
//! while keeping the unflushed backlog under a small multiple of one
//! payload, so the sender cannot outpace the network without bound. Emits a
//! client-side progress snapshot at most every measurement interval and a
//! final one before finishing.

use crate::channel::{ChannelCounters, ChannelSender};
use crate::defaults;
use crate::logging;
use crate::measurement::{Kind, Measurement};
use rand::RngCore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Produce one 8192-byte pseudorandom payload
pub(crate) fn random_payload() -> Vec<u8> {
    let mut payload = vec![0u8; defaults::BULK_MESSAGE_SIZE];
    rand::thread_rng().fill_bytes(&mut payload);
    payload
}

/// Drive the upload loop until `max_duration` elapses or `stop` fires.
///
/// Synthesized measurements are handed to `measurements`; the subtest loop
/// forwards them to the delegate so all callbacks stay on one context.
/// Dropping the sender on return is the completion signal.
pub(crate) async fn run(
    sender: Arc<dyn ChannelSender>,
    counters: Arc<ChannelCounters>,
    measurements: mpsc::Sender<Measurement>,
    interval: Duration,
    max_duration: Duration,
    stop: CancellationToken,
) {
    let payload = random_payload();
    let payload_len = payload.len() as u64;
    let underbuffer = (defaults::MAX_BUFFERED_MESSAGES * defaults::BULK_MESSAGE_SIZE) as u64;
    let start = Instant::now();
    let mut last_emit = start;

    loop {
        if start.elapsed() >= max_duration || stop.is_cancelled() {
            emit(&measurements, start, counters.bytes_sent()).await;
            return;
        }
        // Send while there is budget; the backlog plus one payload never
        // exceeds the underbuffer threshold.
        while counters.buffered() + payload_len <= underbuffer
            && start.elapsed() < max_duration
            && !stop.is_cancelled()
        {
            if let Err(e) = sender.send_binary(payload.clone()).await {
                logging::error(format!("Upload send failed: {}", e));
                return;
            }
            if last_emit.elapsed() >= interval {
                last_emit = Instant::now();
                emit(&measurements, start, counters.bytes_sent()).await;
            }
            // A synchronously-flushing transport would otherwise let this
            // loop monopolize the executor.
            tokio::task::yield_now().await;
        }
        if last_emit.elapsed() >= interval {
            last_emit = Instant::now();
            emit(&measurements, start, counters.bytes_sent()).await;
        }
        // Yield so receive processing and flushing get a chance to run.
        tokio::time::sleep(defaults::UPLOAD_LOOP_DELAY).await;
    }
}

async fn emit(measurements: &mpsc::Sender<Measurement>, start: Instant, bytes: u64) {
    let snapshot =
        Measurement::client_snapshot(Kind::Upload, start.elapsed().as_micros() as i64, bytes as i64);
    let _ = measurements.send(snapshot).await;
}
