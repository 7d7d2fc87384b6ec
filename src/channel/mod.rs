//! Abstract duplex measurement channel
//!
//! The test engine only consumes this message-oriented seam; the WebSocket
//! implementation lives in [`ws`]. Tests substitute their own connector to
//! drive subtests without a network.

pub mod ws;

use crate::error::Result;
use crate::settings::Settings;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Inbound event from a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The connection is established
    Open,
    /// A textual (measurement) frame arrived
    Text(String),
    /// A binary frame arrived; only its byte count matters
    Binary(usize),
    /// The peer closed the connection
    Closed,
    /// Transport failure
    Error(String),
}

/// Application-level byte counters shared between the sender, the socket
/// pump and the measurement loops. Updated from whichever task completes
/// the operation, hence atomics.
#[derive(Debug, Default)]
pub struct ChannelCounters {
    bytes_sent: AtomicU64,
    bytes_flushed: AtomicU64,
    bytes_received: AtomicU64,
}

impl ChannelCounters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record bytes submitted for sending
    pub fn add_sent(&self, n: u64) {
        self.bytes_sent.fetch_add(n, Ordering::SeqCst);
    }

    /// Record bytes the transport reports as written out
    pub fn add_flushed(&self, n: u64) {
        self.bytes_flushed.fetch_add(n, Ordering::SeqCst);
    }

    /// Record bytes received at application level
    pub fn add_received(&self, n: u64) {
        self.bytes_received.fetch_add(n, Ordering::SeqCst);
    }

    /// Total bytes submitted for sending
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::SeqCst)
    }

    /// Total bytes received
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::SeqCst)
    }

    /// Bytes submitted but not yet written out by the transport
    pub fn buffered(&self) -> u64 {
        self.bytes_sent()
            .saturating_sub(self.bytes_flushed.load(Ordering::SeqCst))
    }
}

/// Outbound half of a channel
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Send a textual frame
    async fn send_text(&self, text: String) -> Result<()>;

    /// Send a binary frame; the sender records the byte count against the
    /// shared counters before handing it to the transport
    async fn send_binary(&self, payload: Vec<u8>) -> Result<()>;

    /// Close the channel. Idempotent.
    async fn close(&self);
}

/// An open channel: sender half, inbound event stream and shared counters
pub struct ChannelHandle {
    pub sender: Arc<dyn ChannelSender>,
    pub events: mpsc::Receiver<ChannelEvent>,
    pub counters: Arc<ChannelCounters>,
}

/// Opens channels; the single seam between the test engine and the
/// transport
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn connect(&self, url: &str, settings: &Settings) -> Result<ChannelHandle>;
}
