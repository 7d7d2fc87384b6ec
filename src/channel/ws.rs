//! WebSocket implementation of the measurement channel
//!
//! Connects with the ndt7 subprotocol header, then hands the socket to a
//! pump task that forwards inbound frames as [`ChannelEvent`]s and drains an
//! outbound command queue, keeping the shared byte counters current on both
//! paths.

use super::{ChannelConnector, ChannelCounters, ChannelEvent, ChannelHandle, ChannelSender};
use crate::error::{Result, TestError};
use crate::logging;
use crate::settings::Settings;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::Connector;

const EVENT_QUEUE_DEPTH: usize = 64;
const COMMAND_QUEUE_DEPTH: usize = 16;

enum WsCommand {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

/// Opens WebSocket channels over TLS (or plaintext `ws://`)
#[derive(Debug, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }

    fn tls_connector(skip_verification: bool) -> Connector {
        let builder = rustls::ClientConfig::builder().with_safe_defaults();
        let config = if skip_verification {
            builder
                .with_custom_certificate_verifier(Arc::new(NoCertificateVerification))
                .with_no_client_auth()
        } else {
            let mut roots = rustls::RootCertStore::empty();
            roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
                rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
                    ta.subject,
                    ta.spki,
                    ta.name_constraints,
                )
            }));
            builder.with_root_certificates(roots).with_no_client_auth()
        };
        Connector::Rustls(Arc::new(config))
    }
}

#[async_trait]
impl ChannelConnector for WsConnector {
    async fn connect(&self, url: &str, settings: &Settings) -> Result<ChannelHandle> {
        let peer = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string());

        let mut request = url
            .into_client_request()
            .map_err(|e| TestError::channel(&peer, format!("invalid channel URL: {}", e)))?;
        for (name, value) in &settings.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TestError::config(format!("invalid header name {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TestError::config(format!("invalid header value: {}", e)))?;
            request.headers_mut().insert(name, value);
        }

        let connector = Self::tls_connector(settings.skip_tls_verification);
        let connect = tokio_tungstenite::connect_async_tls_with_config(
            request,
            None,
            false,
            Some(connector),
        );
        let (stream, _response) = tokio::time::timeout(settings.timeouts.request, connect)
            .await
            .map_err(|_| TestError::channel(&peer, "connection timed out"))?
            .map_err(|e| TestError::channel(&peer, e.to_string()))?;
        logging::debug(format!("Channel to {} open", peer));

        let counters = ChannelCounters::new();
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);

        // The connect handshake already succeeded, so the open event is the
        // first thing the consumer sees.
        let _ = event_tx.try_send(ChannelEvent::Open);

        tokio::spawn(pump(stream, command_rx, event_tx, counters.clone(), peer.clone()));

        Ok(ChannelHandle {
            sender: Arc::new(WsSender {
                commands: command_tx,
                counters: counters.clone(),
                peer,
            }),
            events: event_rx,
            counters,
        })
    }
}

struct WsSender {
    commands: mpsc::Sender<WsCommand>,
    counters: Arc<ChannelCounters>,
    peer: String,
}

#[async_trait]
impl ChannelSender for WsSender {
    async fn send_text(&self, text: String) -> Result<()> {
        self.counters.add_sent(text.len() as u64);
        self.commands
            .send(WsCommand::Text(text))
            .await
            .map_err(|_| TestError::channel(&self.peer, "channel closed while sending"))
    }

    async fn send_binary(&self, payload: Vec<u8>) -> Result<()> {
        self.counters.add_sent(payload.len() as u64);
        self.commands
            .send(WsCommand::Binary(payload))
            .await
            .map_err(|_| TestError::channel(&self.peer, "channel closed while sending"))
    }

    async fn close(&self) {
        let _ = self.commands.send(WsCommand::Close).await;
    }
}

async fn pump<S>(
    stream: tokio_tungstenite::WebSocketStream<S>,
    mut commands: mpsc::Receiver<WsCommand>,
    events: mpsc::Sender<ChannelEvent>,
    counters: Arc<ChannelCounters>,
    peer: String,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(WsCommand::Text(text)) => {
                    let len = text.len() as u64;
                    match write.send(Message::Text(text)).await {
                        Ok(()) => counters.add_flushed(len),
                        Err(e) => {
                            let _ = events.send(ChannelEvent::Error(e.to_string())).await;
                            break;
                        }
                    }
                }
                Some(WsCommand::Binary(payload)) => {
                    let len = payload.len() as u64;
                    match write.send(Message::Binary(payload)).await {
                        Ok(()) => counters.add_flushed(len),
                        Err(e) => {
                            let _ = events.send(ChannelEvent::Error(e.to_string())).await;
                            break;
                        }
                    }
                }
                Some(WsCommand::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    counters.add_received(text.len() as u64);
                    if events.send(ChannelEvent::Text(text)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Binary(payload))) => {
                    counters.add_received(payload.len() as u64);
                    if events.send(ChannelEvent::Binary(payload.len())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = write.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    let _ = events.send(ChannelEvent::Closed).await;
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = events.send(ChannelEvent::Error(e.to_string())).await;
                    break;
                }
            },
        }
    }
    logging::debug(format!("Channel pump for {} finished", peer));
}

struct NoCertificateVerification;

impl rustls::client::ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::Certificate,
        _intermediates: &[rustls::Certificate],
        _server_name: &rustls::ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> std::result::Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}
