//! Test orchestration
//!
//! [`SpeedTest`] runs one complete ndt7 test: resolve a server, run the
//! download subtest, run the upload subtest, and report progress through a
//! [`TestObserver`]. Starting a test cancels any other test instance in the
//! process; cancelling one is idempotent and makes the pending run finish
//! with a cancellation error.


use crate::channel::ws::WsConnector;
use crate::channel::ChannelConnector;
use crate::error::{Result, TestError};
use crate::locate::{Server, ServerLocator};
use crate::logging;
use crate::measurement::{Kind, Measurement, Origin};
use crate::settings::{ServerSelection, Settings};
use crate::subtest;
use registry::ControlHandle;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Receives progress callbacks for a running test.
///
/// All callbacks are delivered from the task driving [`SpeedTest::start_test`],
/// never concurrently. Every method has a no-op default so implementors only
/// override what they care about.
pub trait TestObserver: Send + Sync {
    /// A subtest transitioned between running and not running. Fired only on
    /// actual transitions, never repeated for the same state.
    fn running_changed(&self, _kind: Kind, _running: bool) {}

    /// A measurement was produced, either decoded from the server or
    /// synthesized client-side.
    fn measurement(&self, _origin: Origin, _kind: Kind, _measurement: &Measurement) {}

    /// A subtest hit an error. Cancellation is not reported here; it only
    /// surfaces through the [`SpeedTest::start_test`] return value.
    fn test_error(&self, _kind: Kind, _error: &TestError) {}
}

/// Observer that ignores everything
#[derive(Debug, Default)]
pub struct NullObserver;

impl TestObserver for NullObserver {}

/// Edge-triggered running-state tracker for one subtest. Repeated sets to
/// the same value notify nobody.
pub(crate) struct RunningFlag {
    kind: Kind,
    value: bool,
}

impl RunningFlag {
    pub(crate) fn new(kind: Kind) -> Self {
        Self { kind, value: false }
    }

    pub(crate) fn set(&mut self, value: bool, observer: &dyn TestObserver) {
        if self.value == value {
            return;
        }
        self.value = value;
        logging::debug(format!("{} running: {}", self.kind, value));
        observer.running_changed(self.kind, value);
    }
}

/// One ndt7 test instance
pub struct SpeedTest {
    settings: Settings,
    connector: Arc<dyn ChannelConnector>,
    handle: Arc<ControlHandle>,
    observer: Mutex<Arc<dyn TestObserver>>,
    current_server: Mutex<Option<Server>>,
}

impl SpeedTest {
    /// Create a test instance over the WebSocket transport
    pub fn new(settings: Settings) -> Self {
        Self::with_connector(settings, Arc::new(WsConnector::new()))
    }

    /// Create a test instance over a custom transport
    pub fn with_connector(settings: Settings, connector: Arc<dyn ChannelConnector>) -> Self {
        Self {
            settings,
            connector,
            handle: ControlHandle::new(),
            observer: Mutex::new(Arc::new(NullObserver)),
            current_server: Mutex::new(None),
        }
    }

    /// Install the observer receiving progress callbacks
    pub fn set_observer(&self, observer: Arc<dyn TestObserver>) {
        *self.observer.lock().unwrap() = observer;
    }

    /// The server the current (or last) run resolved, if any
    pub fn current_server(&self) -> Option<Server> {
        self.current_server.lock().unwrap().clone()
    }

    /// Run a test: download subtest first (if requested), then upload.
    ///
    /// Starting a test cancels any other in-flight test in the process,
    /// including a previous run still in flight on this same instance. A
    /// download failure does not prevent the upload subtest from running;
    /// only cancellation short-circuits. The returned result is the upload
    /// subtest's outcome, or the download's when upload was not requested.
    /// Reaching a subtest's max duration counts as success.
    pub async fn start_test(&self, download: bool, upload: bool) -> Result<()> {
        logging::info("Test started");
        let cancel = self.handle.reset();
        registry::cancel_siblings(self.handle.id);
        let observer = self.observer.lock().unwrap().clone();

        let server = match self.resolve_server(&cancel).await {
            Ok(server) => server,
            Err(e) => {
                logging::error(format!("Server resolution failed: {}", e));
                return Err(e);
            }
        };
        logging::info(format!("Using measurement server {}", server.machine));
        *self.current_server.lock().unwrap() = Some(server.clone());

        let secure = match &self.settings.server {
            ServerSelection::Fixed { secure, .. } if self.settings.server.is_fixed() => *secure,
            _ => true,
        };

        let download_result = if download {
            let mut running = RunningFlag::new(Kind::Download);
            let result = match server.download_url(secure) {
                Some(url) => {
                    subtest::run(
                        Kind::Download,
                        url,
                        &server.machine,
                        &self.settings,
                        self.connector.as_ref(),
                        observer.as_ref(),
                        &mut running,
                        &cancel,
                    )
                    .await
                }
                None => Err(TestError::config(format!(
                    "Server {} has no download URL",
                    server.machine
                ))),
            };
            running.set(false, observer.as_ref());
            result
        } else {
            Ok(())
        };

        if let Err(e) = &download_result {
            if e.is_cancellation() {
                return Err(e.clone());
            }
        }

        let final_result = if upload {
            let mut running = RunningFlag::new(Kind::Upload);
            let result = match server.upload_url(secure) {
                Some(url) => {
                    subtest::run(
                        Kind::Upload,
                        url,
                        &server.machine,
                        &self.settings,
                        self.connector.as_ref(),
                        observer.as_ref(),
                        &mut running,
                        &cancel,
                    )
                    .await
                }
                None => Err(TestError::config(format!(
                    "Server {} has no upload URL",
                    server.machine
                ))),
            };
            running.set(false, observer.as_ref());
            result
        } else {
            download_result
        };

        match &final_result {
            Ok(()) => logging::info("Test finished"),
            Err(e) => logging::warn(format!("Test finished with error: {}", e)),
        }
        final_result
    }

    /// Cancel the in-flight run, if any. Safe to call at any time, from any
    /// task, any number of times.
    pub fn cancel(&self) {
        logging::info("Test cancellation requested");
        self.handle.cancel();
    }

    async fn resolve_server(&self, cancel: &CancellationToken) -> Result<Server> {
        if let ServerSelection::Fixed { hostname, secure } = &self.settings.server {
            if !hostname.is_empty() {
                return Ok(Server::from_hostname(hostname, *secure));
            }
        }
        // Fixed-but-empty selections fall back to the default locate endpoint.
        let settings = if matches!(self.settings.server, ServerSelection::Discover { .. }) {
            self.settings.clone()
        } else {
            let mut fallback = self.settings.clone();
            fallback.server = ServerSelection::default();
            fallback
        };
        let locator = ServerLocator::new()?;
        let servers = locator.discover(&settings, cancel).await?;
        ServerLocator::select(&servers)
            .cloned()
            .ok_or(TestError::NoServerAvailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelCounters, ChannelEvent, ChannelHandle, ChannelSender};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct NoopSender;

    #[async_trait]
    impl ChannelSender for NoopSender {
        async fn send_text(&self, _text: String) -> Result<()> {
            Ok(())
        }
        async fn send_binary(&self, _payload: Vec<u8>) -> Result<()> {
            Ok(())
        }
        async fn close(&self) {}
    }

    /// Connector whose channels open and immediately close.
    struct ImmediateCloseConnector;

    #[async_trait]
    impl ChannelConnector for ImmediateCloseConnector {
        async fn connect(&self, _url: &str, _settings: &Settings) -> Result<ChannelHandle> {
            let (tx, rx) = mpsc::channel(4);
            let _ = tx.try_send(ChannelEvent::Open);
            let _ = tx.try_send(ChannelEvent::Closed);
            std::mem::forget(tx);
            Ok(ChannelHandle {
                sender: Arc::new(NoopSender),
                events: rx,
                counters: ChannelCounters::new(),
            })
        }
    }

    /// Connector handing out one pre-scripted channel per connect, in order.
    struct SequencedConnector {
        scripts: Mutex<Vec<Vec<ChannelEvent>>>,
    }

    impl SequencedConnector {
        fn new(scripts: Vec<Vec<ChannelEvent>>) -> Self {
            Self {
                scripts: Mutex::new(scripts),
            }
        }
    }

    #[async_trait]
    impl ChannelConnector for SequencedConnector {
        async fn connect(&self, url: &str, _settings: &Settings) -> Result<ChannelHandle> {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                return Err(TestError::channel(url, "no scripted channel left"));
            }
            let script = scripts.remove(0);
            drop(scripts);
            let (tx, rx) = mpsc::channel(8);
            for event in script {
                let _ = tx.try_send(event);
            }
            std::mem::forget(tx);
            Ok(ChannelHandle {
                sender: Arc::new(NoopSender),
                events: rx,
                counters: ChannelCounters::new(),
            })
        }
    }

    /// Connector whose connect never completes.
    struct PendingConnector;

    #[async_trait]
    impl ChannelConnector for PendingConnector {
        async fn connect(&self, _url: &str, _settings: &Settings) -> Result<ChannelHandle> {
            std::future::pending().await
        }
    }

    fn fixed_settings() -> Settings {
        Settings::new().with_hostname("ndt.example.org", true)
    }

    #[test]
    fn test_running_flag_is_edge_triggered() {
        #[derive(Default)]
        struct Counter(Mutex<Vec<(Kind, bool)>>);
        impl TestObserver for Counter {
            fn running_changed(&self, kind: Kind, running: bool) {
                self.0.lock().unwrap().push((kind, running));
            }
        }

        let observer = Counter::default();
        let mut flag = RunningFlag::new(Kind::Download);
        flag.set(false, &observer);
        flag.set(true, &observer);
        flag.set(true, &observer);
        flag.set(false, &observer);
        flag.set(false, &observer);
        assert_eq!(
            observer.0.lock().unwrap().as_slice(),
            &[(Kind::Download, true), (Kind::Download, false)]
        );
    }

    #[tokio::test]
    async fn test_fixed_host_runs_without_discovery() {
        let _guard = registry::serialize_tests().await;
        let test = SpeedTest::with_connector(fixed_settings(), Arc::new(ImmediateCloseConnector));
        let result = test.start_test(true, true).await;
        assert!(result.is_ok());
        assert_eq!(test.current_server().unwrap().machine, "ndt.example.org");
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent_across_runs() {
        let _guard = registry::serialize_tests().await;
        let test = SpeedTest::with_connector(fixed_settings(), Arc::new(ImmediateCloseConnector));
        test.cancel();
        test.cancel();
        // Cancelling with nothing running leaves the next run unaffected.
        assert!(test.start_test(true, false).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_restart_on_same_instance_cancels_previous_run() {
        let _guard = registry::serialize_tests().await;
        // First run's channel opens and stays silent; the second run's
        // channel closes immediately.
        let test = Arc::new(SpeedTest::with_connector(
            fixed_settings(),
            Arc::new(SequencedConnector::new(vec![
                vec![ChannelEvent::Open],
                vec![ChannelEvent::Open, ChannelEvent::Closed],
            ])),
        ));
        let first_runner = test.clone();
        let first = tokio::spawn(async move { first_runner.start_test(true, false).await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(test.start_test(true, false).await.is_ok());

        let first_result = tokio::time::timeout(Duration::from_secs(2), first)
            .await
            .expect("previous run should end once the restart begins")
            .unwrap();
        assert!(matches!(first_result, Err(TestError::Cancelled)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_starting_a_test_cancels_the_other_instance() {
        let _guard = registry::serialize_tests().await;
        let stuck = Arc::new(SpeedTest::with_connector(
            fixed_settings(),
            Arc::new(PendingConnector),
        ));
        let stuck_clone = stuck.clone();
        let first = tokio::spawn(async move { stuck_clone.start_test(true, false).await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = SpeedTest::with_connector(fixed_settings(), Arc::new(ImmediateCloseConnector));
        assert!(second.start_test(true, false).await.is_ok());

        let first_result = first.await.unwrap();
        assert!(matches!(first_result, Err(TestError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_unblocks_pending_run() {
        let _guard = registry::serialize_tests().await;
        let test = Arc::new(SpeedTest::with_connector(
            fixed_settings(),
            Arc::new(PendingConnector),
        ));
        let test_clone = test.clone();
        let run = tokio::spawn(async move { test_clone.start_test(true, true).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        test.cancel();
        let result = run.await.unwrap();
        assert!(matches!(result, Err(TestError::Cancelled)));
    }
}
