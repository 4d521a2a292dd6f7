use crate::backoff::Backoff;
use crate::config::ConnectionConfig;
use crate::error::{NadError, Result};
use crate::session::{signalled, Session, UpdateCallback};
use crate::transport::Connector;
use crate::types::TransportId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;

/// How often a halted manager checks whether it has been resumed
const HALT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Keeps the session attached to a live transport.
///
/// Owns the reconnect loop, its backoff, and the halt/close flags. A
/// supervisor task listens for transport loss and re-enters the loop.
pub(crate) struct ConnectionManager {
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    session: Session,
    backoff: Mutex<Backoff>,
    halted: AtomicBool,
    closing: watch::Sender<bool>,
    /// Held for the whole reconnect loop so only one runs at a time
    reconnect_gate: tokio::sync::Mutex<()>,
}

impl ConnectionManager {
    /// Create the manager and its session, and start the supervisor task
    pub(crate) fn spawn(
        config: ConnectionConfig,
        connector: Arc<dyn Connector>,
        callback: Option<UpdateCallback>,
    ) -> Arc<Self> {
        let (lost_tx, lost_rx) = mpsc::unbounded_channel();
        let (closing, _) = watch::channel(false);

        let manager = Arc::new(Self {
            config,
            connector,
            session: Session::new(callback, lost_tx),
            backoff: Mutex::new(Backoff::new()),
            halted: AtomicBool::new(false),
            closing,
            reconnect_gate: tokio::sync::Mutex::new(()),
        });

        tokio::spawn(supervise(manager.clone(), lost_rx));
        manager
    }

    pub(crate) fn session(&self) -> &Session {
        &self.session
    }

    pub(crate) fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn backoff(&self) -> MutexGuard<'_, Backoff> {
        self.backoff.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delay that will follow the next failed attempt's growth
    pub(crate) fn retry_interval(&self) -> Duration {
        self.backoff().interval()
    }

    pub(crate) fn is_closing(&self) -> bool {
        *self.closing.borrow()
    }

    pub(crate) fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Connect to the receiver and keep trying until it works.
    ///
    /// Returns early if a transport is already attached. Fails with
    /// `Closed` once the manager is closing, and with the connect error when
    /// auto-reconnect is disabled.
    pub(crate) async fn reconnect(&self) -> Result<()> {
        let _gate = self.reconnect_gate.lock().await;
        let mut closing = self.closing.subscribe();

        loop {
            if self.is_closing() {
                return Err(NadError::Closed);
            }
            if self.session.is_connected() {
                return Ok(());
            }

            if self.is_halted() {
                if !self.config.auto_reconnect {
                    return Err(NadError::Halted);
                }
                tokio::select! {
                    _ = signalled(&mut closing) => {}
                    _ = sleep(HALT_POLL_INTERVAL) => {}
                }
                continue;
            }

            tracing::debug!(
                "Connecting to NAD at {}:{}",
                self.config.host,
                self.config.port
            );
            let attempt = tokio::select! {
                _ = signalled(&mut closing) => return Err(NadError::Closed),
                attempt = self.connector.connect(&self.config.host, self.config.port) => attempt,
            };

            match attempt {
                Ok(transport) => {
                    self.backoff().reset();
                    let id = self.session.attach(transport);
                    tracing::info!(
                        transport = %id,
                        "Connected to NAD at {}:{}",
                        self.config.host,
                        self.config.port
                    );

                    // close() or halt() may have run while we were attaching
                    if self.is_closing() {
                        self.session.disconnect();
                        return Err(NadError::Closed);
                    }
                    if self.is_halted() {
                        self.session.disconnect();
                    }
                    return Ok(());
                }
                Err(e) => {
                    let interval = self.backoff().grow();
                    tracing::warn!(
                        "Connecting failed ({}), retrying in {:.2} seconds",
                        e,
                        interval.as_secs_f64()
                    );
                    if !self.config.auto_reconnect || self.is_closing() {
                        return Err(e.into());
                    }
                    tokio::select! {
                        _ = signalled(&mut closing) => return Err(NadError::Closed),
                        _ = sleep(interval) => {}
                    }
                }
            }
        }
    }

    /// Close the connection and wait for `resume`
    pub(crate) fn halt(&self) {
        tracing::warn!("Halting connection to NAD");
        self.halted.store(true, Ordering::SeqCst);
        self.session.disconnect();
    }

    /// Allow reconnect attempts again after `halt`
    pub(crate) fn resume(&self) {
        tracing::warn!("Resuming connection to NAD");
        self.halted.store(false, Ordering::SeqCst);
    }

    /// Close the connection for good
    pub(crate) fn close(&self) {
        tracing::debug!("Closing connection to NAD");
        self.closing.send_replace(true);
        self.session.disconnect();
    }
}

/// Re-enter the reconnect loop whenever the session loses its transport
async fn supervise(manager: Arc<ConnectionManager>, mut lost_rx: mpsc::UnboundedReceiver<TransportId>) {
    let mut closing = manager.closing.subscribe();

    loop {
        let lost = tokio::select! {
            _ = signalled(&mut closing) => break,
            lost = lost_rx.recv() => lost,
        };
        let Some(id) = lost else {
            break;
        };

        tracing::debug!(transport = %id, "Transport lost");
        if !manager.config.auto_reconnect || manager.is_closing() {
            continue;
        }

        match manager.reconnect().await {
            Ok(()) => {}
            Err(NadError::Closed) => break,
            Err(e) => tracing::warn!("Reconnect failed: {}", e),
        }
    }

    tracing::debug!("Connection supervisor stopped");
}
