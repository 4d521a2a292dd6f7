use crate::error::{NadError, Result};
use crate::protocol::{self, LineFramer, Message, MODEL_PATH, REFRESH_ALL_PATH};
use crate::state::{DeviceState, Outcome};
use crate::subscription::{StateReceiver, StateUpdate};
use crate::transport::BoxedTransport;
use crate::types::{DeviceSnapshot, SessionState, TransportId};
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{sleep, Instant};
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const WATCHDOG_PERIOD: Duration = Duration::from_secs(1);
const IDLE_TIMEOUT: Duration = Duration::from_secs(10);
const READ_BUFFER_SIZE: usize = 4096;

/// Called with the raw message text whenever a message changes the mirrored state
pub type UpdateCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// The attached transport
struct Link {
    id: TransportId,
    /// Outgoing lines, drained by the write task
    writer: mpsc::UnboundedSender<Vec<u8>>,
    /// Set once to stop every task scoped to this transport
    shutdown: watch::Sender<bool>,
}

/// Everything the read, heartbeat and watchdog tasks share
struct Shared {
    device: DeviceState,
    state: SessionState,
    last_received: Instant,
    link: Option<Link>,
}

struct SessionInner {
    shared: Mutex<Shared>,
    /// Device-ready gate
    ready_tx: watch::Sender<bool>,
    update_tx: broadcast::Sender<StateUpdate>,
    callback: Option<UpdateCallback>,
    /// Loss notifications for the connection manager
    lost_tx: mpsc::UnboundedSender<TransportId>,
}

/// Protocol session with the receiver.
///
/// Owns the device state mirror and whichever transport is currently
/// attached. The same session is re-attached to each new transport after a
/// reconnect, so mirrored values survive connection loss.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub(crate) fn new(
        callback: Option<UpdateCallback>,
        lost_tx: mpsc::UnboundedSender<TransportId>,
    ) -> Self {
        let (ready_tx, _) = watch::channel(false);
        let (update_tx, _) = broadcast::channel(100);

        Self {
            inner: Arc::new(SessionInner {
                shared: Mutex::new(Shared {
                    device: DeviceState::new(),
                    state: SessionState::Disconnected,
                    last_received: Instant::now(),
                    link: None,
                }),
                ready_tx,
                update_tx,
                callback,
                lost_tx,
            }),
        }
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.inner
            .shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a freshly connected transport and start its tasks
    pub(crate) fn attach(&self, transport: BoxedTransport) -> TransportId {
        let id = Uuid::new_v4();
        let (reader, writer) = tokio::io::split(transport);
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let previous = {
            let mut shared = self.shared();
            shared.state = SessionState::Connected;
            shared.last_received = Instant::now();
            shared.link.replace(Link {
                id,
                writer: write_tx,
                shutdown: shutdown_tx,
            })
        };
        if let Some(previous) = previous {
            tracing::warn!(transport = %previous.id, "Replacing attached transport");
            previous.shutdown.send_replace(true);
        }
        self.inner.ready_tx.send_replace(false);

        tracing::info!(transport = %id, "Connection established to NAD");

        tokio::spawn(write_loop(self.clone(), id, writer, write_rx, shutdown_rx.clone()));
        tokio::spawn(read_loop(self.clone(), id, reader, shutdown_rx.clone()));
        self.refresh_all();
        tokio::spawn(heartbeat(self.clone(), shutdown_rx.clone()));
        tokio::spawn(watchdog(self.clone(), id, shutdown_rx));

        id
    }

    /// Close the current transport, if any.
    ///
    /// Loss handling runs from the read task once it has stopped.
    pub(crate) fn disconnect(&self) {
        if let Some(link) = &self.shared().link {
            link.shutdown.send_replace(true);
        }
    }

    /// Close the transport `id` if it is still the attached one
    fn close_transport(&self, id: TransportId) {
        if let Some(link) = self.shared().link.as_ref().filter(|link| link.id == id) {
            link.shutdown.send_replace(true);
        }
    }

    /// Apply a burst of framed lines in arrival order
    fn data_received(&self, lines: Vec<String>) {
        let mut updates = Vec::new();
        {
            let mut shared = self.shared();
            shared.last_received = Instant::now();

            for line in lines {
                tracing::debug!("assembled message {}", line);
                let Some(message) = Message::parse(&line) else {
                    continue;
                };

                match shared.device.apply(message) {
                    Outcome::Changed => updates.push(StateUpdate::Changed(line)),
                    Outcome::Initialised => {
                        self.inner.ready_tx.send_replace(true);
                        if shared.state != SessionState::Ready {
                            shared.state = SessionState::Ready;
                            let model = shared.device.model().unwrap_or_default().to_string();
                            tracing::debug!("device is initialised: {}", model);
                            updates.push(StateUpdate::Initialised(model));
                        }
                    }
                    Outcome::Unchanged => {}
                }
            }
        }

        // Outside the lock so callbacks can read state back
        for update in updates {
            self.publish(update);
        }
    }

    fn publish(&self, update: StateUpdate) {
        if let (StateUpdate::Changed(message), Some(callback)) = (&update, &self.inner.callback) {
            // A panicking callback must not take the read task down with it
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(message))) {
                tracing::error!(
                    "Update callback panicked on {}: {}",
                    message,
                    panic_message(payload.as_ref())
                );
            }
        }
        let _ = self.inner.update_tx.send(update);
    }

    /// Loss handling, run once per transport by its read task
    fn connection_lost(&self, id: TransportId, error: Option<io::Error>) {
        let link = {
            let mut shared = self.shared();
            if shared.link.as_ref().map(|link| link.id) != Some(id) {
                return;
            }
            shared.state = SessionState::Disconnected;
            shared.link.take()
        };
        if let Some(link) = link {
            link.shutdown.send_replace(true);
        }
        self.inner.ready_tx.send_replace(false);

        tracing::warn!(transport = %id, "Lost connection to receiver");
        if let Some(e) = error {
            tracing::debug!("{}", e);
        }

        let _ = self.inner.lost_tx.send(id);
    }

    fn idle_for(&self) -> Duration {
        self.shared().last_received.elapsed()
    }

    /// Wait until the device has reported its model on the current transport
    pub async fn wait_for_device_initialised(&self, timeout: Duration) -> Result<()> {
        let mut ready = self.inner.ready_tx.subscribe();
        match tokio::time::timeout(timeout, signalled(&mut ready)).await {
            Ok(()) => {
                tracing::debug!("device is initialised");
                Ok(())
            }
            Err(_) => Err(NadError::Timeout),
        }
    }

    /// Ask the device to report every attribute
    pub fn refresh_all(&self) {
        tracing::debug!("Sending out query for all attributes");
        {
            let mut shared = self.shared();
            if shared.link.is_none() {
                tracing::warn!("Lost connection to receiver while refreshing device");
                return;
            }
            if shared.state == SessionState::Connected {
                shared.state = SessionState::Initializing;
            }
        }
        self.query(REFRESH_ALL_PATH);
    }

    /// Issue a raw query for an attribute path.
    ///
    /// The answer arrives as a normal state message; nothing is returned here.
    pub fn query(&self, path: &str) {
        self.transmit(protocol::encode_query(path));
    }

    /// Issue a raw command, e.g. `Main.Power=On`
    pub fn command(&self, command: &str) {
        self.transmit(protocol::encode_command(command));
    }

    /// Queue bytes for the write task. Failures are logged, never returned:
    /// the protocol has no acknowledgement to report back anyway.
    fn transmit(&self, bytes: Vec<u8>) {
        tracing::debug!("> {}", String::from_utf8_lossy(&bytes).trim_end());

        let shared = self.shared();
        let Some(link) = &shared.link else {
            tracing::warn!("No transport found, unable to send command");
            return;
        };
        if link.writer.send(bytes).is_err() {
            tracing::warn!("Transport closed, unable to send command");
        }
    }

    /// Volume percentage, `-1` until the device has reported one
    pub fn volume(&self) -> i32 {
        self.shared().device.volume()
    }

    /// Set the volume percentage (values above 100 are clamped)
    pub fn set_volume(&self, percent: u8) {
        self.command(&protocol::volume_command(percent.min(100)));
    }

    /// Volume between 0 and 1, once known
    pub fn volume_level(&self) -> Option<f64> {
        let volume = self.volume();
        (volume >= 0).then(|| f64::from(volume) / 100.0)
    }

    /// Set the volume from a level between 0 and 1
    pub fn set_volume_level(&self, level: f64) {
        if !level.is_finite() {
            tracing::warn!("Ignoring volume level {}", level);
            return;
        }
        let percent = (level.clamp(0.0, 1.0) * 100.0).round() as u8;
        self.set_volume(percent);
    }

    /// Names of the enabled sources
    pub fn sources(&self) -> Vec<String> {
        self.shared().device.enabled_source_names()
    }

    /// Name of the selected source, once its name is known
    pub fn current_source(&self) -> Option<String> {
        self.shared().device.current_source_name()
    }

    /// Select a source by display name.
    ///
    /// Returns `false` without sending anything if no source has that name.
    pub fn set_current_source(&self, name: &str) -> bool {
        let key = self.shared().device.source_key_for_name(name);
        match key {
            Some(key) => {
                self.command(&protocol::source_command(key));
                true
            }
            None => {
                tracing::debug!("No source named {}", name);
                false
            }
        }
    }

    /// Model identifier, once reported
    pub fn model(&self) -> Option<String> {
        self.shared().device.model().map(str::to_string)
    }

    pub fn is_connected(&self) -> bool {
        self.shared().link.is_some()
    }

    pub fn state(&self) -> SessionState {
        self.shared().state
    }

    /// Copy of all mirrored values
    pub fn snapshot(&self) -> DeviceSnapshot {
        let shared = self.shared();
        shared.device.snapshot(shared.link.is_some())
    }

    /// Subscribe to state updates
    pub fn subscribe(&self) -> StateReceiver {
        StateReceiver::new(self.inner.update_tx.subscribe())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// Resolves once the flag is set or its sender is gone
pub(crate) async fn signalled(flag: &mut watch::Receiver<bool>) {
    let _ = flag.wait_for(|set| *set).await;
}

async fn read_loop(
    session: Session,
    id: TransportId,
    mut reader: ReadHalf<BoxedTransport>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut framer = LineFramer::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    // The next read only starts once the previous burst has been applied
    let error = loop {
        tokio::select! {
            _ = signalled(&mut shutdown) => break None,
            read = reader.read(&mut buf) => match read {
                Ok(0) => break None,
                Ok(n) => session.data_received(framer.push(&buf[..n])),
                Err(e) => break Some(e),
            },
        }
    };

    session.connection_lost(id, error);
}

async fn write_loop(
    session: Session,
    id: TransportId,
    mut writer: WriteHalf<BoxedTransport>,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let bytes = tokio::select! {
            _ = signalled(&mut shutdown) => break,
            bytes = rx.recv() => bytes,
        };
        let Some(bytes) = bytes else {
            break;
        };

        if let Err(e) = writer.write_all(&bytes).await {
            tracing::error!("Failed to send command: {}", e);
            session.close_transport(id);
            break;
        }
    }

    let _ = writer.shutdown().await;
}

async fn heartbeat(session: Session, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = signalled(&mut shutdown) => break,
            _ = sleep(HEARTBEAT_INTERVAL) => session.query(MODEL_PATH),
        }
    }
}

async fn watchdog(session: Session, id: TransportId, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = signalled(&mut shutdown) => break,
            _ = sleep(WATCHDOG_PERIOD) => {
                if session.idle_for() > IDLE_TIMEOUT {
                    tracing::warn!(transport = %id, "Connection closed due to inactivity");
                    session.close_transport(id);
                    break;
                }
            }
        }
    }
}
