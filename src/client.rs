use crate::config::ConnectionConfig;
use crate::connection::ConnectionManager;
use crate::error::{NadError, Result};
use crate::session::{Session, UpdateCallback};
use crate::subscription::StateReceiver;
use crate::transport::{Connector, TcpConnector};
use crate::types::{DeviceSnapshot, SessionState};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Client for a NAD receiver
///
/// The `NadClient` keeps a TCP session to the receiver's IP control
/// interface, reconnecting as needed, and mirrors the device state it reports.
/// Dropping the client closes it.
pub struct NadClient {
    manager: Arc<ConnectionManager>,
}

impl NadClient {
    /// Connect to a receiver and wait until it has identified itself
    ///
    /// Both steps together are bounded by the configured ready timeout.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use nad_amp::{ConnectionConfig, NadClient};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let client = NadClient::connect(ConnectionConfig::new("192.168.1.40")).await?;
    ///     println!("Connected to {:?}", client.model());
    ///     client.set_volume(35);
    ///     Ok(())
    /// }
    /// ```
    pub async fn connect(config: ConnectionConfig) -> Result<Self> {
        Self::builder(config).connect().await
    }

    /// Start building a client with a callback or custom connector
    pub fn builder(config: ConnectionConfig) -> ClientBuilder {
        ClientBuilder {
            config,
            connector: Arc::new(TcpConnector),
            callback: None,
        }
    }

    /// The protocol session behind this client
    pub fn session(&self) -> &Session {
        self.manager.session()
    }

    pub fn config(&self) -> &ConnectionConfig {
        self.manager.config()
    }

    /// Volume percentage, `-1` until the device has reported one
    pub fn volume(&self) -> i32 {
        self.session().volume()
    }

    /// Set the volume percentage (0 to 100)
    pub fn set_volume(&self, percent: u8) {
        self.session().set_volume(percent)
    }

    /// Volume between 0 and 1, once known
    pub fn volume_level(&self) -> Option<f64> {
        self.session().volume_level()
    }

    /// Set the volume from a level between 0 and 1
    pub fn set_volume_level(&self, level: f64) {
        self.session().set_volume_level(level)
    }

    /// Names of the enabled sources
    pub fn sources(&self) -> Vec<String> {
        self.session().sources()
    }

    /// Name of the selected source, once known
    pub fn current_source(&self) -> Option<String> {
        self.session().current_source()
    }

    /// Select a source by display name; `false` if no source has that name
    pub fn set_current_source(&self, name: &str) -> bool {
        self.session().set_current_source(name)
    }

    /// Model identifier, once reported
    pub fn model(&self) -> Option<String> {
        self.session().model()
    }

    /// Copy of all mirrored values
    pub fn snapshot(&self) -> DeviceSnapshot {
        self.session().snapshot()
    }

    pub fn is_connected(&self) -> bool {
        self.session().is_connected()
    }

    pub fn state(&self) -> SessionState {
        self.session().state()
    }

    /// Issue a raw query, e.g. `Main.Power`
    pub fn query(&self, path: &str) {
        self.session().query(path)
    }

    /// Issue a raw command, e.g. `Main.Power=On`
    pub fn command(&self, command: &str) {
        self.session().command(command)
    }

    /// Ask the device to report every attribute again
    pub fn refresh_all(&self) {
        self.session().refresh_all()
    }

    /// Wait until the device has reported its model on the current connection
    pub async fn wait_for_device_initialised(&self, timeout: Duration) -> Result<()> {
        self.session().wait_for_device_initialised(timeout).await
    }

    /// Subscribe to state updates
    ///
    /// Multiple subscriptions can be active simultaneously.
    pub fn subscribe(&self) -> StateReceiver {
        self.session().subscribe()
    }

    /// Connect now if no transport is attached
    ///
    /// Mostly useful with auto-reconnect disabled, where connection loss is
    /// not followed by a reconnect.
    pub async fn reconnect(&self) -> Result<()> {
        self.manager.reconnect().await
    }

    /// Close the connection and suspend reconnecting until `resume`
    pub fn halt(&self) {
        self.manager.halt()
    }

    /// Resume reconnecting after `halt`
    pub fn resume(&self) {
        self.manager.resume()
    }

    pub fn is_halted(&self) -> bool {
        self.manager.is_halted()
    }

    /// Close the connection and stop reconnecting for good
    pub fn close(&self) {
        self.manager.close()
    }

    pub fn is_closed(&self) -> bool {
        self.manager.is_closing()
    }

    /// Current reconnect backoff interval
    pub fn retry_interval(&self) -> Duration {
        self.manager.retry_interval()
    }
}

impl Drop for NadClient {
    fn drop(&mut self) {
        self.manager.close();
    }
}

/// Builder for [`NadClient`]
pub struct ClientBuilder {
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    callback: Option<UpdateCallback>,
}

impl ClientBuilder {
    /// Call `callback` with the raw message whenever the device state changes
    ///
    /// The callback runs on the connection's read task, so it should return
    /// quickly.
    pub fn on_update<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Use a custom connector instead of plain TCP
    pub fn connector<C: Connector>(mut self, connector: C) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    /// Connect, without waiting for the device to identify itself
    ///
    /// With auto-reconnect enabled this keeps retrying until a connection is
    /// made; otherwise the first connect error is returned.
    pub async fn start(self) -> Result<NadClient> {
        self.config.validate()?;

        let client = NadClient {
            manager: ConnectionManager::spawn(self.config, self.connector, self.callback),
        };
        client.manager.reconnect().await?;
        Ok(client)
    }

    /// Connect and wait until the device has reported its model
    ///
    /// Fails with `Timeout` if that takes longer than the configured ready
    /// timeout; see [`NadError::is_not_ready`].
    pub async fn connect(self) -> Result<NadClient> {
        self.config.validate()?;
        let timeout = self.config.ready_timeout();
        // No deadline when the timeout reaches past what `Instant` can hold
        let deadline = Instant::now().checked_add(timeout);

        let client = tokio::time::timeout(timeout, self.start())
            .await
            .map_err(|_| NadError::Timeout)??;

        let remaining = match deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => timeout,
        };
        client.wait_for_device_initialised(remaining).await?;
        Ok(client)
    }
}
