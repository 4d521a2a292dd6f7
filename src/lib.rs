//! Rust library for controlling NAD receivers over their IP control interface
//!
//! This library keeps a persistent TCP session to a NAD receiver and mirrors
//! the state the receiver reports. It supports:
//!
//! - Automatic reconnection with backoff
//! - Dead-connection detection (heartbeat and inactivity watchdog)
//! - Volume and source control
//! - Change notifications via callback or subscription
//! - Halting and resuming the connection
//!
//! # Quick Start
//!
//! ```no_run
//! use nad_amp::{ConnectionConfig, NadClient, StateUpdate};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = NadClient::builder(ConnectionConfig::new("192.168.1.40"))
//!         .on_update(|message| println!("changed: {}", message))
//!         .connect()
//!         .await?;
//!
//!     println!("Model: {:?}", client.model());
//!     println!("Sources: {:?}", client.sources());
//!
//!     client.set_current_source("Phono");
//!     client.set_volume_level(0.3);
//!
//!     let mut updates = client.subscribe();
//!     while let Ok(update) = updates.recv().await {
//!         if let StateUpdate::Changed(message) = update {
//!             println!("State update: {}", message);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Client**: public facade and builder
//! - **Connection**: reconnect loop, backoff, halt/resume/close
//! - **Session**: one transport's read, write, heartbeat and watchdog tasks
//! - **State**: mirror of the device's last reported values
//! - **Protocol**: line framing, message parsing and command encoding
//! - **Transport**: connector abstraction (TCP by default)

mod backoff;
mod client;
mod config;
mod connection;
mod error;
mod protocol;
mod session;
mod state;
mod subscription;
mod transport;
mod types;

// Public exports
pub use backoff::{Backoff, BACKOFF_FLOOR, MAX_BACKOFF};
pub use client::{ClientBuilder, NadClient};
pub use config::{ConnectionConfig, DEFAULT_PORT};
pub use error::{NadError, Result};
pub use protocol::{encode_command, encode_query, LineFramer, Message, MODEL_PATH};
pub use session::{Session, UpdateCallback};
pub use state::{DeviceState, Outcome, SourceAttr};
pub use subscription::{StateReceiver, StateUpdate};
pub use transport::{BoxedTransport, Connector, TcpConnector, Transport};
pub use types::{
    DeviceSnapshot, SessionState, Source, SourceKey, TransportId, UNKNOWN_VOLUME,
};
