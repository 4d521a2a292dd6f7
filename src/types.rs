use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Identifier of one attached transport (a single TCP session)
pub type TransportId = Uuid;

/// Volume value reported before the device has sent one
pub const UNKNOWN_VOLUME: i32 = -1;

/// Input source key, e.g. `Source2` on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceKey(pub u32);

impl SourceKey {
    /// Numeric suffix used by `Main.Source=<n>`
    pub fn number(self) -> u32 {
        self.0
    }

    /// Parse the canonical `Source<N>` form.
    ///
    /// Padded numbers such as `Source02` are rejected: they would collide
    /// with `Source2` and can never be selected by `Main.Source=<n>`.
    pub fn parse(text: &str) -> Option<Self> {
        let digits = text.strip_prefix("Source")?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if digits.len() > 1 && digits.starts_with('0') {
            return None;
        }
        digits.parse().ok().map(SourceKey)
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Source{}", self.0)
    }
}

/// Input source information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Display name configured on the receiver
    pub name: String,

    /// Whether the source is enabled for selection
    pub enabled: bool,
}

/// Lifecycle of the protocol session for the current transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No transport attached
    Disconnected,
    /// Transport attached, nothing sent yet
    Connected,
    /// Query-all issued, waiting for the model to be reported
    Initializing,
    /// Model received since the transport attached
    Ready,
}

/// Copy of the mirrored device state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub model: Option<String>,
    pub volume: i32,
    pub sources: BTreeMap<SourceKey, Source>,
    pub current_source: Option<SourceKey>,
    pub connected: bool,
}

impl DeviceSnapshot {
    /// Name of the current source, if it is known
    pub fn current_source_name(&self) -> Option<&str> {
        let key = self.current_source?;
        self.sources
            .get(&key)
            .map(|source| source.name.as_str())
            .filter(|name| !name.is_empty())
    }
}
