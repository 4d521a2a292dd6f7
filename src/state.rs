use crate::protocol::Message;
use crate::types::{DeviceSnapshot, Source, SourceKey, UNKNOWN_VOLUME};
use std::collections::BTreeMap;

/// Result of applying one message to the mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The message repeated a known value
    Unchanged,
    /// A mirrored value changed
    Changed,
    /// The device reported its model
    Initialised,
}

/// Source attribute carried by a `Source<N>.<attr>=` message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceAttr {
    Name(String),
    Enabled(bool),
}

/// Last known values reported by the receiver.
///
/// Values are only replaced when the device reports something different, so
/// each `apply_*` call tells the caller whether a notification is due.
#[derive(Debug, Clone)]
pub struct DeviceState {
    model: Option<String>,
    volume: i32,
    sources: BTreeMap<SourceKey, Source>,
    current_source: Option<SourceKey>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            model: None,
            volume: UNKNOWN_VOLUME,
            sources: BTreeMap::new(),
            current_source: None,
        }
    }
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one parsed message
    pub fn apply(&mut self, message: Message) -> Outcome {
        let changed = match message {
            Message::Volume(volume) => self.apply_volume(volume),
            Message::Model(model) => {
                self.apply_model(model);
                return Outcome::Initialised;
            }
            Message::Source(key) => self.apply_source(key),
            Message::SourceName(key, name) => self.apply_source_attr(key, SourceAttr::Name(name)),
            Message::SourceEnabled(key, enabled) => {
                self.apply_source_attr(key, SourceAttr::Enabled(enabled))
            }
        };

        if changed {
            Outcome::Changed
        } else {
            Outcome::Unchanged
        }
    }

    /// Store the volume; returns whether it changed
    pub fn apply_volume(&mut self, volume: i32) -> bool {
        if volume == self.volume {
            return false;
        }
        self.volume = volume;
        true
    }

    /// Store the model.
    ///
    /// Not a change notification: the model is reported on every heartbeat
    /// and only signals that the device is initialised.
    pub fn apply_model(&mut self, model: String) {
        self.model = Some(model);
    }

    /// Store the current source; returns whether it changed
    pub fn apply_source(&mut self, key: SourceKey) -> bool {
        if self.current_source == Some(key) {
            return false;
        }
        self.current_source = Some(key);
        true
    }

    /// Update one attribute of a source, creating the entry on first mention
    pub fn apply_source_attr(&mut self, key: SourceKey, attr: SourceAttr) -> bool {
        let source = self.sources.entry(key).or_default();
        match attr {
            SourceAttr::Name(name) => {
                if source.name == name {
                    return false;
                }
                source.name = name;
            }
            SourceAttr::Enabled(enabled) => {
                if source.enabled == enabled {
                    return false;
                }
                source.enabled = enabled;
            }
        }
        true
    }

    /// Model identifier, once reported
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Volume percentage, or `UNKNOWN_VOLUME`
    pub fn volume(&self) -> i32 {
        self.volume
    }

    pub fn current_source(&self) -> Option<SourceKey> {
        self.current_source
    }

    pub fn source(&self, key: SourceKey) -> Option<&Source> {
        self.sources.get(&key)
    }

    /// Names of enabled sources in source-number order
    pub fn enabled_source_names(&self) -> Vec<String> {
        self.sources
            .values()
            .filter(|source| source.enabled)
            .map(|source| source.name.clone())
            .collect()
    }

    /// Name of the current source.
    ///
    /// `None` while the current key has no entry or an empty name, which is
    /// normal right after `Main.Source=` and before the source's own lines.
    pub fn current_source_name(&self) -> Option<String> {
        let key = self.current_source?;
        self.sources
            .get(&key)
            .filter(|source| !source.name.is_empty())
            .map(|source| source.name.clone())
    }

    /// First source whose display name matches
    pub fn source_key_for_name(&self, name: &str) -> Option<SourceKey> {
        self.sources
            .iter()
            .find(|(_, source)| source.name == name)
            .map(|(key, _)| *key)
    }

    /// Copy of the mirrored values
    pub fn snapshot(&self, connected: bool) -> DeviceSnapshot {
        DeviceSnapshot {
            model: self.model.clone(),
            volume: self.volume,
            sources: self.sources.clone(),
            current_source: self.current_source,
            connected,
        }
    }
}
