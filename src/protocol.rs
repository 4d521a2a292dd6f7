//! Wire codec for the NAD IP-control protocol.
//!
//! The protocol is ASCII text, one `Path=Value` assignment per
//! newline-terminated line in both directions. Queries are the path followed
//! by `?`.

use crate::types::SourceKey;

/// Path queried by the heartbeat; its reply also marks the device as ready
pub const MODEL_PATH: &str = "Main.Model";

/// Querying the empty path makes the device report every attribute
pub const REFRESH_ALL_PATH: &str = "";

/// Line delimiter in both directions
pub const DELIMITER: u8 = b'\n';

/// Longest partial line kept while waiting for its delimiter
pub const MAX_LINE_LENGTH: usize = 4096;

const VOLUME_PREFIX: &str = "Main.VolumePercent=";
const MODEL_PREFIX: &str = "Main.Model=";
const SOURCE_PREFIX: &str = "Main.Source=";

/// One parsed inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// `Main.VolumePercent=<int>`
    Volume(i32),
    /// `Main.Model=<string>`
    Model(String),
    /// `Main.Source=<int>`
    Source(SourceKey),
    /// `Source<N>.Name=<string>`
    SourceName(SourceKey, String),
    /// `Source<N>.Enabled=<Yes|No>`
    SourceEnabled(SourceKey, bool),
}

impl Message {
    /// Parse a single framed line.
    ///
    /// Returns `None` for anything unrecognised, including values that fail
    /// to parse, so newer firmware attributes are ignored rather than
    /// treated as errors.
    pub fn parse(line: &str) -> Option<Self> {
        if let Some(value) = line.strip_prefix(VOLUME_PREFIX) {
            return value.trim().parse().ok().map(Message::Volume);
        }
        if let Some(value) = line.strip_prefix(MODEL_PREFIX) {
            return Some(Message::Model(value.to_string()));
        }
        if let Some(value) = line.strip_prefix(SOURCE_PREFIX) {
            return value.trim().parse().ok().map(|n| Message::Source(SourceKey(n)));
        }

        let (path, value) = line.split_once('=')?;
        let (source, property) = path.split_once('.')?;
        let key = SourceKey::parse(source)?;
        match property {
            "Name" => Some(Message::SourceName(key, value.to_string())),
            "Enabled" => Some(Message::SourceEnabled(key, value == "Yes")),
            _ => None,
        }
    }
}

/// Terminate a raw command and encode it for the wire
pub fn encode_command(command: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(command.len() + 1);
    bytes.extend_from_slice(command.as_bytes());
    bytes.push(DELIMITER);
    bytes
}

/// Encode a query for an attribute path
pub fn encode_query(path: &str) -> Vec<u8> {
    encode_command(&format!("{}?", path))
}

/// Command setting the volume percentage
pub fn volume_command(percent: u8) -> String {
    format!("{}{}", VOLUME_PREFIX, percent)
}

/// Command selecting an input source
pub fn source_command(key: SourceKey) -> String {
    format!("{}{}", SOURCE_PREFIX, key.number())
}

/// Splits the inbound byte stream into lines.
///
/// Reads are not aligned to lines: a single read may carry several messages
/// and a message may be split over several reads, so the incomplete tail is
/// kept until its delimiter arrives.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    /// Create an empty framer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes and return every complete, non-empty line
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(data);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == DELIMITER) {
            let end = start + offset;
            let line = String::from_utf8_lossy(&self.buffer[start..end]);
            let line = line.trim_end_matches('\r');
            if !line.is_empty() {
                lines.push(line.to_string());
            }
            start = end + 1;
        }
        self.buffer.drain(..start);

        if self.buffer.len() > MAX_LINE_LENGTH {
            tracing::warn!(
                "Discarding {} bytes without a line delimiter",
                self.buffer.len()
            );
            self.buffer.clear();
        }

        lines
    }

    /// Bytes waiting for a delimiter
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
