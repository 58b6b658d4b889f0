use std::fmt;

use serde::{Deserialize, Serialize};

/// A client-assigned, globally-unique identifier for one task submission.
///
/// Opaque: the scheduler never parses or generates these, only compares
/// and hashes them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The routing identity of a connected engine: an opaque byte string, as
/// assigned by the transport layer (e.g. a ROUTER socket's peer identity).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EngineId(Vec<u8>);

impl EngineId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => f.write_str(s),
            Err(_) => write!(f, "{}", hex_encode(&self.0)),
        }
    }
}

impl From<&str> for EngineId {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_id_displays_utf8_when_possible() {
        let id = EngineId::from("engine-1");
        assert_eq!(id.to_string(), "engine-1");
    }

    #[test]
    fn engine_id_displays_hex_for_non_utf8() {
        let id = EngineId::new(vec![0xff, 0x00, 0xab]);
        assert_eq!(id.to_string(), "ff00ab");
    }

    #[test]
    fn task_id_equality_is_by_value() {
        assert_eq!(TaskId::new("t1"), TaskId::from("t1"));
    }
}
