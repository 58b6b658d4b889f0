use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use sched_core::{EngineId, TaskId};

/// Wire shape of a dependency predicate (C1's serialized form).
///
/// Carries no behavior of its own — `sched-engine`'s `DepSpec` is built
/// from this at the boundary and converted back for outgoing headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepSpecWire {
    pub ids: Vec<TaskId>,
    pub all: bool,
    pub success: bool,
    pub failure: bool,
}

impl DepSpecWire {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Outcome reported on an engine's reply header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Ok,
    Error(String),
}

/// Decoded message header (spec.md §3/§6). Field names mirror the wire
/// vocabulary so logs and monitor mirrors read the same way the protocol
/// does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub msg_id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<HashSet<EngineId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<DepSpecWire>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow: Option<DepSpecWire>,
    #[serde(default)]
    pub retries: u32,
    /// Timeout in seconds, relative to submission time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default = "default_true")]
    pub dependencies_met: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

fn default_true() -> bool {
    true
}

impl Header {
    /// A fresh submission header with no dependencies and no reply state.
    pub fn submission(msg_id: impl Into<TaskId>) -> Self {
        Self {
            msg_id: msg_id.into(),
            targets: None,
            after: None,
            follow: None,
            retries: 0,
            timeout: None,
            dependencies_met: true,
            status: None,
        }
    }

    pub fn with_after(mut self, after: DepSpecWire) -> Self {
        self.after = Some(after);
        self
    }

    pub fn with_follow(mut self, follow: DepSpecWire) -> Self {
        self.follow = Some(follow);
        self
    }

    pub fn with_targets(mut self, targets: HashSet<EngineId>) -> Self {
        self.targets = Some(targets);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout = Some(timeout_secs);
        self
    }
}

/// The wire-level unit that moves across a stream: routing identity
/// frames plus a decoded header and an opaque payload. The scheduler
/// never looks inside `body`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Routing-identity frames, leading-frame-first. For a client
    /// submission this is just the client's identity; for an engine
    /// reply it is `[engine_id]` until the adapter prepends the client's
    /// identity back on for the return trip.
    pub identities: Vec<Vec<u8>>,
    pub header: Header,
    pub body: Vec<u8>,
}

impl Envelope {
    pub fn new(identities: Vec<Vec<u8>>, header: Header, body: Vec<u8>) -> Self {
        Self {
            identities,
            header,
            body,
        }
    }

    /// Swaps the first two routing frames so a client identity leads
    /// and the engine identity follows, per spec.md §6's reply-routing
    /// convention.
    pub fn swap_routing_frames(&mut self) {
        if self.identities.len() >= 2 {
            self.identities.swap(0, 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_routing_frames_swaps_first_two_only() {
        let mut env = Envelope::new(
            vec![b"client".to_vec(), b"engine".to_vec(), b"extra".to_vec()],
            Header::submission("t1"),
            vec![],
        );
        env.swap_routing_frames();
        assert_eq!(
            env.identities,
            vec![b"engine".to_vec(), b"client".to_vec(), b"extra".to_vec()]
        );
    }

    #[test]
    fn swap_routing_frames_is_noop_with_fewer_than_two_frames() {
        let mut env = Envelope::new(vec![b"only".to_vec()], Header::submission("t1"), vec![]);
        env.swap_routing_frames();
        assert_eq!(env.identities, vec![b"only".to_vec()]);
    }

    #[test]
    fn header_builder_sets_fields() {
        let h = Header::submission("t1")
            .with_retries(3)
            .with_timeout(30);
        assert_eq!(h.retries, 3);
        assert_eq!(h.timeout, Some(30));
        assert!(h.dependencies_met);
    }
}
