//! The envelope adapter (C7): the only layer that touches wire frames.
//!
//! `sched-engine`'s dispatcher holds the raw ends of four logical
//! streams directly as struct fields (mirroring the way the teacher's
//! event loop holds its `internal_rx` channel directly rather than
//! behind a generic trait — a `tokio::select!` loop needs disjoint
//! field borrows, not an indirection that forces two exclusive borrows
//! of the same handle). [`ChannelTransport`] is the constructor: it
//! builds the four `tokio::sync` channel pairs and hands back the
//! scheduler-side ends plus the [`ChannelTransportHandles`] a demo
//! binary uses to play the part of clients and engines.

pub mod envelope;

pub use envelope::{DepSpecWire, Envelope, Header, Status};

use sched_core::{EngineId, TaskId};
use tokio::sync::{broadcast, mpsc};

/// Tagged mirror sent to the monitor stream (spec.md §6: `intask`,
/// `outtask`, `tracktask`).
#[derive(Debug, Clone)]
pub enum MonEvent {
    InTask(Envelope),
    OutTask(Envelope),
    TaskDestination { msg_id: TaskId, engine_id: EngineId },
}

/// Registration traffic observed on the notifier stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierEvent {
    Registered(EngineId),
    Unregistered(EngineId),
}

/// The scheduler-side ends of the four streams (spec.md §6): a receiver
/// and sender for the bidirectional client stream, same for the engine
/// stream, a broadcast sender for the publish-only monitor stream, and
/// a receiver for the subscribe-only notifier stream.
pub struct TransportParts {
    pub client_rx: mpsc::Receiver<Envelope>,
    pub client_tx: mpsc::Sender<Envelope>,
    pub engine_rx: mpsc::Receiver<Envelope>,
    pub engine_tx: mpsc::Sender<(EngineId, Envelope)>,
    pub mon_tx: broadcast::Sender<MonEvent>,
    pub notifier_rx: mpsc::Receiver<NotifierEvent>,
}

/// The client/engine/monitor-facing handles for the same transport,
/// handed to simulated clients and engines (see `sched-cli`'s demo
/// binary).
pub struct ChannelTransportHandles {
    pub client_tx: mpsc::Sender<Envelope>,
    pub client_rx: mpsc::Receiver<Envelope>,
    pub engine_tx: mpsc::Sender<Envelope>,
    pub engine_dispatch_rx: mpsc::Receiver<(EngineId, Envelope)>,
    pub mon_rx: broadcast::Receiver<MonEvent>,
    pub notifier_tx: mpsc::Sender<NotifierEvent>,
}

/// Builds a connected in-process transport: `mpsc` for the two
/// bidirectional streams, `broadcast` for the publish-only monitor
/// stream, and a buffered `mpsc` for the notifier stream (registrations
/// are drained with `try_recv`, not awaited, mirroring the ZeroMQ
/// `NOBLOCK` flush in the original `scheduler.py`).
pub struct ChannelTransport;

impl ChannelTransport {
    /// `buffer` bounds each `mpsc` channel; the monitor broadcast
    /// channel uses the same bound.
    pub fn new(buffer: usize) -> (TransportParts, ChannelTransportHandles) {
        let (client_tx, client_rx) = mpsc::channel(buffer);
        let (client_reply_tx, client_reply_rx) = mpsc::channel(buffer);
        let (engine_dispatch_tx, engine_dispatch_rx) = mpsc::channel(buffer);
        let (engine_tx, engine_rx) = mpsc::channel(buffer);
        let (mon_tx, mon_rx) = broadcast::channel(buffer.max(1));
        let (notifier_tx, notifier_rx) = mpsc::channel(buffer);

        let parts = TransportParts {
            client_rx,
            client_tx: client_reply_tx,
            engine_rx,
            engine_tx: engine_dispatch_tx,
            mon_tx,
            notifier_rx,
        };
        let handles = ChannelTransportHandles {
            client_tx,
            client_rx: client_reply_rx,
            engine_tx,
            engine_dispatch_rx,
            mon_rx,
            notifier_tx,
        };
        (parts, handles)
    }
}

/// Drains every currently-queued notifier event without blocking.
/// Grounded on spec.md §4.5.1 step 1: "flush the notifier stream"
/// happens synchronously at the top of submission handling.
pub fn drain_notifier(rx: &mut mpsc::Receiver<NotifierEvent>) -> Vec<NotifierEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = rx.try_recv() {
        drained.push(event);
    }
    drained
}

#[cfg(test)]
mod tests {
    use super::*;
    use sched_core::TaskId;

    #[tokio::test]
    async fn client_round_trip_delivers_envelope() {
        let (mut parts, mut handles) = ChannelTransport::new(8);

        handles
            .client_tx
            .send(Envelope::new(vec![b"c1".to_vec()], Header::submission("t1"), vec![]))
            .await
            .unwrap();
        let received = parts.client_rx.recv().await.unwrap();
        assert_eq!(received.header.msg_id, TaskId::new("t1"));

        parts
            .client_tx
            .send(Envelope::new(vec![b"c1".to_vec()], Header::submission("t1"), vec![]))
            .await
            .unwrap();
        let reply = handles.client_rx.recv().await.unwrap();
        assert_eq!(reply.header.msg_id, TaskId::new("t1"));
    }

    #[tokio::test]
    async fn notifier_drain_is_nonblocking_and_empties_queue() {
        let (mut parts, handles) = ChannelTransport::new(8);
        let e1 = EngineId::from("e1");
        handles
            .notifier_tx
            .send(NotifierEvent::Registered(e1.clone()))
            .await
            .unwrap();

        let drained = drain_notifier(&mut parts.notifier_rx);
        assert_eq!(drained, vec![NotifierEvent::Registered(e1)]);
        assert!(drain_notifier(&mut parts.notifier_rx).is_empty());
    }

    #[tokio::test]
    async fn engine_dispatch_carries_target_identity() {
        let (parts, mut handles) = ChannelTransport::new(8);
        let e1 = EngineId::from("e1");
        parts
            .engine_tx
            .send((e1.clone(), Envelope::new(vec![], Header::submission("t1"), vec![])))
            .await
            .unwrap();

        let (engine, env) = handles.engine_dispatch_rx.recv().await.unwrap();
        assert_eq!(engine, e1);
        assert_eq!(env.header.msg_id, TaskId::new("t1"));
    }

    #[tokio::test]
    async fn mon_publish_with_no_subscribers_does_not_error() {
        let (parts, _handles) = ChannelTransport::new(8);
        let _ = parts.mon_tx.send(MonEvent::TaskDestination {
            msg_id: TaskId::new("t1"),
            engine_id: EngineId::from("e1"),
        });
    }
}
