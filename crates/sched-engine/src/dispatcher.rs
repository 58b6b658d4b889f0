//! C6: the dispatcher — the top-level event handlers wired into a
//! single-threaded cooperative event loop (spec.md §5).

use std::collections::HashSet;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;

use sched_core::{EngineId, SchedulerConfig, SchedulerError, TaskId};
use sched_transport::{self as transport, Envelope, MonEvent, NotifierEvent, Status, TransportParts};

use crate::dep::DepSpec;
use crate::graph::DependencyGraph;
use crate::policy::LoadPolicy;
use crate::registry::EngineRegistry;
use crate::task::{TaskRecord, TaskTable};

enum MaybeRunOutcome {
    Placed(Vec<usize>),
    CannotPlaceNow,
    Unreachable,
}

enum UpdateTrigger {
    Finished { dep_id: TaskId, success: bool },
    Rescan,
}

/// Orchestrates C1–C5 behind the four streams described in spec.md §6.
/// Owns every piece of mutable scheduler state; nothing here is shared
/// across threads, so none of it needs a lock — the event loop in
/// [`Scheduler::run`] is the only caller of its handlers.
pub struct Scheduler {
    client_rx: mpsc::Receiver<Envelope>,
    client_tx: mpsc::Sender<Envelope>,
    engine_rx: mpsc::Receiver<Envelope>,
    engine_tx: mpsc::Sender<(EngineId, Envelope)>,
    mon_tx: broadcast::Sender<MonEvent>,
    notifier_rx: mpsc::Receiver<NotifierEvent>,

    registry: EngineRegistry,
    table: TaskTable,
    graph: DependencyGraph,
    policy: LoadPolicy,
    config: SchedulerConfig,
    rng: StdRng,
    stranded_timers: JoinSet<EngineId>,
    accepting_submissions: bool,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, parts: TransportParts) -> Self {
        let policy = LoadPolicy::new(config.scheme_name);
        Self {
            client_rx: parts.client_rx,
            client_tx: parts.client_tx,
            engine_rx: parts.engine_rx,
            engine_tx: parts.engine_tx,
            mon_tx: parts.mon_tx,
            notifier_rx: parts.notifier_rx,
            registry: EngineRegistry::new(),
            table: TaskTable::new(),
            graph: DependencyGraph::new(),
            policy,
            config,
            rng: StdRng::from_entropy(),
            stranded_timers: JoinSet::new(),
            accepting_submissions: false,
        }
    }

    /// Runs the cooperative event loop until the client stream closes.
    /// Grounded on `client-engine/src/engine.rs`'s `EngineRuntime::run`:
    /// a `tokio::select!` across the command/result streams, a periodic
    /// tick, and a join-set of one-shot delayed callbacks.
    pub async fn run(mut self) {
        let mut audit_tick = tokio::time::interval(self.config.audit_interval);
        audit_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                maybe_env = self.client_rx.recv(), if self.accepting_submissions => {
                    match maybe_env {
                        Some(env) => self.dispatch_submission(env).await,
                        None => break,
                    }
                }
                maybe_reply = self.engine_rx.recv() => {
                    match maybe_reply {
                        Some(reply) => self.dispatch_result(reply).await,
                        None => break,
                    }
                }
                // Independent of the opportunistic flush at the top of
                // `dispatch_submission` (spec.md §4.5.1 step 1, §5
                // ordering (a)): registrations must take effect even
                // when no submission is in flight to re-subscribe the
                // client stream (spec.md §5's backpressure rule).
                maybe_note = self.notifier_rx.recv() => {
                    match maybe_note {
                        Some(event) => self.dispatch_notification(event).await,
                        None => break,
                    }
                }
                _ = audit_tick.tick() => {
                    self.audit_timeouts().await;
                }
                joined = self.stranded_timers.join_next(), if !self.stranded_timers.is_empty() => {
                    if let Some(Ok(engine_id)) = joined {
                        self.handle_stranded_timeout(engine_id).await;
                    }
                }
            }
        }
    }

    // ---- 4.5.1 submission --------------------------------------------

    async fn dispatch_submission(&mut self, envelope: Envelope) {
        tracing::debug!(method = "dispatch_submission", msg_id = %envelope.header.msg_id);
        let notifications: Vec<NotifierEvent> = transport::drain_notifier(&mut self.notifier_rx);
        for event in notifications {
            self.dispatch_notification(event).await;
        }
        self.mon_tx_publish(MonEvent::InTask(envelope.clone()));

        let msg_id = envelope.header.msg_id.clone();
        self.table.observe(msg_id.clone());
        let retries = envelope.header.retries;

        let completed = self.table.all_completed().clone();
        let failed = self.table.all_failed().clone();

        let after_raw: DepSpec = envelope
            .header
            .after
            .clone()
            .map(DepSpec::from)
            .unwrap_or_else(DepSpec::met);
        let after = if after_raw.is_empty() {
            after_raw
        } else {
            let reduced = after_raw.reduce_all(&completed, &failed);
            if reduced.check(&completed, &failed) {
                DepSpec::met()
            } else {
                reduced
            }
        };
        let follow: DepSpec = envelope
            .header
            .follow
            .clone()
            .map(DepSpec::from)
            .unwrap_or_else(DepSpec::met);

        let targets: HashSet<EngineId> = envelope.header.targets.clone().unwrap_or_default();
        let timeout_deadline = envelope
            .header
            .timeout
            .map(|secs| Instant::now() + Duration::from_secs(secs));

        let self_ref = after.contains(&msg_id) || follow.contains(&msg_id);
        let unknown_ref = {
            let all_ids = self.table.all_ids();
            after
                .ids()
                .iter()
                .chain(follow.ids().iter())
                .any(|d| !all_ids.contains(d))
        };
        if self_ref || unknown_ref {
            self.fail_task(
                msg_id.clone(),
                envelope,
                SchedulerError::InvalidDependency {
                    task_id: msg_id,
                    reason: "self-reference or unknown dependency id".into(),
                },
            )
            .await;
            return;
        }

        if after.unreachable(&completed, &failed) || follow.unreachable(&completed, &failed) {
            self.fail_task(
                msg_id.clone(),
                envelope,
                SchedulerError::ImpossibleDependency { task_id: msg_id },
            )
            .await;
            return;
        }

        let record = TaskRecord::new(envelope, targets, after.clone(), follow, timeout_deadline, retries);

        if after.check(&completed, &failed) {
            match self.maybe_run_outcome(&record) {
                MaybeRunOutcome::Placed(eligible) => self.submit_task(msg_id, record, &eligible).await,
                MaybeRunOutcome::CannotPlaceNow => self.save_unmet(msg_id, record),
                MaybeRunOutcome::Unreachable => {
                    let env = record.envelope.clone();
                    self.fail_task(
                        msg_id.clone(),
                        env,
                        SchedulerError::ImpossibleDependency { task_id: msg_id },
                    )
                    .await;
                }
            }
        } else {
            self.save_unmet(msg_id, record);
        }
    }

    async fn dispatch_notification(&mut self, event: NotifierEvent) {
        tracing::debug!(method = "dispatch_notification", ?event);
        match event {
            NotifierEvent::Registered(id) => {
                tracing::info!(engine = %id, "engine registered");
                let was_first = self.registry.register(id);
                if was_first {
                    self.accepting_submissions = true;
                }
                self.update_graph(UpdateTrigger::Rescan).await;
            }
            NotifierEvent::Unregistered(id) => {
                tracing::warn!(engine = %id, "engine unregistered");
                let outcome = self.registry.unregister(&id);
                if !outcome.engines_remaining {
                    self.accepting_submissions = false;
                }
                if outcome.had_pending {
                    let grace = self.config.stranded_grace;
                    self.stranded_timers.spawn(async move {
                        tokio::time::sleep(grace).await;
                        id
                    });
                } else {
                    self.registry.drop_history(&id);
                }
            }
        }
    }

    async fn handle_stranded_timeout(&mut self, engine_id: EngineId) {
        let stranded = self.registry.handle_stranded(&engine_id);
        if !stranded.is_empty() {
            tracing::warn!(engine = %engine_id, count = stranded.len(), "stranded tasks grace period elapsed");
        }
        for (msg_id, record) in stranded {
            let error = SchedulerError::EngineDied {
                task_id: msg_id.clone(),
                engine_id: engine_id.clone(),
            };
            let mut envelope = record.envelope.clone();
            envelope.identities = vec![engine_id.as_bytes().to_vec()];
            envelope.header.msg_id = msg_id;
            envelope.header.dependencies_met = true;
            envelope.header.status = Some(Status::Error(error.to_string()));
            self.dispatch_result(envelope).await;
        }
    }

    // ---- 4.5.2 maybe_run -----------------------------------------------

    fn maybe_run_outcome(&self, record: &TaskRecord) -> MaybeRunOutcome {
        let msg_id = record.msg_id();
        let blacklist = self.table.blacklist_of(msg_id).cloned().unwrap_or_default();
        let hwm = self.config.hwm;
        let skip_filter =
            record.follow.is_empty() && record.targets.is_empty() && blacklist.is_empty() && hwm == 0;

        let eligible: Vec<usize> = if skip_filter {
            (0..self.registry.len()).collect()
        } else {
            let empty = HashSet::new();
            (0..self.registry.len())
                .filter(|&i| {
                    let engine = &self.registry.targets()[i];
                    if hwm > 0 && self.registry.loads()[i] >= hwm {
                        return false;
                    }
                    if blacklist.contains(engine) {
                        return false;
                    }
                    if !record.targets.is_empty() && !record.targets.contains(engine) {
                        return false;
                    }
                    if record.follow.nonempty() {
                        let c = self.registry.completed(engine).unwrap_or(&empty);
                        let f = self.registry.failed(engine).unwrap_or(&empty);
                        if !record.follow.check(c, f) {
                            return false;
                        }
                    }
                    true
                })
                .collect()
        };

        if !eligible.is_empty() {
            return MaybeRunOutcome::Placed(eligible);
        }

        if record.follow.all() {
            let mut destinations = HashSet::new();
            for id in record.follow.ids() {
                if let Some(engine) = self.table.destination_of(id) {
                    destinations.insert(engine.clone());
                }
            }
            if destinations.len() > 1 {
                return MaybeRunOutcome::Unreachable;
            }
        }

        if !record.targets.is_empty() {
            let live: HashSet<EngineId> = self.registry.targets().iter().cloned().collect();
            let reachable = record
                .targets
                .iter()
                .any(|t| !blacklist.contains(t) && live.contains(t));
            if !reachable {
                return MaybeRunOutcome::Unreachable;
            }
        }

        MaybeRunOutcome::CannotPlaceNow
    }

    // ---- 4.5.3 submit_task ----------------------------------------------

    async fn submit_task(&mut self, msg_id: TaskId, mut record: TaskRecord, eligible: &[usize]) {
        let loads: Vec<u32> = eligible.iter().map(|&i| self.registry.loads()[i]).collect();
        let local = self.policy.pick(&loads, &mut self.rng);
        let idx = eligible[local];
        let engine = self.registry.targets()[idx].clone();

        record.after = DepSpec::met();
        let mut envelope = record.envelope.clone();
        envelope.header.after = Some(DepSpec::met().to_wire());
        envelope.header.dependencies_met = true;
        let _ = self.engine_tx.send((engine.clone(), envelope)).await;

        self.registry.add_job(idx);
        self.registry.insert_pending(&engine, msg_id.clone(), record);
        self.mon_tx_publish(MonEvent::TaskDestination {
            msg_id,
            engine_id: engine,
        });
    }

    fn save_unmet(&mut self, msg_id: TaskId, record: TaskRecord) {
        for dep_id in record.after.ids().iter().chain(record.follow.ids().iter()) {
            if !self.table.is_done(dep_id) {
                self.graph.add_waiter(dep_id.clone(), msg_id.clone());
            }
        }
        self.table.save_unmet(msg_id, record);
    }

    // ---- 4.5.4/4.5.5 result handling ------------------------------------

    async fn dispatch_result(&mut self, reply: Envelope) {
        tracing::debug!(method = "dispatch_result", msg_id = %reply.header.msg_id);
        let Some(engine_frame) = reply.identities.first().cloned() else {
            return;
        };
        let engine_id = EngineId::new(engine_frame);
        let msg_id = reply.header.msg_id.clone();

        let mut hwm_wake = false;
        if let Some(idx) = self.registry.index_of(&engine_id) {
            let was_at_hwm = self.config.hwm > 0 && self.registry.loads()[idx] == self.config.hwm;
            self.registry.finish_job(idx);
            hwm_wake = was_at_hwm;
        }

        if !reply.header.dependencies_met {
            self.handle_unmet_dependency(engine_id, msg_id, hwm_wake).await;
            return;
        }

        let status_ok = !matches!(reply.header.status, Some(Status::Error(_)));
        if !status_ok {
            let retries_remaining = self
                .registry
                .pending_of(&engine_id)
                .and_then(|p| p.get(&msg_id))
                .map(|r| r.retries_remaining)
                .unwrap_or(0);
            if retries_remaining > 0 {
                if let Some(mut record) = self.registry.remove_pending(&engine_id, &msg_id) {
                    record.retries_remaining -= 1;
                    self.registry.insert_pending(&engine_id, msg_id.clone(), record);
                }
                self.handle_unmet_dependency(engine_id, msg_id, hwm_wake).await;
                return;
            }
        }

        self.finalize_result(engine_id, msg_id, reply, status_ok, hwm_wake).await;
    }

    async fn handle_unmet_dependency(&mut self, engine_id: EngineId, msg_id: TaskId, hwm_wake: bool) {
        let Some(record) = self.registry.remove_pending(&engine_id, &msg_id) else {
            return;
        };
        self.table.blacklist_engine(&msg_id, engine_id);

        let blacklist = self.table.blacklist_of(&msg_id).cloned().unwrap_or_default();
        if !record.targets.is_empty() && record.targets.is_subset(&blacklist) {
            let env = record.envelope.clone();
            self.fail_task(
                msg_id.clone(),
                env,
                SchedulerError::ImpossibleDependency { task_id: msg_id },
            )
            .await;
        } else {
            match self.maybe_run_outcome(&record) {
                MaybeRunOutcome::Placed(eligible) => self.submit_task(msg_id, record, &eligible).await,
                MaybeRunOutcome::Unreachable => {
                    let env = record.envelope.clone();
                    self.fail_task(
                        msg_id.clone(),
                        env,
                        SchedulerError::ImpossibleDependency { task_id: msg_id },
                    )
                    .await;
                }
                MaybeRunOutcome::CannotPlaceNow => self.save_unmet(msg_id, record),
            }
        }

        if hwm_wake {
            self.update_graph(UpdateTrigger::Rescan).await;
        }
    }

    async fn finalize_result(
        &mut self,
        engine_id: EngineId,
        msg_id: TaskId,
        mut reply: Envelope,
        success: bool,
        hwm_wake: bool,
    ) {
        self.registry.remove_pending(&engine_id, &msg_id);
        if success {
            self.registry.mark_completed(&engine_id, msg_id.clone());
            self.table.record_success(msg_id.clone());
        } else {
            self.registry.mark_failed(&engine_id, msg_id.clone());
            self.table.record_failure(msg_id.clone());
        }
        self.table.set_destination(msg_id.clone(), engine_id);
        self.table.clear_blacklist(&msg_id);

        reply.swap_routing_frames();
        let _ = self.client_tx.send(reply.clone()).await;
        self.mon_tx_publish(MonEvent::OutTask(reply));

        self.update_graph(UpdateTrigger::Finished {
            dep_id: msg_id,
            success,
        })
        .await;
        if hwm_wake {
            self.update_graph(UpdateTrigger::Rescan).await;
        }
    }

    async fn fail_task(&mut self, msg_id: TaskId, mut envelope: Envelope, error: SchedulerError) {
        tracing::debug!(task_id = %msg_id, %error, "task failed");
        envelope.header.status = Some(Status::Error(error.to_string()));
        envelope.swap_routing_frames();
        let _ = self.client_tx.send(envelope.clone()).await;
        self.mon_tx_publish(MonEvent::OutTask(envelope));
        self.table.record_failure(msg_id.clone());
        self.table.clear_blacklist(&msg_id);
        self.update_graph(UpdateTrigger::Finished {
            dep_id: msg_id,
            success: false,
        })
        .await;
    }

    // ---- 4.5.6 update_graph ----------------------------------------------

    async fn update_graph(&mut self, trigger: UpdateTrigger) {
        let candidates: Vec<TaskId> = match &trigger {
            UpdateTrigger::Finished { dep_id, .. } => self.graph.pop(dep_id).into_iter().collect(),
            UpdateTrigger::Rescan => self.table.depending().keys().cloned().collect(),
        };

        for msg_id in candidates {
            let Some(record) = self.table.depending().get(&msg_id).cloned() else {
                continue;
            };
            let completed = self.table.all_completed().clone();
            let failed = self.table.all_failed().clone();

            if record.after.unreachable(&completed, &failed) || record.follow.unreachable(&completed, &failed) {
                self.table.remove_depending(&msg_id);
                for dep_id in record.after.ids().iter().chain(record.follow.ids().iter()) {
                    self.graph.remove_waiter(dep_id, &msg_id);
                }
                let env = record.envelope.clone();
                self.fail_task(
                    msg_id.clone(),
                    env,
                    SchedulerError::ImpossibleDependency { task_id: msg_id },
                )
                .await;
                continue;
            }

            if record.after.check(&completed, &failed) {
                match self.maybe_run_outcome(&record) {
                    MaybeRunOutcome::Placed(eligible) => {
                        self.table.remove_depending(&msg_id);
                        for dep_id in record.after.ids().iter().chain(record.follow.ids().iter()) {
                            self.graph.remove_waiter(dep_id, &msg_id);
                        }
                        self.submit_task(msg_id, record, &eligible).await;
                    }
                    MaybeRunOutcome::Unreachable => {
                        self.table.remove_depending(&msg_id);
                        for dep_id in record.after.ids().iter().chain(record.follow.ids().iter()) {
                            self.graph.remove_waiter(dep_id, &msg_id);
                        }
                        let env = record.envelope.clone();
                        self.fail_task(
                            msg_id.clone(),
                            env,
                            SchedulerError::ImpossibleDependency { task_id: msg_id },
                        )
                        .await;
                    }
                    MaybeRunOutcome::CannotPlaceNow => {}
                }
            }
        }
    }

    // ---- 4.5.7 timeout audit ----------------------------------------------

    async fn audit_timeouts(&mut self) {
        tracing::debug!(method = "audit_timeouts");
        let now = Instant::now();
        loop {
            let expired = self
                .table
                .depending()
                .iter()
                .find(|(_, record)| record.timeout_deadline.is_some_and(|deadline| deadline < now))
                .map(|(id, _)| id.clone());

            let Some(msg_id) = expired else {
                break;
            };
            if let Some(record) = self.table.remove_depending(&msg_id) {
                for dep_id in record.after.ids().iter().chain(record.follow.ids().iter()) {
                    self.graph.remove_waiter(dep_id, &msg_id);
                }
                self.fail_task(
                    msg_id.clone(),
                    record.envelope,
                    SchedulerError::TaskTimeout { task_id: msg_id },
                )
                .await;
            }
        }
    }

    fn mon_tx_publish(&self, event: MonEvent) {
        let _ = self.mon_tx.send(event);
    }
}
