mod cli;
mod logging;
mod shutdown;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use sched_core::{EngineId, SchedulerConfig, TaskId, default_config_path, load_config, save_config};
use sched_engine::Scheduler;
use sched_transport::{ChannelTransport, Envelope, Header, NotifierEvent, Status};

use crate::cli::Cli;
use crate::shutdown::{ShutdownController, ShutdownEvent, spawn_ctrl_c_handler};

fn resolve_config(cli: &Cli) -> anyhow::Result<SchedulerConfig> {
    let path = match &cli.config_path {
        Some(p) => p.clone(),
        None => default_config_path()?,
    };
    let mut config = load_config(&path)?;

    if let Some(hwm) = cli.hwm {
        config.hwm = hwm;
    }
    if let Some(scheme) = cli.scheme {
        config.scheme_name = scheme.into();
    }
    if let Some(secs) = cli.stranded_grace_secs {
        config.stranded_grace = Duration::from_secs(secs);
    }

    if cli.save_config {
        save_config(&path, &config)?;
    }
    Ok(config)
}

/// Simulates a pool of engines: every dispatched task is acknowledged
/// immediately with success, the way a fleet of idle workers would
/// answer a cheap job (spec.md §8 scenario 1).
async fn run_simulated_engines(
    mut dispatch_rx: tokio::sync::mpsc::Receiver<(EngineId, Envelope)>,
    reply_tx: tokio::sync::mpsc::Sender<Envelope>,
) {
    while let Some((engine_id, mut envelope)) = dispatch_rx.recv().await {
        tracing::debug!(engine = %engine_id, msg_id = %envelope.header.msg_id, "engine received task");
        envelope.identities = vec![engine_id.as_bytes().to_vec()];
        envelope.header.status = Some(Status::Ok);
        envelope.header.dependencies_met = true;
        if reply_tx.send(envelope).await.is_err() {
            return;
        }
    }
}

async fn run_simulated_client(
    client_tx: tokio::sync::mpsc::Sender<Envelope>,
    mut client_rx: tokio::sync::mpsc::Receiver<Envelope>,
    demo_tasks: usize,
) {
    for i in 0..demo_tasks {
        let msg_id = TaskId::new(format!("demo-task-{i}"));
        let envelope = Envelope::new(vec![b"demo-client".to_vec()], Header::submission(msg_id), vec![]);
        if client_tx.send(envelope).await.is_err() {
            return;
        }
    }

    for _ in 0..demo_tasks {
        let Some(reply) = client_rx.recv().await else {
            return;
        };
        match reply.header.status {
            Some(Status::Ok) => tracing::info!(msg_id = %reply.header.msg_id, "task completed"),
            Some(Status::Error(reason)) => {
                tracing::warn!(msg_id = %reply.header.msg_id, %reason, "task failed")
            }
            None => tracing::warn!(msg_id = %reply.header.msg_id, "reply with no status"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    tracing::info!(
        hwm = config.hwm,
        scheme = ?config.scheme_name,
        engines = cli.demo_engines,
        tasks = cli.demo_tasks,
        "starting scheduler demo"
    );

    let (parts, handles) = ChannelTransport::new(64);
    let scheduler = Scheduler::new(config, parts);
    let scheduler_handle = tokio::spawn(scheduler.run());

    for i in 0..cli.demo_engines {
        let engine_id = EngineId::from(format!("engine-{i}").as_str());
        handles.notifier_tx.send(NotifierEvent::Registered(engine_id)).await?;
    }

    let sched_transport::ChannelTransportHandles {
        client_tx,
        client_rx,
        engine_tx,
        engine_dispatch_rx,
        notifier_tx: _notifier_tx,
        mon_rx: _mon_rx,
    } = handles;

    let engines = tokio::spawn(run_simulated_engines(engine_dispatch_rx, engine_tx));
    let client = tokio::spawn(run_simulated_client(client_tx, client_rx, cli.demo_tasks));

    let shutdown = Arc::new(ShutdownController::new());
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::unbounded_channel::<ShutdownEvent>();
    spawn_ctrl_c_handler(shutdown.clone(), shutdown_tx);

    tokio::select! {
        _ = client => {
            tracing::info!("demo client finished all submissions");
        }
        ev = shutdown_rx.recv() => {
            match ev {
                Some(ShutdownEvent::Graceful) | Some(ShutdownEvent::Immediate) => {
                    tracing::info!("shutdown requested, exiting");
                }
                None => {}
            }
        }
    }

    engines.abort();
    scheduler_handle.abort();
    Ok(())
}
