use std::{net::SocketAddr, ops::ControlFlow, sync::Arc, time::Duration};

use netclip_core::{ClipOrigin, ClipValue, DEFAULT_DISPLAY_WIDTH, DEFAULT_POLL_INTERVAL};
use serde::Serialize;
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

use crate::{
    SyncError,
    engine::{LocalOutcome, RemoteOutcome, SyncEngine, SyncModes, Trigger},
    transport::{Datagram, Transport, TransportError},
};

const EVENT_QUEUE_DEPTH: usize = 64;
const NOTIFY_QUEUE_DEPTH: usize = 64;
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceOptions {
    pub poll_interval: Duration,
    pub display_width_limit: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            display_width_limit: DEFAULT_DISPLAY_WIDTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryItem {
    pub index: usize,
    pub label: String,
    pub origin: ClipOrigin,
    pub recorded_at_unix_ms: u64,
    pub byte_len: usize,
}

/// Snapshot of the history and modes for a front-end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryView {
    pub modes: SyncModes,
    pub max_count: usize,
    pub items: Vec<HistoryItem>,
}

impl HistoryView {
    fn from_engine(engine: &SyncEngine, width_limit: usize) -> Self {
        let history = engine.history();
        let items = history
            .iter()
            .enumerate()
            .map(|(index, entry)| HistoryItem {
                index,
                label: entry.value().label(width_limit),
                origin: entry.origin(),
                recorded_at_unix_ms: entry.recorded_at_unix_ms(),
                byte_len: entry.value().byte_len(),
            })
            .collect();
        Self {
            modes: engine.modes(),
            max_count: history.max_count(),
            items,
        }
    }

    pub fn labels(&self) -> Vec<String> {
        self.items.iter().map(|item| item.label.clone()).collect()
    }
}

/// Notifications published to front-ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    HistoryChanged,
    ClipSent {
        label: String,
    },
    SendFailed {
        label: String,
    },
    SendRefused {
        reason: String,
    },
    ClipReceived {
        sender: SocketAddr,
        label: String,
        applied: bool,
    },
    ClipApplied {
        label: String,
    },
    ModesChanged {
        modes: SyncModes,
    },
}

#[derive(Debug)]
enum EngineEvent {
    PollTick,
    Inbound(Datagram),
    Command(Command),
}

#[derive(Debug)]
enum Command {
    SendNow(oneshot::Sender<LocalOutcome>),
    ReceiveLatest(oneshot::Sender<Result<ClipValue, SyncError>>),
    SendEntry {
        index: usize,
        reply: oneshot::Sender<Result<LocalOutcome, SyncError>>,
    },
    CopyEntry {
        index: usize,
        reply: oneshot::Sender<Result<ClipValue, SyncError>>,
    },
    SetAutosend {
        enabled: bool,
        reply: oneshot::Sender<SyncModes>,
    },
    SetAutoreceive {
        enabled: bool,
        reply: oneshot::Sender<SyncModes>,
    },
    History {
        width_limit: usize,
        reply: oneshot::Sender<HistoryView>,
    },
    Shutdown,
}

/// Cheap cloneable front door to a running `SyncService`.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    events_tx: mpsc::Sender<EngineEvent>,
    notify_tx: broadcast::Sender<SyncEvent>,
    display_width_limit: usize,
}

impl SyncHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.notify_tx.subscribe()
    }

    pub fn display_width_limit(&self) -> usize {
        self.display_width_limit
    }

    pub async fn get_history(&self, width_limit: usize) -> Result<Vec<String>, SyncError> {
        Ok(self.history(width_limit).await?.labels())
    }

    pub async fn history(&self, width_limit: usize) -> Result<HistoryView, SyncError> {
        self.request(|reply| Command::History { width_limit, reply })
            .await
    }

    pub async fn send_now(&self) -> Result<LocalOutcome, SyncError> {
        self.request(Command::SendNow).await
    }

    pub async fn receive_latest(&self) -> Result<ClipValue, SyncError> {
        self.request(Command::ReceiveLatest).await?
    }

    pub async fn send_entry(&self, index: usize) -> Result<LocalOutcome, SyncError> {
        self.request(|reply| Command::SendEntry { index, reply })
            .await?
    }

    pub async fn copy_entry(&self, index: usize) -> Result<ClipValue, SyncError> {
        self.request(|reply| Command::CopyEntry { index, reply })
            .await?
    }

    pub async fn set_autosend(&self, enabled: bool) -> Result<SyncModes, SyncError> {
        self.request(|reply| Command::SetAutosend { enabled, reply })
            .await
    }

    pub async fn set_autoreceive(&self, enabled: bool) -> Result<SyncModes, SyncError> {
        self.request(|reply| Command::SetAutoreceive { enabled, reply })
            .await
    }

    /// Asks the engine to stop after the event it is currently handling.
    pub async fn shutdown(&self) -> Result<(), SyncError> {
        self.events_tx
            .send(EngineEvent::Command(Command::Shutdown))
            .await
            .map_err(|_| SyncError::EngineStopped)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SyncError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.events_tx
            .send(EngineEvent::Command(build(reply_tx)))
            .await
            .map_err(|_| SyncError::EngineStopped)?;
        reply_rx.await.map_err(|_| SyncError::EngineStopped)
    }
}

/// Runs a `SyncEngine` as a single actor task fed by a poll timer task, a
/// datagram receive task and `SyncHandle` commands.
#[derive(Debug)]
pub struct SyncService {
    handle: SyncHandle,
    task: JoinHandle<()>,
}

impl SyncService {
    pub fn start(engine: SyncEngine, options: ServiceOptions) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let (notify_tx, _) = broadcast::channel(NOTIFY_QUEUE_DEPTH);

        let poll = tokio::spawn(poll_task(events_tx.clone(), options.poll_interval));
        let receive = tokio::spawn(receive_task(engine.transport(), events_tx.clone()));

        info!(
            poll_interval_ms = options.poll_interval.as_millis() as u64,
            modes = ?engine.modes(),
            "sync engine starting"
        );
        let task = tokio::spawn(engine_task(
            engine,
            events_rx,
            notify_tx.clone(),
            options.display_width_limit,
            poll,
            receive,
        ));

        Self {
            handle: SyncHandle {
                events_tx,
                notify_tx,
                display_width_limit: options.display_width_limit,
            },
            task,
        }
    }

    pub fn handle(&self) -> SyncHandle {
        self.handle.clone()
    }

    /// Stops the poll timer and the receive loop and waits for the engine to
    /// finish its current event. The transport is closed when the engine is
    /// dropped.
    pub async fn shutdown(self) {
        if self.handle.shutdown().await.is_err() {
            debug!("sync engine already stopped");
        }
        if let Err(err) = self.task.await {
            warn!("sync engine task ended abnormally: {}", err);
        }
    }
}

async fn poll_task(events_tx: mpsc::Sender<EngineEvent>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await; // the engine primes itself at startup

    loop {
        ticker.tick().await;
        match events_tx.try_send(EngineEvent::PollTick) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("engine busy, skipping poll tick");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => break,
        }
    }
}

async fn receive_task(transport: Arc<dyn Transport>, events_tx: mpsc::Sender<EngineEvent>) {
    loop {
        match transport.recv().await {
            Ok(datagram) => {
                if events_tx.send(EngineEvent::Inbound(datagram)).await.is_err() {
                    break;
                }
            }
            Err(TransportError::Closed) => {
                info!("transport closed, receive loop stopping");
                break;
            }
            Err(err) => {
                warn!("receive skipped: {}", err);
                tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
            }
        }
    }
}

async fn engine_task(
    mut engine: SyncEngine,
    mut events_rx: mpsc::Receiver<EngineEvent>,
    notify_tx: broadcast::Sender<SyncEvent>,
    width_limit: usize,
    poll: JoinHandle<()>,
    receive: JoinHandle<()>,
) {
    if let Some(value) = engine.prime_local().await {
        debug!(clip = %value.fingerprint_hex(), "history primed from clipboard");
        let _ = notify_tx.send(SyncEvent::HistoryChanged);
    }

    while let Some(event) = events_rx.recv().await {
        let revision = engine.revision();

        let flow = match event {
            EngineEvent::PollTick => {
                let outcome = engine.poll_local(Trigger::Timer).await;
                publish_local(&notify_tx, &outcome, width_limit);
                ControlFlow::Continue(())
            }
            EngineEvent::Inbound(datagram) => {
                let outcome = engine.handle_datagram(datagram).await;
                publish_remote(&notify_tx, &outcome, width_limit);
                ControlFlow::Continue(())
            }
            EngineEvent::Command(command) => {
                handle_command(&mut engine, command, &notify_tx, width_limit).await
            }
        };

        if engine.revision() != revision {
            let _ = notify_tx.send(SyncEvent::HistoryChanged);
        }
        if flow.is_break() {
            break;
        }
    }

    poll.abort();
    receive.abort();
    info!("sync engine stopped");
}

async fn handle_command(
    engine: &mut SyncEngine,
    command: Command,
    notify_tx: &broadcast::Sender<SyncEvent>,
    width_limit: usize,
) -> ControlFlow<()> {
    match command {
        Command::SendNow(reply) => {
            let outcome = engine.send_now().await;
            publish_local(notify_tx, &outcome, width_limit);
            let _ = reply.send(outcome);
        }
        Command::ReceiveLatest(reply) => {
            let result = engine.receive_latest().await;
            publish_applied(notify_tx, &result, width_limit);
            let _ = reply.send(result);
        }
        Command::SendEntry { index, reply } => {
            let result = engine.send_entry(index).await;
            if let Ok(outcome) = &result {
                publish_local(notify_tx, outcome, width_limit);
            }
            let _ = reply.send(result);
        }
        Command::CopyEntry { index, reply } => {
            let result = engine.copy_entry(index).await;
            publish_applied(notify_tx, &result, width_limit);
            let _ = reply.send(result);
        }
        Command::SetAutosend { enabled, reply } => {
            engine.set_autosend(enabled);
            let modes = engine.modes();
            let _ = notify_tx.send(SyncEvent::ModesChanged { modes });
            let _ = reply.send(modes);
        }
        Command::SetAutoreceive { enabled, reply } => {
            engine.set_autoreceive(enabled);
            let modes = engine.modes();
            let _ = notify_tx.send(SyncEvent::ModesChanged { modes });
            let _ = reply.send(modes);
        }
        Command::History { width_limit, reply } => {
            let _ = reply.send(HistoryView::from_engine(engine, width_limit));
        }
        Command::Shutdown => return ControlFlow::Break(()),
    }
    ControlFlow::Continue(())
}

fn publish_local(
    notify_tx: &broadcast::Sender<SyncEvent>,
    outcome: &LocalOutcome,
    width_limit: usize,
) {
    let event = match outcome {
        LocalOutcome::Sent(value) => SyncEvent::ClipSent {
            label: value.label(width_limit),
        },
        LocalOutcome::SendFailed(value) => SyncEvent::SendFailed {
            label: value.label(width_limit),
        },
        LocalOutcome::Refused { error, .. } => SyncEvent::SendRefused {
            reason: error.to_string(),
        },
        LocalOutcome::Unavailable
        | LocalOutcome::SelfEcho
        | LocalOutcome::Unchanged
        | LocalOutcome::Recorded(_) => return,
    };
    let _ = notify_tx.send(event);
}

fn publish_remote(
    notify_tx: &broadcast::Sender<SyncEvent>,
    outcome: &RemoteOutcome,
    width_limit: usize,
) {
    let event = match outcome {
        RemoteOutcome::Recorded { value, sender }
        | RemoteOutcome::ApplyFailed { value, sender, .. } => SyncEvent::ClipReceived {
            sender: *sender,
            label: value.label(width_limit),
            applied: false,
        },
        RemoteOutcome::Applied { value, sender } => SyncEvent::ClipReceived {
            sender: *sender,
            label: value.label(width_limit),
            applied: true,
        },
        RemoteOutcome::Dropped(_) | RemoteOutcome::SelfEcho | RemoteOutcome::Duplicate => return,
    };
    let _ = notify_tx.send(event);
}

fn publish_applied(
    notify_tx: &broadcast::Sender<SyncEvent>,
    result: &Result<ClipValue, SyncError>,
    width_limit: usize,
) {
    if let Ok(value) = result {
        let _ = notify_tx.send(SyncEvent::ClipApplied {
            label: value.label(width_limit),
        });
    }
}
