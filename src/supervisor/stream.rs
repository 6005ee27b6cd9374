//! Per-source stream supervisor
//!
//! Owns one transcoder's lifecycle. The process runs only while at least one
//! client is attached, is restarted with a fixed backoff after crashes, and
//! its output is fanned out through a [`Broadcaster`].
//!
//! Every transition that spawns or releases a process happens while holding
//! the supervisor's `control` lock, so Start and Stop never overlap. The client
//! set lives in the broadcaster behind its own short-held lock; the data path
//! (pump, exit watcher) never blocks on `control` except from detached tasks.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::fanout::{close_code, Broadcaster, ClientId, ClientSink};
use crate::process::{DiagnosticReader, DiagnosticTail, Launcher, ProcessExit, ProcessHandle};
use crate::source::Source;

use super::config::SupervisorConfig;
use super::error::SupervisorError;
use super::pump::Pump;
use super::state::{SupervisorEvent, SupervisorState};

/// Tasks belonging to one spawned process
struct Run {
    id: u64,
    cancel: CancellationToken,
    watcher: JoinHandle<()>,
    pump: Option<JoinHandle<()>>,
    diagnostics: Option<JoinHandle<()>>,
}

/// Transition-affecting fields, only touched under `control`
struct Control {
    state: SupervisorState,
    restart_count: u32,
    run: Option<Run>,
    /// Incremented on every spawn; lets stale exits and restarts detect they
    /// were superseded
    generation: u64,
}

/// Point-in-time view of a supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorStats {
    /// Current state
    pub state: SupervisorState,
    /// Attached clients
    pub client_count: usize,
    /// Restarts since the last stop or clean exit
    pub restart_count: u32,
}

/// Supervises the transcoder of one source
pub struct StreamSupervisor {
    source: Arc<Source>,
    config: SupervisorConfig,
    launcher: Arc<dyn Launcher>,
    broadcaster: Broadcaster,
    control: Mutex<Control>,
    state_tx: watch::Sender<SupervisorState>,
    restart_count: AtomicU32,
    events: broadcast::Sender<SupervisorEvent>,
    diagnostics: Arc<DiagnosticTail>,
}

impl fmt::Debug for StreamSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSupervisor")
            .field("source", &self.source.id)
            .field("state", &self.state())
            .field("clients", &self.client_count())
            .field("restarts", &self.restart_count())
            .finish()
    }
}

impl StreamSupervisor {
    /// Create an idle supervisor; nothing is spawned until a client attaches
    pub fn new(
        source: Arc<Source>,
        config: SupervisorConfig,
        launcher: Arc<dyn Launcher>,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(SupervisorState::Idle);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Arc::new(Self {
            broadcaster: Broadcaster::new(source.id.clone(), config.send_timeout),
            diagnostics: Arc::new(DiagnosticTail::new(config.diagnostic_tail)),
            source,
            config,
            launcher,
            control: Mutex::new(Control {
                state: SupervisorState::Idle,
                restart_count: 0,
                run: None,
                generation: 0,
            }),
            state_tx,
            restart_count: AtomicU32::new(0),
            events,
        })
    }

    /// The supervised source
    pub fn source(&self) -> &Arc<Source> {
        &self.source
    }

    /// Supervisor configuration
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Current state
    pub fn state(&self) -> SupervisorState {
        *self.state_tx.borrow()
    }

    /// Watch state changes
    pub fn state_watch(&self) -> watch::Receiver<SupervisorState> {
        self.state_tx.subscribe()
    }

    /// Subscribe to supervisor events
    pub fn subscribe_events(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }

    /// Whether a transcoder process is currently up
    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Number of attached clients
    pub fn client_count(&self) -> usize {
        self.broadcaster.len()
    }

    /// Restarts since the last stop or clean exit
    pub fn restart_count(&self) -> u32 {
        self.restart_count.load(Ordering::Relaxed)
    }

    /// Recent transcoder stderr lines
    pub fn recent_diagnostics(&self) -> Vec<String> {
        self.diagnostics.lines()
    }

    /// Snapshot of state and counters
    pub fn stats(&self) -> SupervisorStats {
        SupervisorStats {
            state: self.state(),
            client_count: self.client_count(),
            restart_count: self.restart_count(),
        }
    }

    /// Attach a client and start the transcoder if it is not running
    ///
    /// Fails with `CapacityExceeded` when `max_clients` are attached, leaving
    /// the running process untouched. If the triggered start fails, the
    /// client is detached again and `SpawnFailed` is returned.
    pub async fn add_client(
        self: &Arc<Self>,
        sink: Arc<dyn ClientSink>,
    ) -> Result<ClientId, SupervisorError> {
        let Some((id, clients)) = self.broadcaster.attach(sink, self.config.max_clients) else {
            tracing::warn!(
                source = %self.source.id,
                max_clients = self.config.max_clients,
                "Client rejected: limit reached"
            );
            return Err(SupervisorError::CapacityExceeded {
                id: self.source.id.clone(),
                max_clients: self.config.max_clients,
            });
        };

        tracing::info!(
            source = %self.source.id,
            client = %id,
            clients = clients,
            "Client attached"
        );

        if let Err(e) = self.start().await {
            self.broadcaster.detach(id);
            return Err(e);
        }

        Ok(id)
    }

    /// Detach a client; stops the transcoder once no clients remain
    ///
    /// Returns whether the client was attached. Safe to call repeatedly.
    pub async fn remove_client(&self, id: ClientId) -> bool {
        let removed = self.broadcaster.detach(id).is_some();

        if removed {
            tracing::info!(
                source = %self.source.id,
                client = %id,
                clients = self.broadcaster.len(),
                "Client detached"
            );
        }

        if self.broadcaster.is_empty() {
            self.release_if_unused().await;
        }

        removed
    }

    /// Start the transcoder if there is demand and it is not already up
    pub async fn start(self: &Arc<Self>) -> Result<(), SupervisorError> {
        let mut ctl = self.control.lock().await;

        match ctl.state {
            SupervisorState::Idle | SupervisorState::Failed => {}
            // Already up, or a restart is on its way
            _ => return Ok(()),
        }

        if self.broadcaster.is_empty() {
            return Ok(());
        }

        if ctl.state == SupervisorState::Failed {
            tracing::info!(source = %self.source.id, "New demand, clearing failed state");
            self.reset_restarts(&mut ctl);
            self.set_state(&mut ctl, SupervisorState::Idle);
        }

        self.spawn_locked(&mut ctl)
    }

    /// Stop the transcoder and detach every client
    ///
    /// Returns once the process has exited (terminated, or killed after the
    /// grace period) and all run tasks are joined.
    pub async fn stop(&self) {
        let mut ctl = self.control.lock().await;

        if ctl.state == SupervisorState::Idle && self.broadcaster.is_empty() {
            return;
        }

        self.shutdown_locked(&mut ctl, true).await;
    }

    /// Demand stop: only acts if the client set is still empty under the lock
    async fn release_if_unused(&self) {
        let mut ctl = self.control.lock().await;

        if !self.broadcaster.is_empty() {
            return;
        }

        match ctl.state {
            SupervisorState::Running | SupervisorState::RestartPending => {
                tracing::info!(source = %self.source.id, "No clients left, stopping transcoder");
                self.shutdown_locked(&mut ctl, false).await;
            }
            SupervisorState::Idle => self.reset_restarts(&mut ctl),
            _ => {}
        }
    }

    fn set_state(&self, ctl: &mut Control, state: SupervisorState) {
        if ctl.state != state {
            tracing::debug!(
                source = %self.source.id,
                from = %ctl.state,
                to = %state,
                "State change"
            );
        }
        ctl.state = state;
        self.state_tx.send_replace(state);
    }

    fn reset_restarts(&self, ctl: &mut Control) {
        ctl.restart_count = 0;
        self.restart_count.store(0, Ordering::Relaxed);
    }

    fn emit(&self, event: SupervisorEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn spawn_locked(self: &Arc<Self>, ctl: &mut Control) -> Result<(), SupervisorError> {
        self.set_state(ctl, SupervisorState::Starting);

        let spec = self.launcher.launch_spec(&self.source);
        let mut handle = match ProcessHandle::spawn(&spec) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(
                    source = %self.source.id,
                    program = %spec.program,
                    error = %e,
                    "Failed to start transcoder"
                );
                self.set_state(ctl, SupervisorState::Idle);
                self.emit(SupervisorEvent::SpawnFailed {
                    message: e.to_string(),
                });
                return Err(SupervisorError::SpawnFailed {
                    id: self.source.id.clone(),
                    program: spec.program,
                    kind: e.kind(),
                    message: e.to_string(),
                });
            }
        };

        ctl.generation += 1;
        let generation = ctl.generation;
        let pid = handle.pid();
        let cancel = CancellationToken::new();
        self.diagnostics.clear();

        let pump = handle.take_output().map(|output| {
            let supervisor = Arc::clone(self);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let pump = Pump::new(supervisor.source.id.clone(), supervisor.config.chunk_size);
                pump.run(output, &supervisor.broadcaster, &cancel, |evicted| {
                    supervisor.on_evicted(evicted)
                })
                .await;
            })
        });

        let diagnostics = handle.take_diagnostics().map(|stderr| {
            let reader = DiagnosticReader::new(
                self.source.id.clone(),
                self.config.diagnostic_read_timeout,
                Arc::clone(&self.diagnostics),
            )
            .with_max_line(self.config.diagnostic_max_line)
            .with_redactor(self.config.redactor.clone());
            tokio::spawn(reader.run(stderr, cancel.clone()))
        });

        let watcher =
            tokio::spawn(Arc::clone(self).watch_process(generation, handle, cancel.clone()));

        ctl.run = Some(Run {
            id: generation,
            cancel,
            watcher,
            pump,
            diagnostics,
        });
        self.set_state(ctl, SupervisorState::Running);

        tracing::info!(
            source = %self.source.id,
            pid = ?pid,
            clients = self.broadcaster.len(),
            "Transcoder started"
        );
        self.emit(SupervisorEvent::Started { pid });

        Ok(())
    }

    /// Exit-watch task: reports a natural exit, or releases the process on cancel
    async fn watch_process(
        self: Arc<Self>,
        generation: u64,
        mut handle: ProcessHandle,
        cancel: CancellationToken,
    ) {
        let exited = tokio::select! {
            exit = handle.wait() => Some(exit),
            _ = cancel.cancelled() => None,
        };

        match exited {
            Some(result) => {
                let exit = result.unwrap_or_else(|e| {
                    tracing::error!(
                        source = %self.source.id,
                        error = %e,
                        "Failed to wait for transcoder"
                    );
                    ProcessExit { code: None }
                });
                // Detached: stop() joins this task while holding `control`
                tokio::spawn(self.on_process_exit(generation, exit));
            }
            None => match handle.shutdown(self.config.shutdown_grace).await {
                Ok(exit) => {
                    tracing::debug!(source = %self.source.id, exit = %exit, "Transcoder released")
                }
                Err(e) => {
                    tracing::error!(
                        source = %self.source.id,
                        error = %e,
                        "Failed to release transcoder"
                    )
                }
            },
        }
    }

    async fn on_process_exit(self: Arc<Self>, generation: u64, exit: ProcessExit) {
        self.emit(SupervisorEvent::Exited { exit });

        let mut ctl = self.control.lock().await;

        let current = ctl.run.as_ref().is_some_and(|run| run.id == generation);
        if !current || ctl.state != SupervisorState::Running {
            tracing::debug!(
                source = %self.source.id,
                exit = %exit,
                "Ignoring exit of released process"
            );
            return;
        }

        if let Some(run) = ctl.run.take() {
            self.reap(run).await;
        }

        if self.broadcaster.is_empty() {
            tracing::info!(
                source = %self.source.id,
                exit = %exit,
                "Transcoder exited with no clients"
            );
            self.reset_restarts(&mut ctl);
            self.set_state(&mut ctl, SupervisorState::Idle);
            self.emit(SupervisorEvent::Stopped);
            return;
        }

        if exit.success() {
            tracing::info!(source = %self.source.id, "Transcoder exited cleanly, stream ended");
            self.broadcaster
                .close_all(close_code::NORMAL, "stream ended")
                .await;
            self.reset_restarts(&mut ctl);
            self.set_state(&mut ctl, SupervisorState::Idle);
            self.emit(SupervisorEvent::Stopped);
            return;
        }

        ctl.restart_count += 1;
        self.restart_count.store(ctl.restart_count, Ordering::Relaxed);
        let attempt = ctl.restart_count;

        let stderr = self.diagnostics.lines();
        tracing::error!(
            source = %self.source.id,
            exit = %exit,
            stderr = %stderr.join("\n"),
            "Transcoder exited unexpectedly"
        );

        if attempt > self.config.max_restarts {
            tracing::error!(
                source = %self.source.id,
                max_restarts = self.config.max_restarts,
                "Restart limit reached, giving up"
            );
            self.broadcaster
                .close_all(close_code::GOING_AWAY, "restart limit reached")
                .await;
            self.set_state(&mut ctl, SupervisorState::Failed);
            self.emit(SupervisorEvent::Failed {
                restarts: self.config.max_restarts,
            });
            return;
        }

        let delay = self.config.restart_backoff;
        tracing::warn!(
            source = %self.source.id,
            attempt = attempt,
            max_restarts = self.config.max_restarts,
            delay_ms = delay.as_millis() as u64,
            "Restarting transcoder"
        );
        self.set_state(&mut ctl, SupervisorState::RestartPending);
        self.emit(SupervisorEvent::RestartScheduled { attempt, delay });
        let pending = ctl.generation;
        drop(ctl);

        tokio::time::sleep(delay).await;

        let mut ctl = self.control.lock().await;

        if ctl.state != SupervisorState::RestartPending || ctl.generation != pending {
            tracing::debug!(source = %self.source.id, "Restart superseded");
            return;
        }

        if self.broadcaster.is_empty() {
            tracing::info!(source = %self.source.id, "No clients left, restart skipped");
            self.reset_restarts(&mut ctl);
            self.set_state(&mut ctl, SupervisorState::Idle);
            self.emit(SupervisorEvent::Stopped);
            return;
        }

        if self.spawn_locked(&mut ctl).is_err() {
            // Never leave clients attached to an idle supervisor
            self.broadcaster
                .close_all(close_code::INTERNAL_ERROR, "transcoder unavailable")
                .await;
            self.reset_restarts(&mut ctl);
        }
    }

    fn on_evicted(self: &Arc<Self>, evicted: &[ClientId]) {
        for client in evicted {
            self.emit(SupervisorEvent::ClientEvicted { client: *client });
        }

        if self.broadcaster.is_empty() {
            let supervisor = Arc::clone(self);
            // Detached: the demand stop joins the pump that called us
            tokio::spawn(async move { supervisor.release_if_unused().await });
        }
    }

    /// Tear down the current run and return to Idle
    async fn shutdown_locked(&self, ctl: &mut Control, close_clients: bool) {
        self.set_state(ctl, SupervisorState::Stopping);

        if let Some(run) = ctl.run.take() {
            self.teardown(run).await;
        }

        if close_clients {
            self.broadcaster
                .close_all(close_code::GOING_AWAY, "source stopped")
                .await;
        }

        self.reset_restarts(ctl);
        self.set_state(ctl, SupervisorState::Idle);
        self.emit(SupervisorEvent::Stopped);

        tracing::info!(source = %self.source.id, "Transcoder stopped");
    }

    /// Cancel a live run: the watcher terminates the process, then the
    /// readers are joined
    async fn teardown(&self, run: Run) {
        run.cancel.cancel();
        self.join("watcher", run.watcher).await;
        if let Some(pump) = run.pump {
            self.join("pump", pump).await;
        }
        if let Some(diagnostics) = run.diagnostics {
            self.join("diagnostics", diagnostics).await;
        }
    }

    /// Clean up a run whose process already exited
    ///
    /// Readers get a short window to drain what the process wrote before it
    /// died (final chunks, the stderr lines for the crash report).
    async fn reap(&self, run: Run) {
        let window = self.config.diagnostic_read_timeout;

        for (task, handle) in [("pump", run.pump), ("diagnostics", run.diagnostics)] {
            let Some(mut handle) = handle else {
                continue;
            };
            if tokio::time::timeout(window, &mut handle).await.is_err() {
                run.cancel.cancel();
                self.join(task, handle).await;
            }
        }

        run.cancel.cancel();
        self.join("watcher", run.watcher).await;
    }

    async fn join(&self, task: &'static str, handle: JoinHandle<()>) {
        if let Err(e) = handle.await {
            if e.is_panic() {
                tracing::error!(source = %self.source.id, task = task, "Supervisor task panicked");
            }
        }
    }
}
