use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::TetherConfig;
use crate::entity::{EntityResolver, SnapshotCell};
use crate::error::{Error, Result};
use crate::events::{LifecycleEvent, LifecycleEventBus, LifecycleSubscriber, LossReason};
use crate::offset::OffsetTable;
use crate::process::{ProcessProvider, RemoteMemory};
use crate::retry::{ExponentialBackoff, FixedDelay, RetryStrategy};
use crate::signal::WorkerSignal;
use crate::write::WriteGate;

use super::context::SessionContext;
use super::phase::{Session, SessionPhase};

/// Drives one target process through its lifecycle, one state action per [`step`].
///
/// A session-end marker only closes the session: the process stays attached and
/// the controller returns to `Ready`. Process loss, restart requests and every
/// failure, including a panic inside a state action, end in
/// [`SessionController::stop`], which releases the process, fires the matching
/// events once and returns to `Disconnected`.
///
/// [`step`]: SessionController::step
pub struct SessionController<P: ProcessProvider> {
    provider: P,
    offsets: Arc<OffsetTable>,
    config: TetherConfig,
    signal: Arc<WorkerSignal>,
    bus: LifecycleEventBus,
    resolver: EntityResolver,
    gate: WriteGate,
    session: Session,
    handle: Option<Arc<P::Handle>>,
    context: Option<Arc<SessionContext>>,
    /// ProcessAcquired was published and ProcessLost is still owed
    acquired: bool,
    locate_attempt: u32,
    sessions_started: u64,
}

impl<P: ProcessProvider> SessionController<P> {
    pub fn new(
        provider: P,
        offsets: Arc<OffsetTable>,
        config: TetherConfig,
        signal: Arc<WorkerSignal>,
    ) -> Self {
        Self {
            resolver: EntityResolver::new(Arc::clone(&offsets), &config),
            provider,
            offsets,
            config,
            signal,
            bus: LifecycleEventBus::new(),
            gate: WriteGate::new(),
            session: Session::default(),
            handle: None,
            context: None,
            acquired: false,
            locate_attempt: 0,
            sessions_started: 0,
        }
    }

    pub fn subscribe(&mut self, subscriber: Box<dyn LifecycleSubscriber>) {
        self.bus.subscribe(subscriber);
    }

    /// Event stream for another thread. Register before [`spawn`](Self::spawn).
    pub fn events(&mut self) -> std::sync::mpsc::Receiver<LifecycleEvent> {
        self.bus.channel()
    }

    pub fn snapshots(&self) -> Arc<SnapshotCell> {
        self.resolver.snapshots()
    }

    pub fn gate(&self) -> WriteGate {
        self.gate.clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.session.phase
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn context(&self) -> Option<&Arc<SessionContext>> {
        self.context.as_ref()
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.session.phase != phase {
            debug!("Session phase {} -> {}", self.session.phase, phase);
        }
        self.session.phase = phase;
        self.gate.set_phase(phase);
    }

    /// Run one state action and return how long to wait before the next one.
    ///
    /// Errors never escape: they tear the session down and yield the cooldown.
    pub fn step(&mut self) -> Duration {
        match self.advance() {
            Ok(wait) => wait,
            Err(e) => {
                let reason = if e.is_process_lost() {
                    info!("Target process lost: {}", e);
                    LossReason::ProcessExited
                } else {
                    warn!("Session fault in {}: {}", self.session.phase, e);
                    LossReason::Fault
                };
                self.stop(reason);
                self.config.cooldown()
            }
        }
    }

    fn advance(&mut self) -> Result<Duration> {
        match self.session.phase {
            SessionPhase::Disconnected => {
                if self.signal.take_restart() {
                    debug!("Restart requested with no process attached");
                }
                self.set_phase(SessionPhase::Locating);
                Ok(Duration::ZERO)
            }
            SessionPhase::Locating => Ok(self.locate()),
            SessionPhase::ModulesResolving => Ok(self.resolve_modules()),
            SessionPhase::Ready => self.await_session(),
            SessionPhase::Active | SessionPhase::Refreshing => self.refresh(),
            SessionPhase::Stopped => {
                self.set_phase(SessionPhase::Disconnected);
                Ok(Duration::ZERO)
            }
        }
    }

    fn locate(&mut self) -> Duration {
        let backoff = ExponentialBackoff::new(
            self.config.locate_interval(),
            self.config.locate_max_interval(),
        );
        let name = &self.offsets.process_name;

        let opened = self
            .provider
            .find_process(name)
            .and_then(|pid| Ok((pid, self.provider.open(pid)?)));
        match opened {
            Ok((pid, handle)) => {
                info!("Found {} (pid {})", name, pid);
                self.handle = Some(Arc::new(handle));
                self.session.pid = Some(pid);
                self.locate_attempt = 0;
                self.set_phase(SessionPhase::ModulesResolving);
                Duration::ZERO
            }
            Err(e) => {
                if self.locate_attempt == 0 {
                    info!("Waiting for {}...", name);
                }
                debug!("Process lookup failed: {}", e);
                let wait = backoff
                    .delay(self.locate_attempt)
                    .unwrap_or(self.config.locate_max_interval());
                self.locate_attempt = self.locate_attempt.saturating_add(1);
                self.set_phase(SessionPhase::Disconnected);
                wait
            }
        }
    }

    fn resolve_modules(&mut self) -> Duration {
        let Some(handle) = self.handle.clone() else {
            self.release();
            return self.config.locate_interval();
        };

        let offsets = Arc::clone(&self.offsets);
        for module in &offsets.modules {
            match handle.module_base(module) {
                Ok(base) => {
                    debug!("Module {} at {:#x}", module, base);
                    self.session.modules.insert(module.clone(), base);
                }
                Err(e) => {
                    // Still loading; start over without announcing anything
                    debug!("Module {} not resolved: {}", module, e);
                    self.release();
                    return self.config.locate_interval();
                }
            }
        }

        let Some(pid) = self.session.pid else {
            self.release();
            return self.config.locate_interval();
        };
        self.set_phase(SessionPhase::Ready);
        self.acquired = true;
        info!("Attached to pid {}", pid);
        let memory: Arc<dyn RemoteMemory> = handle;
        self.bus
            .publish(LifecycleEvent::ProcessAcquired { pid, memory });
        Duration::ZERO
    }

    /// Ready: wait for the session marker while watching the process.
    fn await_session(&mut self) -> Result<Duration> {
        if let Some(reason) = self.interruption()? {
            self.stop(reason);
            return Ok(self.config.cooldown());
        }

        let handle = self.current_handle()?;
        let session_id = self.sessions_started + 1;
        let Some(context) =
            SessionContext::locate(&*handle, &self.session, &self.offsets, session_id)?
        else {
            return Ok(self.config.session_poll_interval());
        };

        self.sessions_started = session_id;
        info!("Session {} started (world {:#x})", session_id, context.world);
        let context = Arc::new(context);
        self.context = Some(Arc::clone(&context));
        self.set_phase(SessionPhase::Active);
        self.bus.publish(LifecycleEvent::SessionStarted { context });
        Ok(Duration::ZERO)
    }

    /// Active: one refresh cycle of the entity resolver.
    fn refresh(&mut self) -> Result<Duration> {
        if let Some(reason) = self.interruption()? {
            self.stop(reason);
            return Ok(self.config.cooldown());
        }

        let handle = self.current_handle()?;
        let Some(context) = self.context.clone() else {
            return Err(Error::ProcessLost("active session without context".into()));
        };
        if !context.still_active(&*handle, &self.session, &self.offsets)? {
            self.end_session();
            return Ok(self.config.session_poll_interval());
        }

        self.set_phase(SessionPhase::Refreshing);
        match self.resolver.refresh(&*handle, &context) {
            Ok(report) => {
                let snapshot = self.resolver.current_entities();
                self.gate
                    .set_safe(snapshot.local().is_some_and(|local| local.alive));
                if report.cycle == 1 || report.membership_changed() {
                    self.bus.publish(LifecycleEvent::EntitiesChanged { snapshot });
                }
            }
            Err(e) if e.is_process_lost() => return Err(e),
            Err(e) => {
                self.gate.set_safe(false);
                debug!("Refresh cycle failed: {}", e);
            }
        }
        self.set_phase(SessionPhase::Active);
        Ok(self.config.refresh_interval())
    }

    /// Restart request or a failed liveness probe.
    fn interruption(&mut self) -> Result<Option<LossReason>> {
        if self.signal.take_restart() {
            info!("Restart requested");
            return Ok(Some(LossReason::RestartRequested));
        }
        if !self.is_alive() {
            info!("Target process exited");
            return Ok(Some(LossReason::ProcessExited));
        }
        Ok(None)
    }

    /// Probe the process by name; it must still resolve to the acquired pid.
    ///
    /// Only consecutive failures count. A different pid means the process was
    /// restarted and is reported at once.
    fn is_alive(&self) -> bool {
        let Some(pid) = self.session.pid else {
            return false;
        };
        let probes = FixedDelay::new(self.config.liveness_interval())
            .with_max_attempts(self.config.liveness_attempts.max(1));

        let mut attempt = 0;
        loop {
            match self.provider.find_process(&self.offsets.process_name) {
                Ok(found) if found == pid => return true,
                Ok(found) => {
                    debug!("Process now has pid {} (was {})", found, pid);
                    return false;
                }
                Err(e) => debug!("Liveness probe {} failed: {}", attempt + 1, e),
            }
            attempt += 1;
            let Some(wait) = probes.delay(attempt) else {
                return false;
            };
            if self.signal.wait(wait) {
                // Let the caller see the shutdown or restart request instead
                return true;
            }
        }
    }

    fn current_handle(&self) -> Result<Arc<P::Handle>> {
        self.handle
            .clone()
            .ok_or_else(|| Error::ProcessLost("no process handle".into()))
    }

    /// Close the current session and wait for the next one on the same process.
    ///
    /// The handle and module bases stay valid; only per-session state is dropped.
    fn end_session(&mut self) {
        self.set_phase(SessionPhase::Stopped);
        if let Some(context) = self.context.take() {
            info!("Session {} ended", context.session_id);
            self.bus.publish(LifecycleEvent::SessionEnded);
        }
        self.resolver.reset();
        self.set_phase(SessionPhase::Ready);
    }

    /// Drop the handle and all per-process state without firing events.
    fn release(&mut self) {
        self.handle = None;
        self.context = None;
        self.resolver.reset();
        self.session.reset();
        self.gate.set_phase(SessionPhase::Disconnected);
    }

    /// Tear the session down and return to `Disconnected`.
    ///
    /// `SessionEnded` fires if a session was active and `ProcessLost` if the process
    /// had been announced; each at most once per acquisition.
    pub fn stop(&mut self, reason: LossReason) {
        let pid = self.session.pid;
        self.set_phase(SessionPhase::Stopped);

        if self.context.take().is_some() {
            self.bus.publish(LifecycleEvent::SessionEnded);
        }
        if self.acquired {
            self.acquired = false;
            if let Some(pid) = pid {
                info!("Released pid {} ({})", pid, reason);
                self.bus.publish(LifecycleEvent::ProcessLost { pid, reason });
            }
        }

        self.release();
        self.locate_attempt = 0;
    }

    /// Step until shutdown is requested, then tear down.
    pub fn run(&mut self) {
        info!("Session worker started");
        while !self.signal.is_shutdown() {
            let wait = match panic::catch_unwind(AssertUnwindSafe(|| self.step())) {
                Ok(wait) => wait,
                Err(_) => {
                    error!("Session worker panicked in {}", self.session.phase);
                    self.stop(LossReason::Fault);
                    self.config.cooldown()
                }
            };
            if !wait.is_zero() {
                self.signal.wait(wait);
            }
        }
        self.stop(LossReason::Shutdown);
        info!("Session worker stopped");
    }
}

impl<P> SessionController<P>
where
    P: ProcessProvider + 'static,
{
    /// Move the controller onto its own thread.
    pub fn spawn(mut self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("tether-session".into())
            .spawn(move || self.run())
    }
}
