//! Lifecycle notifications from the session worker.
//!
//! Subscribers registered on the [`LifecycleEventBus`] are called synchronously on
//! the worker thread, in registration order, before the worker moves on. Other
//! threads (the feature worker, the console) receive the same events through
//! `mpsc` channels instead.

use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

use strum::{Display, IntoStaticStr};
use tracing::debug;

use crate::entity::EntitySnapshot;
use crate::process::{ProcessId, RemoteMemory};
use crate::session::SessionContext;

/// Why a process was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum LossReason {
    /// The process stopped resolving or failed every liveness probe
    ProcessExited,
    /// A restart was requested
    RestartRequested,
    /// An error or panic escaped a state action
    Fault,
    /// The worker is shutting down
    Shutdown,
}

#[derive(Clone)]
pub enum LifecycleEvent {
    ProcessAcquired {
        pid: ProcessId,
        memory: Arc<dyn RemoteMemory>,
    },
    SessionStarted {
        context: Arc<SessionContext>,
    },
    EntitiesChanged {
        snapshot: Arc<EntitySnapshot>,
    },
    SessionEnded,
    ProcessLost {
        pid: ProcessId,
        reason: LossReason,
    },
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::ProcessAcquired { .. } => "process_acquired",
            LifecycleEvent::SessionStarted { .. } => "session_started",
            LifecycleEvent::EntitiesChanged { .. } => "entities_changed",
            LifecycleEvent::SessionEnded => "session_ended",
            LifecycleEvent::ProcessLost { .. } => "process_lost",
        }
    }
}

impl fmt::Debug for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::ProcessAcquired { pid, .. } => {
                f.debug_struct("ProcessAcquired").field("pid", pid).finish_non_exhaustive()
            }
            LifecycleEvent::SessionStarted { context } => f
                .debug_struct("SessionStarted")
                .field("context", context)
                .finish(),
            LifecycleEvent::EntitiesChanged { snapshot } => f
                .debug_struct("EntitiesChanged")
                .field("cycle", &snapshot.cycle)
                .field("entities", &snapshot.entities.len())
                .finish(),
            LifecycleEvent::SessionEnded => f.write_str("SessionEnded"),
            LifecycleEvent::ProcessLost { pid, reason } => f
                .debug_struct("ProcessLost")
                .field("pid", pid)
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Callback interface for lifecycle events. Every method defaults to a no-op.
///
/// Calls happen on the session worker; implementations must return quickly.
pub trait LifecycleSubscriber: Send {
    fn on_process_acquired(&mut self, _pid: ProcessId, _memory: &Arc<dyn RemoteMemory>) {}

    fn on_session_started(&mut self, _context: &SessionContext) {}

    fn on_entities_changed(&mut self, _snapshot: &Arc<EntitySnapshot>) {}

    fn on_session_ended(&mut self) {}

    fn on_process_lost(&mut self, _pid: ProcessId, _reason: LossReason) {}
}

#[derive(Default)]
pub struct LifecycleEventBus {
    subscribers: Vec<Box<dyn LifecycleSubscriber>>,
    channels: Vec<Sender<LifecycleEvent>>,
}

impl LifecycleEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: Box<dyn LifecycleSubscriber>) {
        self.subscribers.push(subscriber);
    }

    /// Forward every event to an existing channel.
    pub fn attach(&mut self, sender: Sender<LifecycleEvent>) {
        self.channels.push(sender);
    }

    /// Open a new channel that receives every event from now on.
    pub fn channel(&mut self) -> Receiver<LifecycleEvent> {
        let (tx, rx) = mpsc::channel();
        self.channels.push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len() + self.channels.len()
    }

    pub fn publish(&mut self, event: LifecycleEvent) {
        debug!("Lifecycle event: {}", event.name());

        for subscriber in &mut self.subscribers {
            match &event {
                LifecycleEvent::ProcessAcquired { pid, memory } => {
                    subscriber.on_process_acquired(*pid, memory)
                }
                LifecycleEvent::SessionStarted { context } => subscriber.on_session_started(context),
                LifecycleEvent::EntitiesChanged { snapshot } => {
                    subscriber.on_entities_changed(snapshot)
                }
                LifecycleEvent::SessionEnded => subscriber.on_session_ended(),
                LifecycleEvent::ProcessLost { pid, reason } => {
                    subscriber.on_process_lost(*pid, *reason)
                }
            }
        }

        // Receivers that hung up are dropped for good
        self.channels.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
