use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::TetherConfig;
use crate::error::{Error, Result};
use crate::events::{LifecycleEvent, LossReason};
use crate::process::RemoteMemory;
use crate::session::SessionContext;
use crate::signal::WorkerSignal;

use super::batch::ScatterWriteBatch;
use super::gate::WriteGate;

/// A memory write applied repeatedly while a session is live.
pub trait WriteFeature: Send {
    fn name(&self) -> &str;

    fn enabled(&self) -> bool {
        true
    }

    /// Checked every tick before `apply`.
    fn can_run(&self) -> bool {
        self.enabled()
    }

    /// Queue this tick's writes. Reads go straight to `mem`.
    fn apply(&mut self, mem: &dyn RemoteMemory, batch: &mut ScatterWriteBatch) -> Result<()>;

    fn on_session_started(&mut self, _context: &SessionContext) {}

    fn on_session_ended(&mut self) {}

    fn on_process_lost(&mut self, _reason: LossReason) {}
}

/// Background thread that runs the registered [`WriteFeature`]s.
pub struct FeatureWorker {
    events: Receiver<LifecycleEvent>,
    gate: WriteGate,
    signal: Arc<WorkerSignal>,
    features: Vec<Box<dyn WriteFeature>>,
    memory: Option<Arc<dyn RemoteMemory>>,
    active_interval: Duration,
    idle_interval: Duration,
}

impl FeatureWorker {
    pub fn new(
        events: Receiver<LifecycleEvent>,
        gate: WriteGate,
        signal: Arc<WorkerSignal>,
        config: &TetherConfig,
    ) -> Self {
        Self {
            events,
            gate,
            signal,
            features: Vec::new(),
            memory: None,
            active_interval: config.write_active_interval(),
            idle_interval: config.write_idle_interval(),
        }
    }

    pub fn register(&mut self, feature: Box<dyn WriteFeature>) {
        debug!("Registered write feature {}", feature.name());
        self.features.push(feature);
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                LifecycleEvent::ProcessAcquired { memory, .. } => self.memory = Some(memory),
                LifecycleEvent::SessionStarted { context } => {
                    for feature in &mut self.features {
                        feature.on_session_started(&context);
                    }
                }
                LifecycleEvent::SessionEnded => {
                    for feature in &mut self.features {
                        feature.on_session_ended();
                    }
                }
                LifecycleEvent::ProcessLost { reason, .. } => {
                    self.memory = None;
                    for feature in &mut self.features {
                        feature.on_process_lost(reason);
                    }
                }
                LifecycleEvent::EntitiesChanged { .. } => {}
            }
        }
    }

    /// Handle pending events, run one round of features and return the next wait.
    pub fn tick(&mut self) -> Duration {
        self.drain_events();

        let Some(memory) = self.memory.clone() else {
            return self.idle_interval;
        };
        if !self.gate.is_process_ready() {
            return self.idle_interval;
        }
        if !self.gate.is_safe_to_write() {
            return self.active_interval;
        }

        let mut batch = ScatterWriteBatch::new();
        for feature in self.features.iter_mut().filter(|f| f.can_run()) {
            let applied =
                panic::catch_unwind(AssertUnwindSafe(|| feature.apply(&*memory, &mut batch)));
            match applied {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Write feature {} failed: {}", feature.name(), e),
                Err(_) => warn!("Write feature {} panicked", feature.name()),
            }
        }

        match batch.execute(&*memory, &self.gate) {
            Ok(_) => {}
            Err(Error::UnsafeToWrite) => debug!("Writes discarded, session no longer safe"),
            Err(e) => warn!("Write batch failed: {}", e),
        }
        self.active_interval
    }

    pub fn run(&mut self) {
        info!("Feature worker started ({} features)", self.features.len());
        while !self.signal.is_shutdown() {
            let wait = self.tick();
            self.signal.wait(wait);
        }
        info!("Feature worker stopped");
    }

    pub fn spawn(mut self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("tether-features".into())
            .spawn(move || self.run())
    }
}
