use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::session::SessionPhase;

#[derive(Default)]
struct GateState {
    phase: AtomicU8,
    safe: AtomicBool,
}

/// Cross-thread view of whether memory writes may go out.
///
/// The session worker is the only writer; clones observe the same state.
#[derive(Clone, Default)]
pub struct WriteGate {
    state: Arc<GateState>,
}

impl WriteGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        SessionPhase::from_repr(self.state.phase.load(Ordering::Acquire)).unwrap_or_default()
    }

    /// Leaving the session always clears the safe flag.
    pub fn set_phase(&self, phase: SessionPhase) {
        if !phase.in_session() {
            self.state.safe.store(false, Ordering::Release);
        }
        self.state.phase.store(phase as u8, Ordering::Release);
    }

    /// Set by the session worker after each refresh: a live local actor exists.
    pub fn set_safe(&self, safe: bool) {
        self.state.safe.store(safe, Ordering::Release);
    }

    /// Module bases are resolved and the handle is usable.
    pub fn is_process_ready(&self) -> bool {
        self.phase().has_modules()
    }

    pub fn is_safe_to_write(&self) -> bool {
        self.phase().in_session() && self.state.safe.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for WriteGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteGate")
            .field("phase", &self.phase())
            .field("safe", &self.is_safe_to_write())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_only_inside_session() {
        let gate = WriteGate::new();
        assert_eq!(gate.phase(), SessionPhase::Disconnected);

        gate.set_safe(true);
        assert!(!gate.is_safe_to_write());

        gate.set_phase(SessionPhase::Active);
        gate.set_safe(true);
        assert!(gate.is_safe_to_write());
        assert!(gate.is_process_ready());

        let observer = gate.clone();
        gate.set_phase(SessionPhase::Stopped);
        assert!(!observer.is_safe_to_write());

        gate.set_phase(SessionPhase::Active);
        assert!(!observer.is_safe_to_write());
    }
}
