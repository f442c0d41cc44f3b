use std::collections::HashMap;

use serde::Serialize;
use strum::{Display, FromRepr, IntoStaticStr};

use crate::process::{Address, ProcessId};

/// Lifecycle phase of the session worker.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, FromRepr, IntoStaticStr, Display,
)]
#[repr(u8)]
pub enum SessionPhase {
    #[default]
    Disconnected = 0,
    Locating = 1,
    ModulesResolving = 2,
    Ready = 3,
    Active = 4,
    Refreshing = 5,
    Stopped = 6,
}

impl SessionPhase {
    /// Module bases are only meaningful in these phases.
    pub fn has_modules(&self) -> bool {
        matches!(
            self,
            SessionPhase::Ready | SessionPhase::Active | SessionPhase::Refreshing
        )
    }

    pub fn in_session(&self) -> bool {
        matches!(self, SessionPhase::Active | SessionPhase::Refreshing)
    }
}

/// The one live attempt at controlling a target process instance.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub pid: Option<ProcessId>,
    pub modules: HashMap<String, Address>,
    pub phase: SessionPhase,
}

impl Session {
    /// Module base, only while the phase guarantees it is current.
    pub fn module(&self, name: &str) -> Option<Address> {
        if !self.phase.has_modules() {
            return None;
        }
        self.modules
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| *v)
    }

    /// Zero every field; the phase returns to `Disconnected`.
    pub fn reset(&mut self) {
        *self = Session::default();
    }
}
