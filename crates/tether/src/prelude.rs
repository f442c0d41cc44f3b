//! Prelude module for convenient imports
//!
//! ```ignore
//! use tether::prelude::*;
//! ```
//!
//! This brings the following into scope:
//!
//! - Session driving: `SessionController`, `TetherConfig`, `WorkerSignal`
//! - Memory access: `RemoteMemory`, `ReadMemory`, `ScatterBatch`, `ScatterReader`
//! - Entities: `Entity`, `EntitySnapshot`, `EntityKind`
//! - Events: `LifecycleSubscriber`, `LifecycleEvent`
//! - Error handling: `Error`, `Result`

// Session
pub use crate::config::TetherConfig;
pub use crate::offset::OffsetTable;
pub use crate::session::{SessionContext, SessionController, SessionPhase};
pub use crate::signal::WorkerSignal;

// Error handling
pub use crate::error::{Error, Result};

// Memory access
pub use crate::process::{Address, ProcessProvider, ReadMemory, RemoteMemory, SystemProvider};
pub use crate::scatter::{ScatterBatch, ScatterReader, ScatterResults};

// Entities
pub use crate::entity::{Entity, EntityKind, EntitySnapshot, Faction, HealthStatus};

// Events and writes
pub use crate::events::{LifecycleEvent, LifecycleSubscriber, LossReason};
pub use crate::write::{ScatterWriteBatch, WriteFeature, WriteGate};
