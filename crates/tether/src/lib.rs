//! # tether
//!
//! Live inspection of an external process's memory.
//!
//! This crate provides:
//! - Process discovery and raw memory access (Windows, plus a scriptable mock)
//! - Scatter reads: many independent reads per grouped call, with per-read failure
//! - A session state machine that survives the target starting, stopping and restarting
//! - Reconstruction of typed entities from the target's registration list
//! - Lifecycle events for subscribers on any thread
//! - Gated memory writes driven by a background feature worker

pub mod config;
pub mod entity;
pub mod error;
pub mod events;
pub mod offset;
pub mod prelude;
pub mod process;
pub mod retry;
pub mod scatter;
pub mod session;
pub mod signal;
pub mod write;

pub use config::{TetherConfig, TetherConfigBuilder};
pub use entity::{
    CycleReport, Entity, EntityKind, EntityResolver, EntitySnapshot, Faction, HealthStatus,
    KindPayload, QuestRecord, QuestStatus, SnapshotCell, Vector3,
};
pub use error::{Error, Result};
pub use events::{LifecycleEvent, LifecycleEventBus, LifecycleSubscriber, LossReason};
pub use offset::{OffsetTable, load_offsets, save_offsets};
pub use process::{
    Address, ProcessHandle, ProcessId, ProcessProvider, ReadMemory, RemoteMemory, SystemProvider,
};
pub use retry::{ExponentialBackoff, FixedDelay, RetryStrategy};
pub use scatter::{ScatterBatch, ScatterLimits, ScatterReader, ScatterResults};
pub use session::{Session, SessionContext, SessionController, SessionPhase};
pub use signal::WorkerSignal;
pub use write::{FeatureWorker, ScatterWriteBatch, WriteFeature, WriteGate};
