//! Gated memory writes.
//!
//! Writes are queued into a [`ScatterWriteBatch`] and only leave the process when the
//! [`WriteGate`] says the session is in a safe state at the moment of execution.

mod batch;
mod gate;
mod worker;

pub use batch::ScatterWriteBatch;
pub use gate::WriteGate;
pub use worker::{FeatureWorker, WriteFeature};
