//! Session lifecycle of the target process.
//!
//! ```text
//! Disconnected -> Locating -> ModulesResolving -> Ready -> Active <-> Refreshing
//!       ^                                           ^         |
//!       |                                           +---------+  session end
//!       +------------------------ Stopped <-------------------+  loss, restart, fault
//! ```
//!
//! A session end passes through `Stopped` only to fire its event; the process
//! stays attached and the controller waits in `Ready` for the next session.
//!
//! A [`SessionController`] owns exactly one [`Session`] at a time and is the only
//! writer of its phase. Other threads observe it through the
//! [`WriteGate`](crate::write::WriteGate) and the lifecycle events.

mod context;
mod controller;
mod phase;

pub use context::SessionContext;
pub use controller::SessionController;
pub use phase::{Session, SessionPhase};
