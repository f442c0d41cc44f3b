//! Batched remote reads.
//!
//! A [`ScatterBatch`] collects independent read requests, optionally split into
//! rounds where later requests dereference pointers read earlier. A
//! [`ScatterReader`] executes the batch with one grouped call per round (two when a
//! round holds variable-length data) and returns a [`ScatterResults`] table in which
//! every request succeeds or fails on its own.

mod batch;
mod plan;
mod reader;
mod request;
mod results;

pub use batch::ScatterBatch;
pub use reader::{ScatterLimits, ScatterReader};
pub use request::{
    ListLayout, ListSlot, MapLayout, MapSlot, RequestId, SetSlot, Slot, Target, TextLayout,
    TextSlot,
};
pub use results::{ReadError, ScatterResults};
