use tracing::trace;

use crate::error::{Error, Result};
use crate::process::{Address, Pod, RemoteMemory};

use super::gate::WriteGate;

/// Queued writes that go out together or not at all.
#[derive(Debug, Default)]
pub struct ScatterWriteBatch {
    entries: Vec<(Address, Vec<u8>)>,
}

impl ScatterWriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn add_value<T: Pod>(&mut self, address: Address, value: T) {
        self.entries.push((address, value.to_le_vec()));
    }

    pub fn add_bytes(&mut self, address: Address, bytes: impl Into<Vec<u8>>) {
        self.entries.push((address, bytes.into()));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Send every queued write in one call, draining the batch.
    ///
    /// The gate is checked right before the call; a closed gate discards the batch.
    pub fn execute<M: RemoteMemory + ?Sized>(&mut self, mem: &M, gate: &WriteGate) -> Result<usize> {
        let entries = std::mem::take(&mut self.entries);
        if entries.is_empty() {
            return Ok(0);
        }
        if let Some((address, _)) = entries.iter().find(|(a, _)| *a == 0) {
            return Err(Error::InvalidPointer(*address));
        }
        if !gate.is_safe_to_write() {
            return Err(Error::UnsafeToWrite);
        }

        mem.write_scatter(&entries)?;
        trace!("Wrote {} buffers", entries.len());
        Ok(entries.len())
    }
}
