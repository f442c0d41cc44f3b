//! Access to the target process: discovery, module resolution and raw reads/writes.
//!
//! [`ProcessProvider`] locates and opens processes; [`RemoteMemory`] is the open
//! handle. Everything above this module only talks to these two traits, so tests
//! drive the whole stack through [`mock::MockProcess`].

mod bytes;
mod handle;
pub mod layout;

// Mock target process for unit and integration tests
#[doc(hidden)]
pub mod mock;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::scatter::{ListLayout, ScatterBatch, ScatterLimits, ScatterReader, TextLayout};

pub use bytes::{ByteBuffer, Pod, decode_cstr, decode_utf16};
pub use handle::{ProcessHandle, SystemProvider};

/// Virtual address in the target process.
pub type Address = u64;

/// Lowest address a user-mode pointer may hold.
pub const MIN_VALID_POINTER: Address = 0x1_0000;
/// Highest canonical user-mode address on x64.
pub const MAX_VALID_POINTER: Address = 0x7FFF_FFFF_FFFF;

/// Whether `address` can be dereferenced at all. Null and kernel-range values never can.
pub fn is_valid_pointer(address: Address) -> bool {
    (MIN_VALID_POINTER..=MAX_VALID_POINTER).contains(&address)
}

/// Whether `address` lies in the canonical user-mode half. Weaker than
/// [`is_valid_pointer`]: only null and non-canonical values are ruled out.
pub fn is_user_address(address: Address) -> bool {
    address != 0 && address <= MAX_VALID_POINTER
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessId(pub u32);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One contiguous range handed to [`RemoteMemory::read_scatter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadSpan {
    pub address: Address,
    pub len: usize,
}

impl ReadSpan {
    pub fn new(address: Address, len: usize) -> Self {
        Self { address, len }
    }

    pub fn end(&self) -> Address {
        self.address.saturating_add(self.len as u64)
    }
}

/// Finds target processes by name and opens handles to them.
pub trait ProcessProvider: Send + Sync {
    type Handle: RemoteMemory + 'static;

    fn find_process(&self, name: &str) -> Result<ProcessId>;

    fn open(&self, pid: ProcessId) -> Result<Self::Handle>;
}

/// An open handle to one target process instance.
///
/// All calls are synchronous and may be slow. Implementations must be usable from
/// the session worker and the write worker at the same time.
pub trait RemoteMemory: Send + Sync {
    fn pid(&self) -> ProcessId;

    fn module_base(&self, module: &str) -> Result<Address>;

    fn read_bytes(&self, address: Address, len: usize) -> Result<Vec<u8>>;

    /// Read every span in a single round trip.
    ///
    /// The result vector is index-aligned with `spans`; a failed span never fails
    /// its siblings. Backends without a native scatter primitive loop over
    /// [`read_bytes`](Self::read_bytes), which still counts as one grouped call.
    fn read_scatter(&self, spans: &[ReadSpan]) -> Vec<Result<Vec<u8>>> {
        spans
            .iter()
            .map(|span| self.read_bytes(span.address, span.len))
            .collect()
    }

    fn write_bytes(&self, address: Address, bytes: &[u8]) -> Result<()>;

    /// Write a batch of buffers, stopping at the first failure.
    fn write_scatter(&self, writes: &[(Address, Vec<u8>)]) -> Result<()> {
        for (address, bytes) in writes {
            self.write_bytes(*address, bytes)?;
        }
        Ok(())
    }
}

impl<T: RemoteMemory + ?Sized> RemoteMemory for std::sync::Arc<T> {
    fn pid(&self) -> ProcessId {
        (**self).pid()
    }

    fn module_base(&self, module: &str) -> Result<Address> {
        (**self).module_base(module)
    }

    fn read_bytes(&self, address: Address, len: usize) -> Result<Vec<u8>> {
        (**self).read_bytes(address, len)
    }

    fn read_scatter(&self, spans: &[ReadSpan]) -> Vec<Result<Vec<u8>>> {
        (**self).read_scatter(spans)
    }

    fn write_bytes(&self, address: Address, bytes: &[u8]) -> Result<()> {
        (**self).write_bytes(address, bytes)
    }

    fn write_scatter(&self, writes: &[(Address, Vec<u8>)]) -> Result<()> {
        (**self).write_scatter(writes)
    }
}

/// Typed one-off reads on top of [`RemoteMemory`].
///
/// Each call is its own round trip; the refresh loop uses [`ScatterBatch`] instead.
pub trait ReadMemory: RemoteMemory {
    fn read_value<T: Pod>(&self, address: Address) -> Result<T> {
        if address == 0 {
            return Err(Error::InvalidPointer(address));
        }
        let bytes = self.read_bytes(address, T::SIZE)?;
        T::from_le_slice(&bytes).ok_or_else(|| Error::MemoryReadFailed {
            address,
            message: format!("short read: {} of {} bytes", bytes.len(), T::SIZE),
        })
    }

    fn read_i32(&self, address: Address) -> Result<i32> {
        self.read_value(address)
    }

    fn read_u32(&self, address: Address) -> Result<u32> {
        self.read_value(address)
    }

    fn read_u64(&self, address: Address) -> Result<u64> {
        self.read_value(address)
    }

    fn read_f32(&self, address: Address) -> Result<f32> {
        self.read_value(address)
    }

    fn read_bool(&self, address: Address) -> Result<bool> {
        self.read_value(address)
    }

    /// Read a pointer and reject values that cannot be dereferenced.
    fn read_ptr(&self, address: Address) -> Result<Address> {
        let ptr = self.read_u64(address)?;
        if !is_valid_pointer(ptr) {
            return Err(Error::InvalidPointer(ptr));
        }
        Ok(ptr)
    }

    /// Follow `base + chain[0] -> + chain[1] -> ...`, dereferencing at every hop.
    fn read_ptr_chain(&self, base: Address, chain: &[u64]) -> Result<Address> {
        chain
            .iter()
            .try_fold(base, |addr, offset| self.read_ptr(addr.wrapping_add(*offset)))
    }

    fn read_text(&self, address: Address, layout: TextLayout) -> Result<String> {
        let mut batch = ScatterBatch::new();
        let slot = batch.add_text(address, layout);
        let results = ScatterReader::new(self, ScatterLimits::default()).execute(&batch);
        results.text(slot).map_err(|e| e.into_error(address))
    }

    fn read_list<T: Pod>(&self, address: Address, layout: ListLayout) -> Result<Vec<T>> {
        let mut batch = ScatterBatch::new();
        let slot = batch.add_list::<T>(address, layout);
        let results = ScatterReader::new(self, ScatterLimits::default()).execute(&batch);
        results.list(slot).map_err(|e| e.into_error(address))
    }
}

impl<M: RemoteMemory + ?Sized> ReadMemory for M {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::mock::MockMemoryBuilder;

    #[test]
    fn test_pointer_validity_bounds() {
        assert!(!is_valid_pointer(0));
        assert!(!is_valid_pointer(0xFFFF));
        assert!(is_valid_pointer(0x1_0000));
        assert!(is_valid_pointer(0x7FFF_FFFF_FFFF));
        assert!(!is_valid_pointer(0xFFFF_8000_0000_0000));

        assert!(!is_user_address(0));
        assert!(is_user_address(0x1000));
        assert!(!is_user_address(0x8000_0000_0000));
        assert!(!is_user_address(0xFFFF_FFFF_FFFF_FF00));
    }

    #[test]
    fn test_read_ptr_chain_follows_each_hop() {
        let mock = MockMemoryBuilder::new()
            .write_u64(0x10_0010, 0x20_0000)
            .write_u64(0x20_0008, 0x30_0000)
            .build();

        let end = mock.read_ptr_chain(0x10_0000, &[0x10, 0x8]).unwrap();
        assert_eq!(end, 0x30_0000);
    }

    #[test]
    fn test_read_ptr_rejects_null() {
        let mock = MockMemoryBuilder::new().write_u64(0x10_0000, 0).build();
        assert!(matches!(
            mock.read_ptr(0x10_0000),
            Err(Error::InvalidPointer(0))
        ));
    }

    #[test]
    fn test_read_value_null_address_fails_without_io() {
        let mock = MockMemoryBuilder::new().build();
        assert!(mock.read_i32(0).is_err());
        assert_eq!(mock.read_calls(), 0);
    }

    #[test]
    fn test_read_text_length_prefixed() {
        let mock = MockMemoryBuilder::new()
            .write_utf16_string(0x10_0000, "player-01")
            .build();

        let text = mock.read_text(0x10_0000, TextLayout::default()).unwrap();
        assert_eq!(text, "player-01");
    }
}
