//! In-memory target process for tests.
//!
//! [`MockProcess`] is both a [`ProcessProvider`] and a [`RemoteMemory`]. Clones share
//! the same state, so a test keeps one clone to script the process (kill it, respawn
//! it, rewrite memory) while the code under test holds another.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::layout::string;
use super::{Address, Pod, ProcessId, ProcessProvider, ReadSpan, RemoteMemory};
use crate::error::{Error, Result};

const PAGE: u64 = 0x1000;

type Page = Box<[u8; PAGE as usize]>;

#[derive(Default)]
struct MockState {
    process_name: String,
    pid: Option<ProcessId>,
    modules: HashMap<String, Address>,
    pages: HashMap<u64, Page>,
    find_failures: u32,
}

impl MockState {
    fn write(&mut self, address: Address, bytes: &[u8]) {
        for (i, byte) in bytes.iter().enumerate() {
            let addr = address + i as u64;
            let page = self
                .pages
                .entry(addr / PAGE)
                .or_insert_with(|| Box::new([0u8; PAGE as usize]));
            page[(addr % PAGE) as usize] = *byte;
        }
    }

    fn read(&self, address: Address, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len);
        let mut addr = address;
        let end = address
            .checked_add(len as u64)
            .ok_or(Error::InvalidPointer(address))?;

        while addr < end {
            let page = self
                .pages
                .get(&(addr / PAGE))
                .ok_or_else(|| Error::MemoryReadFailed {
                    address,
                    message: format!("page {:#x} not mapped", addr & !(PAGE - 1)),
                })?;
            let start = (addr % PAGE) as usize;
            let take = ((end - addr) as usize).min(PAGE as usize - start);
            out.extend_from_slice(&page[start..start + take]);
            addr += take as u64;
        }
        Ok(out)
    }
}

struct MockInner {
    state: Mutex<MockState>,
    read_calls: AtomicUsize,
    scatter_calls: AtomicUsize,
    write_calls: AtomicUsize,
}

/// Scriptable in-memory process.
#[derive(Clone)]
pub struct MockProcess {
    inner: Arc<MockInner>,
    /// Pid this handle was opened for; `None` for handles made by the builder.
    opened: Option<ProcessId>,
}

impl MockProcess {
    fn state(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not cascade into every other assertion.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_alive(&self, state: &MockState) -> Result<()> {
        match (state.pid, self.opened) {
            (None, _) => Err(Error::ProcessLost("process exited".into())),
            (Some(live), Some(opened)) if live != opened => {
                Err(Error::ProcessLost(format!("pid {opened} no longer running")))
            }
            _ => Ok(()),
        }
    }

    /// Number of grouped read calls (`read_bytes` and `read_scatter` each count once).
    pub fn read_calls(&self) -> usize {
        self.inner.read_calls.load(Ordering::SeqCst)
    }

    /// Number of `read_scatter` calls.
    pub fn scatter_calls(&self) -> usize {
        self.inner.scatter_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.inner.write_calls.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.inner.read_calls.store(0, Ordering::SeqCst);
        self.inner.scatter_calls.store(0, Ordering::SeqCst);
        self.inner.write_calls.store(0, Ordering::SeqCst);
    }

    /// Terminate the process: lookups fail and every handle stops working.
    pub fn kill(&self) {
        self.state().pid = None;
    }

    /// Bring the process back under a new pid. Memory is kept.
    pub fn respawn(&self, pid: u32) {
        self.state().pid = Some(ProcessId(pid));
    }

    /// Make the next `n` process lookups fail as if the process were not started yet.
    pub fn set_find_failures(&self, n: u32) {
        self.state().find_failures = n;
    }

    pub fn set_module(&self, name: &str, base: Address) {
        self.state().modules.insert(name.to_string(), base);
    }

    pub fn remove_module(&self, name: &str) {
        self.state().modules.remove(name);
    }

    pub fn set_bytes(&self, address: Address, bytes: &[u8]) {
        self.state().write(address, bytes);
    }

    pub fn set_value<T: Pod>(&self, address: Address, value: T) {
        self.set_bytes(address, &value.to_le_vec());
    }

    pub fn set_u64(&self, address: Address, value: u64) {
        self.set_value(address, value);
    }

    pub fn set_i32(&self, address: Address, value: i32) {
        self.set_value(address, value);
    }

    pub fn set_f32(&self, address: Address, value: f32) {
        self.set_value(address, value);
    }

    pub fn set_utf16_string(&self, address: Address, text: &str) {
        let mut state = self.state();
        write_utf16(&mut state, address, text);
    }

    /// Drop the page containing `address` so reads touching it fail.
    pub fn unmap_page(&self, address: Address) {
        self.state().pages.remove(&(address / PAGE));
    }

    pub fn peek_bytes(&self, address: Address, len: usize) -> Option<Vec<u8>> {
        self.state().read(address, len).ok()
    }
}

fn write_utf16(state: &mut MockState, address: Address, text: &str) {
    let units: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
    let len = (units.len() / 2) as i32;
    state.write(address + string::LENGTH, &len.to_le_bytes());
    state.write(address + string::CHARS, &units);
}

impl ProcessProvider for MockProcess {
    type Handle = MockProcess;

    fn find_process(&self, name: &str) -> Result<ProcessId> {
        let mut state = self.state();
        if state.find_failures > 0 {
            state.find_failures -= 1;
            return Err(Error::ProcessNotFound(name.to_string()));
        }
        match state.pid {
            Some(pid) if state.process_name.eq_ignore_ascii_case(name) => Ok(pid),
            _ => Err(Error::ProcessNotFound(name.to_string())),
        }
    }

    fn open(&self, pid: ProcessId) -> Result<MockProcess> {
        if self.state().pid != Some(pid) {
            return Err(Error::ProcessOpenFailed(format!("pid {pid} not running")));
        }
        Ok(MockProcess {
            inner: Arc::clone(&self.inner),
            opened: Some(pid),
        })
    }
}

impl RemoteMemory for MockProcess {
    fn pid(&self) -> ProcessId {
        self.opened
            .or(self.state().pid)
            .unwrap_or(ProcessId(0))
    }

    fn module_base(&self, module: &str) -> Result<Address> {
        let state = self.state();
        self.check_alive(&state)?;
        state
            .modules
            .get(module)
            .copied()
            .ok_or_else(|| Error::ModuleNotFound(module.to_string()))
    }

    fn read_bytes(&self, address: Address, len: usize) -> Result<Vec<u8>> {
        self.inner.read_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state();
        self.check_alive(&state)?;
        state.read(address, len)
    }

    fn read_scatter(&self, spans: &[ReadSpan]) -> Vec<Result<Vec<u8>>> {
        self.inner.read_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.scatter_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state();
        spans
            .iter()
            .map(|span| {
                self.check_alive(&state)?;
                state.read(span.address, span.len)
            })
            .collect()
    }

    fn write_bytes(&self, address: Address, bytes: &[u8]) -> Result<()> {
        self.inner.write_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();
        self.check_alive(&state)?;
        state.write(address, bytes);
        Ok(())
    }
}

/// Builder for [`MockProcess`].
pub struct MockMemoryBuilder {
    state: MockState,
}

impl MockMemoryBuilder {
    pub fn new() -> Self {
        Self {
            state: MockState {
                process_name: "target.exe".to_string(),
                pid: Some(ProcessId(1000)),
                ..Default::default()
            },
        }
    }

    pub fn process(mut self, name: &str, pid: u32) -> Self {
        self.state.process_name = name.to_string();
        self.state.pid = Some(ProcessId(pid));
        self
    }

    pub fn module(mut self, name: &str, base: Address) -> Self {
        self.state.modules.insert(name.to_string(), base);
        self
    }

    pub fn write_bytes(mut self, address: Address, bytes: &[u8]) -> Self {
        self.state.write(address, bytes);
        self
    }

    pub fn write_value<T: Pod>(self, address: Address, value: T) -> Self {
        self.write_bytes(address, &value.to_le_vec())
    }

    pub fn write_u64(self, address: Address, value: u64) -> Self {
        self.write_value(address, value)
    }

    pub fn write_i32(self, address: Address, value: i32) -> Self {
        self.write_value(address, value)
    }

    pub fn write_u8(self, address: Address, value: u8) -> Self {
        self.write_value(address, value)
    }

    pub fn write_f32(self, address: Address, value: f32) -> Self {
        self.write_value(address, value)
    }

    /// Managed string object: i32 length at +0x10, UTF-16 units from +0x14.
    pub fn write_utf16_string(mut self, address: Address, text: &str) -> Self {
        write_utf16(&mut self.state, address, text);
        self
    }

    pub fn write_cstr(self, address: Address, text: &str) -> Self {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        self.write_bytes(address, &bytes)
    }

    /// Map a zeroed page so reads there succeed.
    pub fn map_page(mut self, address: Address) -> Self {
        self.state
            .pages
            .entry(address / PAGE)
            .or_insert_with(|| Box::new([0u8; PAGE as usize]));
        self
    }

    pub fn build(self) -> MockProcess {
        MockProcess {
            inner: Arc::new(MockInner {
                state: Mutex::new(self.state),
                read_calls: AtomicUsize::new(0),
                scatter_calls: AtomicUsize::new(0),
                write_calls: AtomicUsize::new(0),
            }),
            opened: None,
        }
    }
}

impl Default for MockMemoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
