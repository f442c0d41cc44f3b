//! Native process access.

use super::{Address, ProcessId, ProcessProvider, RemoteMemory};
use crate::error::{Error, Result};

/// Locates and opens processes on the local machine.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProvider;

impl SystemProvider {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "windows")]
mod native {
    use std::ffi::c_void;
    use std::mem;

    use tracing::debug;
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::System::Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory};
    use windows::Win32::System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, MODULEENTRY32W, Module32FirstW, Module32NextW, PROCESSENTRY32W,
        Process32FirstW, Process32NextW, TH32CS_SNAPMODULE, TH32CS_SNAPMODULE32,
        TH32CS_SNAPPROCESS,
    };
    use windows::Win32::System::Threading::{
        OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_VM_OPERATION, PROCESS_VM_READ,
        PROCESS_VM_WRITE,
    };

    use super::*;

    fn wide_to_string(wide: &[u16]) -> String {
        let end = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
        String::from_utf16_lossy(&wide[..end])
    }

    /// Closes the wrapped ToolHelp snapshot on drop.
    struct Snapshot(HANDLE);

    impl Snapshot {
        fn processes() -> Result<Self> {
            // SAFETY: CreateToolhelp32Snapshot has no pointer arguments.
            unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }
                .map(Self)
                .map_err(|e| Error::ProcessNotFound(format!("process snapshot failed: {e}")))
        }

        fn modules(pid: ProcessId) -> Result<Self> {
            // SAFETY: as above.
            unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, pid.0) }
                .map(Self)
                .map_err(|e| Error::ModuleNotFound(format!("module snapshot failed: {e}")))
        }
    }

    impl Drop for Snapshot {
        fn drop(&mut self) {
            // SAFETY: the handle came from CreateToolhelp32Snapshot and is closed once.
            unsafe {
                let _ = CloseHandle(self.0);
            }
        }
    }

    pub(super) fn find_process(name: &str) -> Result<ProcessId> {
        let snapshot = Snapshot::processes()?;
        let mut entry = PROCESSENTRY32W {
            dwSize: mem::size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };

        // SAFETY: entry is a properly sized PROCESSENTRY32W owned by this frame.
        let mut more = unsafe { Process32FirstW(snapshot.0, &mut entry) }.is_ok();
        while more {
            if wide_to_string(&entry.szExeFile).eq_ignore_ascii_case(name) {
                return Ok(ProcessId(entry.th32ProcessID));
            }
            // SAFETY: as above.
            more = unsafe { Process32NextW(snapshot.0, &mut entry) }.is_ok();
        }

        Err(Error::ProcessNotFound(name.to_string()))
    }

    /// Open handle to a process with read and write access.
    pub struct ProcessHandle {
        handle: HANDLE,
        pid: ProcessId,
    }

    // SAFETY: a process HANDLE is a kernel object reference. ReadProcessMemory and
    // WriteProcessMemory may be called on it from any thread concurrently.
    unsafe impl Send for ProcessHandle {}
    unsafe impl Sync for ProcessHandle {}

    impl ProcessHandle {
        pub fn open(pid: ProcessId) -> Result<Self> {
            let access = PROCESS_VM_READ
                | PROCESS_VM_WRITE
                | PROCESS_VM_OPERATION
                | PROCESS_QUERY_LIMITED_INFORMATION;
            // SAFETY: OpenProcess has no pointer arguments.
            let handle = unsafe { OpenProcess(access, false, pid.0) }
                .map_err(|e| Error::ProcessOpenFailed(format!("pid {pid}: {e}")))?;
            debug!("Opened process {}", pid);
            Ok(Self { handle, pid })
        }
    }

    impl Drop for ProcessHandle {
        fn drop(&mut self) {
            // SAFETY: the handle came from OpenProcess and is closed once.
            unsafe {
                let _ = CloseHandle(self.handle);
            }
        }
    }

    impl RemoteMemory for ProcessHandle {
        fn pid(&self) -> ProcessId {
            self.pid
        }

        fn module_base(&self, module: &str) -> Result<Address> {
            let snapshot = Snapshot::modules(self.pid)?;
            let mut entry = MODULEENTRY32W {
                dwSize: mem::size_of::<MODULEENTRY32W>() as u32,
                ..Default::default()
            };

            // SAFETY: entry is a properly sized MODULEENTRY32W owned by this frame.
            let mut more = unsafe { Module32FirstW(snapshot.0, &mut entry) }.is_ok();
            while more {
                if wide_to_string(&entry.szModule).eq_ignore_ascii_case(module) {
                    return Ok(entry.modBaseAddr as Address);
                }
                // SAFETY: as above.
                more = unsafe { Module32NextW(snapshot.0, &mut entry) }.is_ok();
            }

            Err(Error::ModuleNotFound(module.to_string()))
        }

        fn read_bytes(&self, address: Address, len: usize) -> Result<Vec<u8>> {
            let mut buffer = vec![0u8; len];
            let mut read = 0usize;
            // SAFETY: buffer holds len writable bytes; the remote address is only
            // dereferenced by the kernel, which validates it.
            unsafe {
                ReadProcessMemory(
                    self.handle,
                    address as *const c_void,
                    buffer.as_mut_ptr().cast(),
                    len,
                    Some(&mut read),
                )
            }
            .map_err(|e| Error::MemoryReadFailed {
                address,
                message: e.to_string(),
            })?;

            if read != len {
                return Err(Error::MemoryReadFailed {
                    address,
                    message: format!("partial read: {read} of {len} bytes"),
                });
            }
            Ok(buffer)
        }

        fn write_bytes(&self, address: Address, bytes: &[u8]) -> Result<()> {
            let mut written = 0usize;
            // SAFETY: bytes is a live slice of bytes.len() readable bytes.
            unsafe {
                WriteProcessMemory(
                    self.handle,
                    address as *const c_void,
                    bytes.as_ptr().cast(),
                    bytes.len(),
                    Some(&mut written),
                )
            }
            .map_err(|e| Error::MemoryWriteFailed {
                address,
                message: e.to_string(),
            })?;

            if written != bytes.len() {
                return Err(Error::MemoryWriteFailed {
                    address,
                    message: format!("partial write: {written} of {} bytes", bytes.len()),
                });
            }
            Ok(())
        }
    }
}

#[cfg(not(target_os = "windows"))]
mod native {
    use super::*;

    const UNSUPPORTED: &str = "unsupported platform";

    pub(super) fn find_process(_name: &str) -> Result<ProcessId> {
        Err(Error::ProcessOpenFailed(UNSUPPORTED.to_string()))
    }

    /// Open handle to a process. Only available on Windows.
    pub struct ProcessHandle {
        pid: ProcessId,
    }

    impl ProcessHandle {
        pub fn open(_pid: ProcessId) -> Result<Self> {
            Err(Error::ProcessOpenFailed(UNSUPPORTED.to_string()))
        }
    }

    impl RemoteMemory for ProcessHandle {
        fn pid(&self) -> ProcessId {
            self.pid
        }

        fn module_base(&self, _module: &str) -> Result<Address> {
            Err(Error::ProcessOpenFailed(UNSUPPORTED.to_string()))
        }

        fn read_bytes(&self, address: Address, _len: usize) -> Result<Vec<u8>> {
            Err(Error::MemoryReadFailed {
                address,
                message: UNSUPPORTED.to_string(),
            })
        }

        fn write_bytes(&self, address: Address, _bytes: &[u8]) -> Result<()> {
            Err(Error::MemoryWriteFailed {
                address,
                message: UNSUPPORTED.to_string(),
            })
        }
    }
}

pub use native::ProcessHandle;

impl ProcessProvider for SystemProvider {
    type Handle = ProcessHandle;

    fn find_process(&self, name: &str) -> Result<ProcessId> {
        native::find_process(name)
    }

    fn open(&self, pid: ProcessId) -> Result<ProcessHandle> {
        ProcessHandle::open(pid)
    }
}
