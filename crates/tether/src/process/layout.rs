//! Memory layout constants for managed-runtime containers
//!
//! Default shapes for strings, arrays, lists and hash tables as laid out by a
//! 64-bit managed runtime. Offset tables may override any of them.

/// Managed string object
pub mod string {
    /// Length in UTF-16 code units (i32)
    pub const LENGTH: u64 = 0x10;
    /// First UTF-16 code unit
    pub const CHARS: u64 = 0x14;
}

/// Managed array object (`T[]`)
pub mod array {
    /// Element count (i32)
    pub const COUNT: u64 = 0x18;
    /// First element
    pub const DATA: u64 = 0x20;
}

/// Managed growable list (`List<T>`)
pub mod list {
    /// Pointer to the backing array
    pub const ITEMS: u64 = 0x10;
    /// Live element count (i32)
    pub const SIZE: u64 = 0x18;
}

/// Managed hash table (`Dictionary<K, V>` / `HashSet<T>`)
pub mod hash_table {
    /// Pointer to the entries array
    pub const ENTRIES: u64 = 0x18;
    /// Number of used entry slots (i32), free slots included
    pub const COUNT: u64 = 0x40;
    /// Entry header: hash code (i32), negative for free slots
    pub const ENTRY_HASH: u64 = 0x0;
    /// Entry header: next index (i32)
    pub const ENTRY_NEXT: u64 = 0x4;
    /// First payload byte after the entry header
    pub const ENTRY_PAYLOAD: u64 = 0x8;
}

/// Safety maxima applied to decoded lengths
pub mod limits {
    /// Largest element count accepted for any list or table
    pub const MAX_LIST_COUNT: usize = 16_384;
    /// Largest byte size accepted for any text payload
    pub const MAX_TEXT_BYTES: usize = 1024;
    /// Reads are coalesced only within one page of this size
    pub const PAGE_SIZE: u64 = 0x1000;
}

/// Health status tag bits
pub mod health {
    pub const HEALTHY: i32 = 0x400;
    pub const INJURED: i32 = 0x800;
    pub const BADLY_INJURED: i32 = 0x1000;
    pub const DYING: i32 = 0x2000;
}

/// Timing constants for polling and debouncing
pub mod timing {
    /// Interval between refresh cycles while a session is active (ms)
    pub const REFRESH_INTERVAL_MS: u64 = 133;

    /// Spacing between liveness probes (ms)
    pub const LIVENESS_INTERVAL_MS: u64 = 150;

    /// Consecutive failed liveness probes before the process counts as lost
    pub const LIVENESS_ATTEMPTS: u32 = 5;

    /// First wait between process lookups (ms)
    pub const LOCATE_INTERVAL_MS: u64 = 1000;

    /// Upper bound for the process lookup backoff (ms)
    pub const LOCATE_MAX_INTERVAL_MS: u64 = 5000;

    /// Pause after a session teardown before locating again (ms)
    pub const COOLDOWN_MS: u64 = 1000;

    /// Poll interval while waiting for a session to start (ms)
    pub const SESSION_POLL_INTERVAL_MS: u64 = 250;

    /// Minimum spacing between quest log refreshes (ms)
    pub const QUEST_REFRESH_INTERVAL_MS: u64 = 2000;

    /// Write worker interval while the process is ready (ms)
    pub const WRITE_ACTIVE_INTERVAL_MS: u64 = 10;

    /// Write worker interval while idle (ms)
    pub const WRITE_IDLE_INTERVAL_MS: u64 = 100;
}
