//! Registration set tracking with debounced removal.

use std::collections::{HashMap, HashSet};

use crate::process::Address;

/// Outcome of diffing one registration sweep against the tracked set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationDiff {
    /// First seen this sweep, in sweep order
    pub added: Vec<Address>,
    /// Seen this sweep and the one before
    pub retained: Vec<Address>,
    /// Missing this sweep, not yet long enough to evict
    pub pending: Vec<Address>,
    /// Missing for the full debounce window; no longer tracked
    pub evicted: Vec<Address>,
}

impl RegistrationDiff {
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.evicted.is_empty()
    }
}

/// Root addresses considered live, in first-seen order.
#[derive(Debug)]
pub struct RegistrationTracker {
    debounce: u32,
    order: Vec<Address>,
    misses: HashMap<Address, u32>,
}

impl RegistrationTracker {
    /// `debounce` is the number of consecutive missing sweeps that evicts an address.
    pub fn new(debounce: u32) -> Self {
        Self {
            debounce: debounce.max(1),
            order: Vec::new(),
            misses: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, address: Address) -> bool {
        self.misses.contains_key(&address)
    }

    /// Tracked addresses in first-seen order.
    pub fn addresses(&self) -> &[Address] {
        &self.order
    }

    /// Diff a new sweep. Null entries and duplicates are ignored.
    pub fn observe(&mut self, sweep: &[Address]) -> RegistrationDiff {
        let mut diff = RegistrationDiff::default();
        let mut seen = HashSet::with_capacity(sweep.len());

        for &address in sweep {
            if address == 0 || !seen.insert(address) {
                continue;
            }
            match self.misses.get_mut(&address) {
                Some(misses) => {
                    *misses = 0;
                    diff.retained.push(address);
                }
                None => {
                    self.misses.insert(address, 0);
                    self.order.push(address);
                    diff.added.push(address);
                }
            }
        }

        for &address in &self.order {
            if seen.contains(&address) {
                continue;
            }
            let Some(misses) = self.misses.get_mut(&address) else {
                continue;
            };
            *misses += 1;
            if *misses >= self.debounce {
                diff.evicted.push(address);
            } else {
                diff.pending.push(address);
            }
        }

        for address in &diff.evicted {
            self.misses.remove(address);
        }
        if !diff.evicted.is_empty() {
            self.order.retain(|a| self.misses.contains_key(a));
        }

        diff
    }

    /// Stop tracking `address` so the next sweep that contains it reports it as added.
    pub fn forget(&mut self, address: Address) {
        if self.misses.remove(&address).is_some() {
            self.order.retain(|&a| a != address);
        }
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.misses.clear();
    }
}
