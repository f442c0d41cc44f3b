//! Request descriptions: where to read and how to decode.

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::process::Address;
use crate::process::layout::{array, hash_table, list, string};

/// Index of a request inside its [`ScatterBatch`](super::ScatterBatch).
pub type RequestId = usize;

/// Where a request reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// A known address.
    Fixed(Address),
    /// `*base + offset`, where `base` is a pointer read in an earlier round.
    Deref { base: RequestId, offset: u64 },
}

impl From<Address> for Target {
    fn from(address: Address) -> Self {
        Target::Fixed(address)
    }
}

/// How text is stored behind an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TextLayout {
    /// i32 length in UTF-16 units at `length_offset`, characters at `data_offset`.
    LengthPrefixedUtf16 { length_offset: u64, data_offset: u64 },
    /// Single-byte characters up to the first NUL.
    NullTerminated,
}

impl Default for TextLayout {
    fn default() -> Self {
        TextLayout::LengthPrefixedUtf16 {
            length_offset: string::LENGTH,
            data_offset: string::CHARS,
        }
    }
}

/// Shape of a homogeneous collection with a header-encoded count.
///
/// When `items_ptr_offset` is set the elements live in a separate buffer whose
/// address is stored at that offset; otherwise they follow the header inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListLayout {
    pub count_offset: u64,
    #[serde(default)]
    pub items_ptr_offset: Option<u64>,
    pub data_offset: u64,
}

impl ListLayout {
    /// Fixed-size array object with inline elements.
    pub const fn array() -> Self {
        Self {
            count_offset: array::COUNT,
            items_ptr_offset: None,
            data_offset: array::DATA,
        }
    }

    /// Growable list object pointing at a backing array.
    pub const fn list() -> Self {
        Self {
            count_offset: list::SIZE,
            items_ptr_offset: Some(list::ITEMS),
            data_offset: array::DATA,
        }
    }
}

impl Default for ListLayout {
    fn default() -> Self {
        Self::list()
    }
}

/// Shape of a hash table: an entries array with fixed-stride records.
///
/// Entries whose hash field is negative are free slots and are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapLayout {
    pub entries: ListLayout,
    pub entry_stride: u64,
    #[serde(default)]
    pub hash_offset: Option<u64>,
    pub key_offset: u64,
    #[serde(default)]
    pub value_offset: u64,
}

const fn align8(n: u64) -> u64 {
    (n + 7) & !7
}

fn hash_table_entries() -> ListLayout {
    ListLayout {
        count_offset: hash_table::COUNT,
        items_ptr_offset: Some(hash_table::ENTRIES),
        data_offset: array::DATA,
    }
}

impl MapLayout {
    /// Dictionary with keys and values packed after the entry header.
    pub fn dictionary(key_size: usize, value_size: usize) -> Self {
        let key_offset = hash_table::ENTRY_PAYLOAD;
        let value_offset = key_offset + key_size as u64;
        Self {
            entries: hash_table_entries(),
            entry_stride: align8(value_offset + value_size as u64),
            hash_offset: Some(hash_table::ENTRY_HASH),
            key_offset,
            value_offset,
        }
    }

    /// Hash set with one element per entry.
    pub fn hash_set(element_size: usize) -> Self {
        let key_offset = hash_table::ENTRY_PAYLOAD;
        Self {
            entries: hash_table_entries(),
            entry_stride: align8(key_offset + element_size as u64),
            hash_offset: Some(hash_table::ENTRY_HASH),
            key_offset,
            value_offset: key_offset + element_size as u64,
        }
    }
}

/// Decode contract attached to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decode {
    Value { size: usize },
    Text(TextLayout),
    List { layout: ListLayout, element_size: usize },
    Map { layout: MapLayout, key_size: usize, value_size: usize },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Request {
    pub target: Target,
    pub decode: Decode,
    pub round: usize,
}

macro_rules! slot_type {
    ($(#[$meta:meta])* $name:ident<$($p:ident),*>) => {
        $(#[$meta])*
        pub struct $name<$($p),*> {
            pub(crate) id: RequestId,
            _marker: PhantomData<fn() -> ($($p,)*)>,
        }

        impl<$($p),*> $name<$($p),*> {
            pub(crate) fn new(id: RequestId) -> Self {
                Self { id, _marker: PhantomData }
            }

            pub fn id(&self) -> RequestId {
                self.id
            }
        }

        impl<$($p),*> Clone for $name<$($p),*> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<$($p),*> Copy for $name<$($p),*> {}

        impl<$($p),*> std::fmt::Debug for $name<$($p),*> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.id)
            }
        }
    };
}

slot_type!(
    /// Handle to a fixed-size value request.
    Slot<T>
);
slot_type!(
    /// Handle to a list request.
    ListSlot<T>
);
slot_type!(
    /// Handle to a dictionary request.
    MapSlot<K, V>
);
slot_type!(
    /// Handle to a hash-set request.
    SetSlot<K>
);

/// Handle to a text request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSlot {
    pub(crate) id: RequestId,
}

impl TextSlot {
    pub fn id(&self) -> RequestId {
        self.id
    }
}

impl Slot<u64> {
    /// Target for a later round: the pointer this slot reads, plus `offset`.
    pub fn at(&self, offset: u64) -> Target {
        Target::Deref {
            base: self.id,
            offset,
        }
    }
}
