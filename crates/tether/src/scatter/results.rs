use thiserror::Error;

use crate::error::Error;
use crate::process::{Address, ByteBuffer, Pod};

use super::request::{ListSlot, MapSlot, RequestId, SetSlot, Slot, TextSlot};

/// Why a single request in a batch produced no value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("null address")]
    NullAddress,

    #[error("dependency request {0} failed")]
    Dependency(RequestId),

    #[error("dependency must point to an earlier round")]
    InvalidDependency,

    #[error("read of {len} bytes at {address:#x} failed: {message}")]
    Io {
        address: Address,
        len: usize,
        message: String,
    },

    #[error("process lost: {0}")]
    ProcessLost(String),

    #[error("length {len} exceeds safety maximum {max}")]
    LengthOutOfRange { len: i64, max: usize },

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("request was not executed")]
    NotExecuted,
}

impl ReadError {
    pub(crate) fn from_io(address: Address, len: usize, err: &Error) -> Self {
        match err {
            Error::ProcessLost(msg) => ReadError::ProcessLost(msg.clone()),
            other => ReadError::Io {
                address,
                len,
                message: other.to_string(),
            },
        }
    }

    pub fn is_process_lost(&self) -> bool {
        matches!(self, ReadError::ProcessLost(_))
    }

    /// Convert into a crate error, attributing it to `address`.
    pub fn into_error(self, address: Address) -> Error {
        match self {
            ReadError::NullAddress => Error::InvalidPointer(0),
            ReadError::Io {
                address, message, ..
            } => Error::MemoryReadFailed { address, message },
            ReadError::ProcessLost(msg) => Error::ProcessLost(msg),
            ReadError::LengthOutOfRange { len, max } => Error::LengthOutOfRange { len, max },
            ReadError::Decode(msg) => Error::Decode(msg),
            other => Error::MemoryReadFailed {
                address,
                message: other.to_string(),
            },
        }
    }
}

/// Decoded output of one request.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Payload {
    Bytes(Vec<u8>),
    Text(String),
    /// Fixed-size records; list elements, or key bytes followed by value bytes.
    Records { size: usize, bytes: Vec<u8> },
}

/// Per-request outcomes of an executed [`ScatterBatch`](super::ScatterBatch).
#[derive(Debug, Clone)]
pub struct ScatterResults {
    outcomes: Vec<Result<Payload, ReadError>>,
    addresses: Vec<Option<Address>>,
    io_calls: usize,
}

impl ScatterResults {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            outcomes: vec![Err(ReadError::NotExecuted); len],
            addresses: vec![None; len],
            io_calls: 0,
        }
    }

    pub(crate) fn store(&mut self, id: RequestId, outcome: Result<Payload, ReadError>) {
        self.outcomes[id] = outcome;
    }

    pub(crate) fn set_address(&mut self, id: RequestId, address: Address) {
        self.addresses[id] = Some(address);
    }

    pub(crate) fn outcome(&self, id: RequestId) -> &Result<Payload, ReadError> {
        &self.outcomes[id]
    }

    pub(crate) fn record_io_call(&mut self) {
        self.io_calls += 1;
    }

    /// Grouped read calls issued for this batch.
    pub fn io_calls(&self) -> usize {
        self.io_calls
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_err()).count()
    }

    /// Whether any request failed because the process went away.
    pub fn process_lost(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| matches!(o, Err(e) if e.is_process_lost()))
    }

    /// Address the request resolved to, if it got that far.
    pub fn address(&self, id: RequestId) -> Option<Address> {
        self.addresses.get(id).copied().flatten()
    }

    pub fn error(&self, id: RequestId) -> Option<&ReadError> {
        self.outcomes.get(id).and_then(|o| o.as_ref().err())
    }

    fn payload(&self, id: RequestId) -> Result<&Payload, ReadError> {
        match self.outcomes.get(id) {
            Some(Ok(payload)) => Ok(payload),
            Some(Err(e)) => Err(e.clone()),
            None => Err(ReadError::NotExecuted),
        }
    }

    fn records(&self, id: RequestId) -> Result<(usize, &[u8]), ReadError> {
        match self.payload(id)? {
            Payload::Records { size, bytes } => Ok((*size, bytes)),
            _ => Err(ReadError::Decode("request is not a collection".into())),
        }
    }

    pub fn get<T: Pod>(&self, slot: Slot<T>) -> Result<T, ReadError> {
        match self.payload(slot.id)? {
            Payload::Bytes(bytes) => T::from_le_slice(bytes)
                .ok_or_else(|| ReadError::Decode(format!("short value: {} bytes", bytes.len()))),
            _ => Err(ReadError::Decode("request is not a value".into())),
        }
    }

    pub fn text(&self, slot: TextSlot) -> Result<String, ReadError> {
        match self.payload(slot.id)? {
            Payload::Text(text) => Ok(text.clone()),
            _ => Err(ReadError::Decode("request is not text".into())),
        }
    }

    pub fn list<T: Pod>(&self, slot: ListSlot<T>) -> Result<Vec<T>, ReadError> {
        let (size, bytes) = self.records(slot.id)?;
        ByteBuffer::new(bytes)
            .records(size)
            .map(|rec| {
                rec.value_at::<T>(0)
                    .ok_or_else(|| ReadError::Decode("short element".into()))
            })
            .collect()
    }

    pub fn entries<K: Pod, V: Pod>(&self, slot: MapSlot<K, V>) -> Result<Vec<(K, V)>, ReadError> {
        let (size, bytes) = self.records(slot.id)?;
        ByteBuffer::new(bytes)
            .records(size)
            .map(|rec| match (rec.value_at::<K>(0), rec.value_at::<V>(K::SIZE)) {
                (Some(k), Some(v)) => Ok((k, v)),
                _ => Err(ReadError::Decode("short entry".into())),
            })
            .collect()
    }

    pub fn set<K: Pod>(&self, slot: SetSlot<K>) -> Result<Vec<K>, ReadError> {
        let (size, bytes) = self.records(slot.id)?;
        ByteBuffer::new(bytes)
            .records(size)
            .map(|rec| {
                rec.value_at::<K>(0)
                    .ok_or_else(|| ReadError::Decode("short entry".into()))
            })
            .collect()
    }
}
