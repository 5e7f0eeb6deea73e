use crate::Error;
use crate::OwnershipRecord;
use std::sync::Arc;
use std::sync::Mutex;

/// Durable storage for the one host-wide [`OwnershipRecord`].
///
/// Every process of every participating application shares the same store.
/// `write` must be atomic: a concurrent `read` observes either the previous
/// record or the new one, never a mix. No other guarantee is required; every
/// protocol step is a single read followed by a single write.
pub trait CoordinationStore {
    /// Returns the stored record, or the empty record if none was written yet
    fn read(&self) -> Result<OwnershipRecord, Error>;

    /// Replaces the stored record unconditionally
    fn write(&self, record: &OwnershipRecord) -> Result<(), Error>;
}

impl<S: CoordinationStore + ?Sized> CoordinationStore for &S {
    fn read(&self) -> Result<OwnershipRecord, Error> {
        (**self).read()
    }

    fn write(&self, record: &OwnershipRecord) -> Result<(), Error> {
        (**self).write(record)
    }
}

impl<S: CoordinationStore + ?Sized> CoordinationStore for Arc<S> {
    fn read(&self) -> Result<OwnershipRecord, Error> {
        (**self).read()
    }

    fn write(&self, record: &OwnershipRecord) -> Result<(), Error> {
        (**self).write(record)
    }
}

/// In-process store. Clones share the same record, so several arbiters
/// created from clones behave like separate processes on one host.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    record: Arc<Mutex<OwnershipRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CoordinationStore for MemoryStore {
    fn read(&self) -> Result<OwnershipRecord, Error> {
        let record = self
            .record
            .lock()
            .map_err(|_| std::io::Error::other("memory store lock poisoned"))?;
        Ok(record.clone())
    }

    fn write(&self, record: &OwnershipRecord) -> Result<(), Error> {
        let mut stored = self
            .record
            .lock()
            .map_err(|_| std::io::Error::other("memory store lock poisoned"))?;
        *stored = record.clone();
        Ok(())
    }
}
