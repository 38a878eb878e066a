use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use super::PackageRecord;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("package index is sealed, refusing to add {0:?}")]
    Sealed(String),
}

/// Registry of scanned packages.
///
/// Scan workers add records concurrently; once population is done the index
/// is [sealed](PackageIndex::seal) and only read from. All serialized views
/// iterate in ascending record name order, independent of insertion order.
#[derive(Debug, Default)]
pub struct PackageIndex {
    entries: Mutex<HashMap<String, Arc<PackageRecord>>>,
    sealed: AtomicBool,
}

impl PackageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<PackageRecord>>> {
        // A map insert cannot leave the map half-updated.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace the record stored under `key`.
    pub fn add(
        &self,
        key: impl Into<String>,
        record: impl Into<Arc<PackageRecord>>,
    ) -> Result<(), IndexError> {
        let key = key.into();
        let mut entries = self.lock();
        // Checked under the lock so no insert can land after seal()
        if self.is_sealed() {
            return Err(IndexError::Sealed(key));
        }
        entries.insert(key, record.into());
        Ok(())
    }

    /// Mark the index read-only. Further [`add`](PackageIndex::add) calls fail.
    pub fn seal(&self) {
        let _entries = self.lock();
        self.sealed.store(true, Ordering::Release);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn get(&self, key: &str) -> Option<Arc<PackageRecord>> {
        self.lock().get(key).cloned()
    }

    /// All records in canonical order: by record name, then by key.
    pub fn records(&self) -> Vec<Arc<PackageRecord>> {
        let entries = self.lock();
        let mut sorted: Vec<_> = entries.iter().collect();
        sorted.sort_by(|(ka, a), (kb, b)| a.name.cmp(&b.name).then_with(|| ka.cmp(kb)));
        sorted.into_iter().map(|(_, r)| Arc::clone(r)).collect()
    }

    /// Record names in ascending order.
    pub fn sorted_names(&self) -> Vec<String> {
        self.records().iter().map(|r| r.name.clone()).collect()
    }

    /// Write the `Packages` file: one stanza per record, each followed by a
    /// blank line.
    pub fn control_to<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        for record in self.records() {
            record.control_and_checksum_to(w)?;
            writeln!(w)?;
        }
        Ok(())
    }

    /// Write `<mtime> <name>` per record.
    pub fn stamps_to<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        for record in self.records() {
            writeln!(w, "{} {}", record.mtime_unix(), record.name)?;
        }
        Ok(())
    }

    pub fn control_string(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail
        let _ = self.control_to(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }

    pub fn stamps_string(&self) -> String {
        let mut buf = Vec::new();
        let _ = self.stamps_to(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}
