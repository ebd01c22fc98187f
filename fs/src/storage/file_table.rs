use std::collections::HashMap;
use std::sync::Arc;

use crate::file::{FileEntry, FileHandle};

/// Slot array of the files a storage keeps open.
///
/// Closed slots go onto a free list and are reused by the next insert.
#[derive(Default)]
pub struct FileTable {
    slots: Vec<Option<Arc<FileEntry>>>,
    free: Vec<usize>,
    by_handle: HashMap<FileHandle, usize>,
}

impl FileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an entry and return its slot.
    ///
    /// # Panics
    ///
    /// Panics if another live entry already owns the same handle.
    pub fn insert(&mut self, entry: Arc<FileEntry>) -> usize {
        let handle = entry.handle();
        if let Some(existing) = self.get(handle) {
            panic!(
                "file handle collision: {:?} and {:?} both hash to {}",
                existing.name(),
                entry.name(),
                handle
            );
        }

        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entry);
                slot
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };
        self.by_handle.insert(handle, slot);
        slot
    }

    pub fn get(&self, handle: FileHandle) -> Option<&Arc<FileEntry>> {
        let slot = *self.by_handle.get(&handle)?;
        self.slots[slot].as_ref()
    }

    pub fn remove(&mut self, handle: FileHandle) -> Option<Arc<FileEntry>> {
        let slot = self.by_handle.remove(&handle)?;
        let entry = self.slots[slot].take();
        self.free.push(slot);
        entry
    }

    /// Remove every entry, returning them in slot order.
    pub fn drain(&mut self) -> Vec<Arc<FileEntry>> {
        self.by_handle.clear();
        self.free.clear();
        self.slots.drain(..).flatten().collect()
    }

    pub fn handles(&self) -> Vec<FileHandle> {
        self.slots.iter().flatten().map(|entry| entry.handle()).collect()
    }

    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }
}
