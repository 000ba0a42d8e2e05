//! Per-process file descriptor table (spec §4.5). Grounded on
//! `original_source/kern/syscall/filetable.c` and
//! `kern/include/filetable.h` — a fixed-size array, linear-scan add.

use alloc::sync::Arc;

use crate::constants::OPEN_MAX;
use crate::error::{KernelError, KResult};
use crate::openfile::OpenFile;

pub struct FileTable {
    slots: [Option<Arc<OpenFile>>; OPEN_MAX],
}

impl FileTable {
    pub fn new() -> Self {
        FileTable { slots: core::array::from_fn(|_| None) }
    }

    /// Linear scan for the first empty slot. Fails with
    /// `TooManyOpenFiles` if none (spec §4.5).
    pub fn add(&mut self, file: Arc<OpenFile>) -> KResult<usize> {
        for (fd, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(file);
                return Ok(fd);
            }
        }
        Err(KernelError::TooManyOpenFiles)
    }

    /// Installs `file` at exactly `fd`, growing past any existing
    /// occupant. Used by `dup2`, which has already decided the target
    /// slot (spec §4.9).
    pub fn install(&mut self, fd: usize, file: Arc<OpenFile>) -> KResult<()> {
        let slot = self.slots.get_mut(fd).ok_or(KernelError::BadFd)?;
        *slot = Some(file);
        Ok(())
    }

    pub fn get(&self, fd: usize) -> KResult<Arc<OpenFile>> {
        self.slots.get(fd).and_then(|s| s.clone()).ok_or(KernelError::BadFd)
    }

    /// Clears the slot. Does not decref; the caller (a syscall body)
    /// decides when to decref, since `dup2`'s close-then-install path
    /// needs the old file available a moment longer (spec §4.5).
    pub fn remove(&mut self, fd: usize) -> KResult<Arc<OpenFile>> {
        let slot = self.slots.get_mut(fd).ok_or(KernelError::BadFd)?;
        slot.take().ok_or(KernelError::BadFd)
    }

    pub fn is_occupied(&self, fd: usize) -> bool {
        self.slots.get(fd).map(|s| s.is_some()).unwrap_or(false)
    }

    /// Copies every occupied entry into a new table, incrementing the
    /// refcount on each shared open-file (spec §4.5, used by `fork`).
    pub fn fork_copy(&self) -> FileTable {
        let mut new = FileTable::new();
        for (fd, slot) in self.slots.iter().enumerate() {
            if let Some(file) = slot {
                file.incref();
                new.slots[fd] = Some(file.clone());
            }
        }
        new
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.is_none())
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}
