//! Reference-counted open-file object (spec §4.4). Grounded on
//! `original_source/kern/syscall/openfile.c` and
//! `kern/include/openfile.h`.

use alloc::sync::Arc;

use crate::error::{KernelError, KResult};
use crate::flags::{AccessMode, OpenFlags, Whence};
use crate::platform::{NodeFs, NodeHandle, Scheduler};
use crate::sync::{BlockingMutex, Spinlock};

/// Shared across `dup2` (two descriptors, one object) and `fork`
/// (two tables, same objects). Destroyed when `refcount` hits zero.
///
/// `refcount` and `offset` are guarded by separate locks so that
/// `dup2`/`fork`/`close` incrementing or decrementing the count never
/// blocks behind a long `read`/`write` holding `offset_lock` (spec
/// §4.4, §5).
pub struct OpenFile {
    node: NodeHandle,
    access_mode: AccessMode,
    offset_lock: BlockingMutex<u64>,
    refcount: Spinlock<u32>,
    node_fs: Arc<dyn NodeFs>,
}

impl OpenFile {
    /// Delegates to the node layer, derives the access mode by masking
    /// `flags`, and builds a fresh object with `refcount = 1`.
    pub fn open(
        path: &str,
        flags: OpenFlags,
        mode: u32,
        node_fs: Arc<dyn NodeFs>,
        scheduler: Arc<dyn Scheduler>,
    ) -> KResult<Arc<OpenFile>> {
        let access_mode = AccessMode::from_flags(flags)?;
        let node = node_fs.open(path, flags.bits(), mode).map_err(KernelError::Io)?;
        Ok(Arc::new(OpenFile {
            node,
            access_mode,
            offset_lock: BlockingMutex::new(0, scheduler),
            refcount: Spinlock::new(1),
            node_fs,
        }))
    }

    /// Takes only the refcount spinlock (spec §4.4).
    pub fn incref(&self) {
        *self.refcount.lock() += 1;
    }

    /// Takes only the refcount spinlock. Closes the underlying node
    /// once the count reaches zero. Returns whether this call
    /// destroyed the object, for callers that want to log it.
    pub fn decref(&self) -> bool {
        let mut count = self.refcount.lock();
        debug_assert!(*count > 0, "decref on an already-dead OpenFile");
        *count -= 1;
        if *count == 0 {
            self.node_fs.close(self.node);
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    pub fn refcount(&self) -> u32 {
        *self.refcount.lock()
    }

    pub fn read(&self, buf: &mut [u8]) -> KResult<usize> {
        if !self.access_mode.readable() {
            return Err(KernelError::BadFd);
        }
        let mut offset = self.offset_lock.lock();
        let n = self.node_fs.read(self.node, *offset, buf).map_err(KernelError::Io)?;
        *offset += n as u64;
        Ok(n)
    }

    pub fn write(&self, buf: &[u8]) -> KResult<usize> {
        if !self.access_mode.writable() {
            return Err(KernelError::BadFd);
        }
        let mut offset = self.offset_lock.lock();
        let n = self.node_fs.write(self.node, *offset, buf).map_err(KernelError::Io)?;
        *offset += n as u64;
        Ok(n)
    }

    /// Computes the new offset for `SET`/`CUR`/`END` (`END` calls the
    /// node's `size`), rejects a negative result, and stores it (spec
    /// §4.9).
    pub fn seek(&self, pos: i64, whence: Whence) -> KResult<u64> {
        let mut offset = self.offset_lock.lock();
        let base: i64 = match whence {
            Whence::Set => 0,
            Whence::Cur => *offset as i64,
            Whence::End => self.node_fs.size(self.node).map_err(KernelError::Io)? as i64,
        };
        let new_offset = base + pos;
        if new_offset < 0 {
            return Err(KernelError::InvalidArgument);
        }
        *offset = new_offset as u64;
        Ok(*offset)
    }

    pub fn current_offset(&self) -> u64 {
        *self.offset_lock.lock()
    }
}
