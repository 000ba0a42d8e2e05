//! Concurrency primitives (spec §5). `Spinlock` is a thin wrapper over
//! the `spin` crate the teacher already depends on. `BlockingMutex`
//! and `CondVar` are this crate's own wait-channel monitor pair, built
//! on top of the injected [`crate::platform::Scheduler`] rather than
//! spinning — mirroring the relationship between `lock.c`/`synch.c`
//! and the scheduler in the original teaching kernel.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicUsize, Ordering};

use alloc::sync::Arc;

use crate::platform::Scheduler;

/// A short, non-blocking critical section. Holding one across any
/// operation that might sleep is forbidden (spec §5 lock ordering).
pub struct Spinlock<T>(spin::Mutex<T>);

impl<T> Spinlock<T> {
    pub const fn new(data: T) -> Self {
        Spinlock(spin::Mutex::new(data))
    }

    pub fn lock(&self) -> spin::MutexGuard<'_, T> {
        self.0.lock()
    }
}

fn next_channel() -> usize {
    static NEXT: AtomicUsize = AtomicUsize::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// A mutex that suspends the calling thread (via the injected
/// [`Scheduler`]) instead of spinning when contended. Used for
/// critical sections that may be held across I/O (the process table,
/// an open-file's `offset_lock`).
pub struct BlockingMutex<T> {
    locked: spin::Mutex<bool>,
    data: UnsafeCell<T>,
    scheduler: Arc<dyn Scheduler>,
    chan: usize,
}

unsafe impl<T: Send> Send for BlockingMutex<T> {}
unsafe impl<T: Send> Sync for BlockingMutex<T> {}

impl<T> BlockingMutex<T> {
    pub fn new(data: T, scheduler: Arc<dyn Scheduler>) -> Self {
        BlockingMutex {
            locked: spin::Mutex::new(false),
            data: UnsafeCell::new(data),
            scheduler,
            chan: next_channel(),
        }
    }

    pub fn lock(&self) -> BlockingMutexGuard<'_, T> {
        loop {
            let mut locked = self.locked.lock();
            if !*locked {
                *locked = true;
                return BlockingMutexGuard { mutex: self };
            }
            drop(locked);
            self.scheduler.sleep_on(self.chan);
        }
    }
}

pub struct BlockingMutexGuard<'a, T> {
    mutex: &'a BlockingMutex<T>,
}

impl<'a, T> Deref for BlockingMutexGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<'a, T> DerefMut for BlockingMutexGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<'a, T> Drop for BlockingMutexGuard<'a, T> {
    fn drop(&mut self) {
        *self.mutex.locked.lock() = false;
        self.mutex.scheduler.wakeup_one(self.mutex.chan);
    }
}

/// A condition variable used exactly the way `wait_cv` is used in
/// spec §4.6: a waiter releases its `BlockingMutex` guard, sleeps on
/// the channel, and reacquires the same mutex on wake, re-checking its
/// predicate (there is no generic cancellation, spec §5).
#[derive(Clone)]
pub struct CondVar {
    chan: usize,
    scheduler: Arc<dyn Scheduler>,
}

impl CondVar {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        CondVar { chan: next_channel(), scheduler }
    }

    /// Releases `guard`, sleeps until signalled, then reacquires the
    /// same mutex and returns the new guard. The caller must re-check
    /// its wait predicate after this returns (spurious wakeups are
    /// possible, matching a real wchan).
    pub fn wait<'a, T>(&self, guard: BlockingMutexGuard<'a, T>) -> BlockingMutexGuard<'a, T> {
        let mutex = guard.mutex;
        drop(guard);
        self.scheduler.sleep_on(self.chan);
        mutex.lock()
    }

    pub fn signal(&self) {
        self.scheduler.wakeup_one(self.chan);
    }

    pub fn broadcast(&self) {
        self.scheduler.wakeup_all(self.chan);
    }
}
