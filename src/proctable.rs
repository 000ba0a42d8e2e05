//! Global process table (spec §4.6). Grounded on
//! `original_source/kern/proc/proctable.c` and
//! `kern/include/proctable.h`/`pidtable.h`. The canonical
//! reparent/reap-then-branch-on-own-parent ordering resolves the
//! original's conflated `proctable_exit` branches (see DESIGN.md).

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use crate::constants::{Pid, ProcTableConfig, INIT_PID};
use crate::error::{KernelError, KResult};
use crate::platform::Scheduler;
use crate::sync::{BlockingMutex, CondVar};

/// Encodes an exit code the way `_MKWAIT_EXIT` does: the code occupies
/// bits [8..15] of the wait status (spec §6).
pub fn mkwait_exit(code: i32) -> i32 {
    (code & 0xff) << 8
}

/// Decodes a wait status produced by [`mkwait_exit`].
pub fn wexitstatus(status: i32) -> i32 {
    (status >> 8) & 0xff
}

pub struct ProcInfo {
    pub ppid: Pid,
    pub exited: bool,
    pub exit_status: i32,
    pub wait_cv: CondVar,
}

struct Inner {
    slots: Vec<Option<ProcInfo>>,
}

pub struct ProcessTable {
    inner: BlockingMutex<Inner>,
    scheduler: Arc<dyn Scheduler>,
}

impl ProcessTable {
    /// Allocates slot `INIT_PID` with `ppid = 0` for the initial
    /// kernel process (spec §4.6).
    pub fn bootstrap(config: ProcTableConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        let mut slots = vec![None; config.procs_max];
        slots[INIT_PID as usize] = Some(ProcInfo {
            ppid: 0,
            exited: false,
            exit_status: 0,
            wait_cv: CondVar::new(scheduler.clone()),
        });
        ProcessTable { inner: BlockingMutex::new(Inner { slots }, scheduler.clone()), scheduler }
    }

    /// Finds the lowest unused slot (not merely a counter, so reaped
    /// slots are reusable) and allocates its `ProcInfo` with
    /// `ppid = parent`. Fails with `TooManyProcesses` if full.
    pub fn assign(&self, parent: Pid) -> KResult<Pid> {
        let mut inner = self.inner.lock();
        for i in 1..inner.slots.len() {
            if inner.slots[i].is_none() {
                inner.slots[i] = Some(ProcInfo {
                    ppid: parent,
                    exited: false,
                    exit_status: 0,
                    wait_cv: CondVar::new(self.scheduler.clone()),
                });
                return Ok(i as Pid);
            }
        }
        Err(KernelError::TooManyProcesses)
    }

    /// Marks `pid` exited, reparents and reaps its zombie children,
    /// then either signals a live parent (slot persists until reaped)
    /// or clears its own slot (orphan) immediately.
    pub fn exit(&self, pid: Pid, status: i32) {
        let mut inner = self.inner.lock();
        {
            let slot = inner.slots[pid as usize].as_mut().expect("exit on an unassigned pid");
            slot.exited = true;
            slot.exit_status = status;
        }

        let n = inner.slots.len();
        for i in 1..n {
            let orphan_and_dead = match inner.slots[i].as_mut() {
                Some(child) if child.ppid == pid => {
                    child.ppid = 0;
                    child.exited
                }
                _ => false,
            };
            if orphan_and_dead {
                inner.slots[i] = None;
            }
        }

        let has_live_parent = inner.slots[pid as usize].as_ref().unwrap().ppid != 0;
        if has_live_parent {
            inner.slots[pid as usize].as_ref().unwrap().wait_cv.signal();
        } else {
            inner.slots[pid as usize] = None;
        }
    }

    /// Blocks until `pid` has exited, then returns its exit status and
    /// frees the slot. Only `pid`'s parent may reap it.
    pub fn wait(&self, caller: Pid, pid: Pid) -> KResult<i32> {
        let mut inner = self.inner.lock();
        {
            let slot = inner
                .slots
                .get(pid as usize)
                .and_then(|s| s.as_ref())
                .ok_or(KernelError::NoSuchProcess)?;
            if slot.ppid != caller {
                return Err(KernelError::NotAChild);
            }
        }
        loop {
            let exited = inner.slots[pid as usize].as_ref().unwrap().exited;
            if exited {
                break;
            }
            let cv = inner.slots[pid as usize].as_ref().unwrap().wait_cv.clone();
            inner = cv.wait(inner);
        }
        let status = inner.slots[pid as usize].as_ref().unwrap().exit_status;
        inner.slots[pid as usize] = None;
        Ok(status)
    }

    /// Directly frees a slot without going through `exit`/`wait`.
    /// Used only to unwind a `fork` that assigned a pid but failed a
    /// later step before the child ever ran (spec §4.7: "any failure
    /// at any step must unwind already-acquired resources").
    pub fn unassign(&self, pid: Pid) {
        let mut inner = self.inner.lock();
        inner.slots[pid as usize] = None;
    }

    #[cfg(test)]
    pub fn is_present(&self, pid: Pid) -> bool {
        self.inner.lock().slots[pid as usize].is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ProcTableConfig;
    use crate::testing::TestScheduler;
    use alloc::sync::Arc;

    fn table(procs_max: usize) -> ProcessTable {
        ProcessTable::bootstrap(ProcTableConfig { procs_max }, Arc::new(TestScheduler::new()))
    }

    #[test]
    fn exit_then_wait_round_trips_status() {
        let pt = table(8);
        let child = pt.assign(INIT_PID).unwrap();
        pt.exit(child, mkwait_exit(7));
        let status = pt.wait(INIT_PID, child).unwrap();
        assert_eq!(wexitstatus(status), 7);
        assert!(!pt.is_present(child), "reaped slot must be freed");
    }

    #[test]
    fn wait_on_non_child_is_rejected() {
        let pt = table(8);
        let a = pt.assign(INIT_PID).unwrap();
        let b = pt.assign(INIT_PID).unwrap();
        pt.exit(a, 0);
        assert_eq!(pt.wait(b, a), Err(KernelError::NotAChild));
    }

    #[test]
    fn wait_on_unknown_pid_is_esrch() {
        let pt = table(8);
        assert_eq!(pt.wait(INIT_PID, 63), Err(KernelError::NoSuchProcess));
    }

    #[test]
    fn orphaned_zombie_child_is_reaped_on_parent_exit() {
        let pt = table(8);
        let child = pt.assign(INIT_PID).unwrap();
        pt.exit(child, mkwait_exit(1));
        assert!(pt.is_present(child), "zombie must persist until reaped or orphan-cleaned");
        pt.exit(INIT_PID, 0);
        assert!(!pt.is_present(child), "zombie orphaned by parent exit must be cleared immediately");
    }

    #[test]
    fn live_child_is_reparented_to_zero_on_parent_exit() {
        let pt = table(8);
        let parent = pt.assign(INIT_PID).unwrap();
        let child = pt.assign(parent).unwrap();
        pt.exit(parent, 0);
        assert!(pt.is_present(child), "live child must survive parent exit");
        pt.exit(child, mkwait_exit(3));
        assert!(!pt.is_present(child), "child with ppid=0 at exit must self-clear immediately");
    }

    #[test]
    fn assign_beyond_capacity_is_enproc() {
        let pt = table(3);
        let _a = pt.assign(INIT_PID).unwrap();
        let before_failure_present = pt.is_present(INIT_PID);
        assert_eq!(pt.assign(INIT_PID), Err(KernelError::TooManyProcesses));
        assert!(before_failure_present && pt.is_present(INIT_PID), "a failed assign must not disturb existing slots");
    }

    #[test]
    fn reaped_slot_is_reused_by_a_later_assign() {
        let pt = table(3);
        let a = pt.assign(INIT_PID).unwrap();
        pt.exit(a, mkwait_exit(0));
        pt.wait(INIT_PID, a).unwrap();
        let b = pt.assign(INIT_PID).unwrap();
        assert_eq!(a, b, "assign must find the lowest free slot, not merely increment a counter");
    }
}
