//! Process life-cycle system-call bodies (spec §2 item 7). Grounded on
//! `original_source/kern/syscall/proc_syscalls.c`. `fork`/`execv` do
//! the heavy lifting in [`crate::fork`]/[`crate::exec`]; this module
//! is the thin marshaling layer spec §2 describes plus the three
//! calls that don't need a dedicated module.

use crate::constants::Pid;
use crate::error::KResult;
use crate::process::Process;
use crate::proctable::{mkwait_exit, ProcessTable};

pub fn getpid(process: &Process) -> Pid {
    process.pid
}

/// `sys__exit`: records the encoded exit status and hands the thread
/// back to the scheduler. Matches
/// `original_source/kern/syscall/proc_syscalls.c`'s `sys__exit` →
/// `proc_exit(_MKWAIT_EXIT(status))` → `thread_exit()` sequence; the
/// actual `thread_exit()` is the scheduler's job (external, spec §1).
pub fn exit(process: &Process, proctable: &ProcessTable, status: i32) {
    proctable.exit(process.pid, mkwait_exit(status));
    // Surrendering the thread itself (`thread_exit()`) is the
    // scheduler's job, not modelled here (spec §1).
}

/// `sys_waitpid`: delegates to [`ProcessTable::wait`], which validates
/// that `pid` is a child of `caller` and blocks until it has exited.
pub fn waitpid(proctable: &ProcessTable, caller: Pid, pid: Pid) -> KResult<(Pid, i32)> {
    let status = proctable.wait(caller, pid)?;
    Ok((pid, status))
}
