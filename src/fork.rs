//! `fork` (spec §4.7). Grounded on
//! `original_source/kern/syscall/proc_syscalls.c`'s `sys_fork` (heap
//! copy of the trap frame, `thread_fork` with a `fork_newthread`
//! entry point). The "new thread restores the trap frame and returns
//! to user mode" step is the trap dispatcher's job (out of scope per
//! spec §1); this function prepares the duplicated trap frame
//! (return value 0, PC advanced) and hands off through the injected
//! `Scheduler`/an embedder-supplied trampoline.

use alloc::boxed::Box;

use crate::addrspace::AddressSpace;
use crate::coremap::Coremap;
use crate::error::KResult;
use crate::filetable::FileTable;
use crate::platform::TrapFrame;
use crate::process::Process;
use crate::proctable::ProcessTable;

/// Duplicates `parent`'s address space and file table into a new
/// process, assigns it a pid, and starts its first thread. Any
/// failure unwinds everything already acquired (spec §4.7).
///
/// `register_child` lets the caller install the newly built
/// [`Process`] into whatever pid → process registry the embedding
/// kernel keeps (not part of this crate's data model, spec §3) before
/// the child's thread actually starts running, so the child can look
/// itself up immediately. `enter_user_mode` is the trap-layer
/// trampoline that restores the prepared trap frame and switches to
/// user mode.
pub fn fork(
    parent: &mut Process,
    proctable: &ProcessTable,
    coremap: &Coremap,
    parent_trapframe: &dyn TrapFrame,
    register_child: impl FnOnce(u32, Process),
    enter_user_mode: impl FnOnce(Box<dyn TrapFrame>) + Send + 'static,
) -> KResult<u32> {
    let child_pid = proctable.assign(parent.pid)?;

    let child_as = match AddressSpace::copy(&parent.address_space, child_pid, coremap) {
        Ok(space) => space,
        Err(e) => {
            proctable.unassign(child_pid);
            return Err(e);
        }
    };

    let child_ft = parent.file_table.fork_copy();

    let mut child_trapframe = parent_trapframe.duplicate();
    child_trapframe.set_return_value(0);
    child_trapframe.advance_pc();

    let child_process = Process::new(child_pid, child_as, child_ft, parent.platform.clone());

    register_child(child_pid, child_process);
    parent.platform.scheduler.spawn(Box::new(move || enter_user_mode(child_trapframe)));

    Ok(child_pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{CoremapConfig, ProcTableConfig, PAGE_SIZE};
    use crate::error::KernelError;
    use crate::testing::{test_platform, FakeTrapFrame};

    fn parent_process(pid: u32) -> (Process, Coremap) {
        let cm = Coremap::bootstrap(CoremapConfig { num_frames: 256 });
        let mut space = AddressSpace::create(pid);
        space.define_region(0x1000, PAGE_SIZE, false).unwrap();
        space.define_region(0x2000, PAGE_SIZE, true).unwrap();
        space.prepare_load(&cm).unwrap();
        (Process::new(pid, space, FileTable::new(), test_platform()), cm)
    }

    #[test]
    fn fork_duplicates_the_file_table_and_increments_refcount() {
        let (mut parent, cm) = parent_process(1);
        let file = crate::openfile::OpenFile::open(
            "/tmp/a",
            crate::flags::OpenFlags::O_RDWR | crate::flags::OpenFlags::O_CREAT,
            0,
            parent.platform.node_fs.clone(),
            parent.platform.scheduler.clone(),
        )
        .unwrap();
        parent.file_table.add(file.clone()).unwrap();
        assert_eq!(file.refcount(), 1);

        let pt = ProcessTable::bootstrap(ProcTableConfig { procs_max: 8 }, parent.platform.scheduler.clone());

        let child_pid = fork(&mut parent, &pt, &cm, &FakeTrapFrame::new(), |_pid, _proc| {}, |_frame| {}).unwrap();

        assert_ne!(child_pid, parent.pid);
        assert_eq!(file.refcount(), 2, "fork must incref every shared open file");
    }

    #[test]
    fn fork_beyond_capacity_fails_enproc_and_leaves_parent_untouched() {
        let (mut parent, cm) = parent_process(1);
        let pt = ProcessTable::bootstrap(ProcTableConfig { procs_max: 2 }, parent.platform.scheduler.clone());
        let before = cm.free_frame_count();

        let err = fork(&mut parent, &pt, &cm, &FakeTrapFrame::new(), |_, _| {}, |_| {}).unwrap_err();

        assert_eq!(err, KernelError::TooManyProcesses);
        assert_eq!(cm.free_frame_count(), before, "a rejected fork must not leak frames");
    }
}
