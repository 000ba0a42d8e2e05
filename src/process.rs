//! A live process: its address space, file table, and the platform
//! bundle it was constructed with. Superseded from the teacher's
//! ARM64-specific `ProcessManager` (which this file used to hold) down
//! to the minimal struct spec §3 actually needs — the scheduler itself
//! (thread list, ready queue, context switch) is an external
//! collaborator, not modelled here.

use crate::addrspace::AddressSpace;
use crate::constants::Pid;
use crate::filetable::FileTable;
use crate::platform::Platform;

pub struct Process {
    pub pid: Pid,
    pub address_space: AddressSpace,
    pub file_table: FileTable,
    pub platform: Platform,
}

impl Process {
    pub fn new(pid: Pid, address_space: AddressSpace, file_table: FileTable, platform: Platform) -> Self {
        Process { pid, address_space, file_table, platform }
    }
}
