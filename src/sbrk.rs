//! `sbrk` (spec §4.10). Grounded on
//! `original_source/kern/syscall/proc_syscalls.c`'s `sys_sbrk`
//! alignment/bounds logic. Heap pages are not allocated here — they
//! are materialized lazily on first fault by [`crate::tlb`].

use crate::constants::{PAGE_SIZE, STACK_PAGES, USERSTACK};
use crate::error::{KernelError, KResult};
use crate::process::Process;

/// Adjusts the heap break by `delta` bytes and returns the previous
/// top.
pub fn sbrk(process: &mut Process, delta: isize) -> KResult<usize> {
    if delta % PAGE_SIZE as isize != 0 {
        return Err(KernelError::InvalidArgument);
    }

    let space = &mut process.address_space;
    let prev_top = space.heap_top;

    if delta == 0 {
        return Ok(prev_top);
    }

    if delta < 0 {
        let new_top = prev_top as isize + delta;
        if new_top < space.heap_base as isize {
            return Err(KernelError::InvalidArgument);
        }
        space.heap_top = new_top as usize;
        return Ok(prev_top);
    }

    let new_top = prev_top + delta as usize;
    let stack_bottom = USERSTACK - STACK_PAGES * PAGE_SIZE;
    if new_top > stack_bottom {
        return Err(KernelError::InvalidArgument);
    }
    space.heap_top = new_top;
    Ok(prev_top)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrspace::AddressSpace;
    use crate::constants::CoremapConfig;
    use crate::coremap::Coremap;
    use crate::filetable::FileTable;
    use crate::testing::test_platform;

    fn test_process() -> Process {
        let cm = Coremap::bootstrap(CoremapConfig { num_frames: 64 });
        let mut space = AddressSpace::create(1);
        space.define_region(0x1000, PAGE_SIZE, false).unwrap();
        space.define_region(0x2000, PAGE_SIZE, true).unwrap();
        space.prepare_load(&cm).unwrap();
        Process::new(1, space, FileTable::new(), test_platform())
    }

    #[test]
    fn zero_delta_returns_current_top() {
        let mut p = test_process();
        let top = p.address_space.heap_top;
        assert_eq!(sbrk(&mut p, 0).unwrap(), top);
    }

    #[test]
    fn growing_then_shrinking_round_trips() {
        let mut p = test_process();
        let base = p.address_space.heap_top;
        let prev = sbrk(&mut p, PAGE_SIZE as isize).unwrap();
        assert_eq!(prev, base);
        assert_eq!(p.address_space.heap_top, base + PAGE_SIZE);
        sbrk(&mut p, -(PAGE_SIZE as isize)).unwrap();
        assert_eq!(p.address_space.heap_top, base);
    }

    #[test]
    fn shrinking_below_base_is_rejected() {
        let mut p = test_process();
        assert_eq!(sbrk(&mut p, -(PAGE_SIZE as isize)), Err(KernelError::InvalidArgument));
    }

    #[test]
    fn unaligned_delta_is_rejected() {
        let mut p = test_process();
        assert_eq!(sbrk(&mut p, 10), Err(KernelError::InvalidArgument));
    }

    #[test]
    fn growing_into_the_stack_region_is_rejected() {
        let mut p = test_process();
        let huge = (USERSTACK - STACK_PAGES * PAGE_SIZE - p.address_space.heap_top) as isize + PAGE_SIZE as isize;
        assert_eq!(sbrk(&mut p, huge), Err(KernelError::InvalidArgument));
    }
}
