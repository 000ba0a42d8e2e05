//! Software TLB refill / fault handler (spec §4.3). Grounded on
//! `original_source/kern/vm/vm.c`'s `vm_fault`; the actual register
//! read/write is delegated to the injected [`crate::platform::Tlb`].

use crate::addrspace::{AddressSpace, FaultRegion};
use crate::constants::PAGE_SIZE;
use crate::coremap::Coremap;
use crate::error::{KernelError, KResult};
use crate::platform::Tlb;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Read,
    Write,
    /// The hardware itself detected a write into a read-only TLB
    /// entry; this is always a user bug, never resolved here.
    ReadOnly,
}

/// Services one TLB miss. Returns `Ok(())` once an entry has been
/// installed, or an error the caller turns into a signal/fault
/// delivered to the faulting process.
pub fn handle_fault(
    fault_addr: usize,
    kind: FaultKind,
    space: &mut AddressSpace,
    coremap: &Coremap,
    tlb: &dyn Tlb,
) -> KResult<()> {
    if kind == FaultKind::ReadOnly {
        return Err(KernelError::BadAddress);
    }

    let page = fault_addr & !(PAGE_SIZE - 1);

    let (paddr, writable) = match space.classify(page) {
        FaultRegion::Code => {
            let seg = space.code().ok_or(KernelError::BadAddress)?;
            let paddr = seg.translate(page).ok_or(KernelError::BadAddress)?;
            (paddr, !space.elf_loaded)
        }
        FaultRegion::Data => {
            let seg = space.data().ok_or(KernelError::BadAddress)?;
            let paddr = seg.translate(page).ok_or(KernelError::BadAddress)?;
            (paddr, true)
        }
        FaultRegion::Stack => {
            let stack_base = crate::constants::USERSTACK
                - crate::constants::STACK_PAGES * PAGE_SIZE;
            let idx = (page - stack_base) / PAGE_SIZE;
            let paddr = *space.stack_frames.get(idx).ok_or(KernelError::BadAddress)?;
            (paddr, true)
        }
        FaultRegion::Heap => {
            let paddr = match coremap.find_heap_frame(space.owner, page) {
                Some(paddr) => paddr,
                None => {
                    let paddr = coremap.alloc_pages(1)?;
                    coremap.zero_frame(paddr);
                    coremap.set_heap_owner(paddr, space.owner, page);
                    space.heap_top = space.heap_top.max(page + PAGE_SIZE);
                    paddr
                }
            };
            (paddr, true)
        }
        FaultRegion::Invalid => return Err(KernelError::BadAddress),
    };

    let slot = tlb.find_invalid().unwrap_or_else(|| tlb.random_slot());
    let vpn = page / PAGE_SIZE;
    let pfn = paddr / PAGE_SIZE;
    tlb.write_entry(slot, vpn, pfn, writable);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{CoremapConfig, PAGE_SIZE};
    use crate::testing::FakeTlb;

    fn setup() -> (Coremap, AddressSpace, FakeTlb) {
        let cm = Coremap::bootstrap(CoremapConfig { num_frames: 256 });
        let mut space = AddressSpace::create(1);
        space.define_region(0x1000, PAGE_SIZE, false).unwrap();
        space.define_region(0x2000, PAGE_SIZE, true).unwrap();
        space.prepare_load(&cm).unwrap();
        (cm, space, FakeTlb::new(16))
    }

    #[test]
    fn readonly_fault_is_rejected() {
        let (cm, mut space, tlb) = setup();
        let err = handle_fault(0x2000, FaultKind::ReadOnly, &mut space, &cm, &tlb).unwrap_err();
        assert_eq!(err, KernelError::BadAddress);
    }

    #[test]
    fn heap_fault_allocates_once_then_reuses() {
        let (cm, mut space, tlb) = setup();
        let before = cm.free_frame_count();
        handle_fault(space.heap_base, FaultKind::Write, &mut space, &cm, &tlb).unwrap();
        assert_eq!(cm.free_frame_count(), before - 1);
        handle_fault(space.heap_base, FaultKind::Write, &mut space, &cm, &tlb).unwrap();
        assert_eq!(cm.free_frame_count(), before - 1, "second fault on the same page must not allocate again");
    }

    #[test]
    fn code_becomes_read_only_after_elf_loaded() {
        let (cm, mut space, tlb) = setup();
        space.complete_load();
        handle_fault(0x1000, FaultKind::Read, &mut space, &cm, &tlb).unwrap();
        assert!(!tlb.last_writable());
    }

    #[test]
    fn invalid_region_is_rejected() {
        let (cm, mut space, tlb) = setup();
        let err = handle_fault(0xdead_0000, FaultKind::Read, &mut space, &cm, &tlb).unwrap_err();
        assert_eq!(err, KernelError::BadAddress);
    }
}
