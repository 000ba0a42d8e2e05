//! Per-process address space: text/data/heap/stack regions and their
//! backing frames (spec §3, §4.2). Grounded on
//! `original_source/kern/vm/vm.c`'s `as_*` family (`dumbvm`-style: no
//! page tables, a handful of flat region descriptors).

use alloc::vec::Vec;

use crate::constants::{Pid, PAGE_SIZE, STACK_PAGES};
use crate::coremap::Coremap;
use crate::error::{KernelError, KResult};
use crate::platform::Tlb;

/// One flat region: a virtual base, a page count, and one physical
/// frame per page. The first `as_define_region` call becomes `code`,
/// the second `data`; spec §4.2 rejects a third.
#[derive(Debug, Clone)]
pub struct Segment {
    pub vaddr_base: usize,
    pub npages: usize,
    pub frames: Vec<usize>,
    pub writable: bool,
}

impl Segment {
    /// Translates `vaddr` (must already be known to lie in this
    /// segment) to the physical address of its backing frame.
    pub fn translate(&self, vaddr: usize) -> Option<usize> {
        if vaddr < self.vaddr_base {
            return None;
        }
        let page = (vaddr - self.vaddr_base) / PAGE_SIZE;
        self.frames.get(page).copied()
    }

    fn contains(&self, vaddr: usize) -> bool {
        vaddr >= self.vaddr_base && vaddr < self.vaddr_base + self.npages * PAGE_SIZE
    }
}

/// Rounds a region down to a page boundary and its size up, matching
/// `original_source/kern/vm/vm.c`'s `as_define_region` alignment
/// dance.
fn align_region(vaddr: usize, size: usize) -> (usize, usize) {
    let extra = vaddr & (PAGE_SIZE - 1);
    let aligned_vaddr = vaddr - extra;
    let aligned_size = (size + extra + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
    (aligned_vaddr, aligned_size / PAGE_SIZE)
}

pub struct AddressSpace {
    pub owner: Pid,
    regions: Vec<Segment>,
    pub heap_base: usize,
    pub heap_top: usize,
    pub stack_frames: Vec<usize>,
    pub elf_loaded: bool,
}

impl AddressSpace {
    pub fn create(owner: Pid) -> Self {
        AddressSpace {
            owner,
            regions: Vec::new(),
            heap_base: 0,
            heap_top: 0,
            stack_frames: Vec::new(),
            elf_loaded: false,
        }
    }

    pub fn code(&self) -> Option<&Segment> {
        self.regions.first()
    }

    pub fn data(&self) -> Option<&Segment> {
        self.regions.get(1)
    }

    /// Records one segment. Rejected with `InvalidArgument` on the
    /// third call (spec §4.2 — decided Open Question, see DESIGN.md).
    pub fn define_region(&mut self, vaddr: usize, size: usize, writable: bool) -> KResult<()> {
        if self.regions.len() >= 2 {
            return Err(KernelError::InvalidArgument);
        }
        let (vaddr_base, npages) = align_region(vaddr, size);
        self.regions.push(Segment { vaddr_base, npages, frames: Vec::new(), writable });
        Ok(())
    }

    /// Allocates and zeroes one frame per code/data page, sets up an
    /// empty heap range immediately above data, and allocates the
    /// fixed-size stack. Unwinds every allocation made so far on
    /// failure (spec §4.2).
    pub fn prepare_load(&mut self, coremap: &Coremap) -> KResult<()> {
        let mut allocated: Vec<usize> = Vec::new();
        let result = (|| -> KResult<()> {
            for seg_idx in 0..self.regions.len() {
                let npages = self.regions[seg_idx].npages;
                for _ in 0..npages {
                    let paddr = coremap.alloc_pages(1)?;
                    coremap.zero_frame(paddr);
                    allocated.push(paddr);
                    self.regions[seg_idx].frames.push(paddr);
                }
            }
            let data_top = self
                .data()
                .map(|d| d.vaddr_base + d.npages * PAGE_SIZE)
                .or_else(|| self.code().map(|c| c.vaddr_base + c.npages * PAGE_SIZE))
                .unwrap_or(0);
            self.heap_base = data_top;
            self.heap_top = data_top;

            for _ in 0..STACK_PAGES {
                let paddr = coremap.alloc_pages(1)?;
                coremap.zero_frame(paddr);
                allocated.push(paddr);
                self.stack_frames.push(paddr);
            }
            Ok(())
        })();

        if result.is_err() {
            for paddr in allocated {
                coremap.free_pages(paddr);
            }
            for seg in &mut self.regions {
                seg.frames.clear();
            }
            self.stack_frames.clear();
        }
        result
    }

    /// After this, code pages installed in the TLB are read-only
    /// (spec §4.2/§4.3).
    pub fn complete_load(&mut self) {
        self.elf_loaded = true;
    }

    /// Makes this the running address space on the current CPU
    /// (context switch). Invalidates every TLB entry for the outgoing
    /// space since there is no ASID optimisation (spec §4.3,
    /// testable invariant #4: every entry is invalid immediately
    /// after activation).
    pub fn activate(&self, tlb: &dyn Tlb) {
        tlb.invalidate_all();
    }

    /// Fixed initial user stack pointer (spec §4.2).
    pub fn define_stack(&self) -> usize {
        crate::constants::USERSTACK
    }

    /// Duplicates `old` into a fresh address space owned by
    /// `new_owner`: fresh frames for every code/data/stack page with
    /// content copied, plus any heap pages already faulted in for
    /// `old` (looked up via the coremap's `vaddr_hint`, spec §4.2).
    /// Destroys the partial new space and fails on any allocation
    /// error.
    pub fn copy(old: &AddressSpace, new_owner: Pid, coremap: &Coremap) -> KResult<AddressSpace> {
        let mut new = AddressSpace::create(new_owner);
        new.heap_base = old.heap_base;
        new.heap_top = old.heap_top;
        new.elf_loaded = old.elf_loaded;

        let result = (|| -> KResult<()> {
            for seg in &old.regions {
                let mut copied = Segment {
                    vaddr_base: seg.vaddr_base,
                    npages: seg.npages,
                    frames: Vec::with_capacity(seg.npages),
                    writable: seg.writable,
                };
                for &old_paddr in &seg.frames {
                    let new_paddr = coremap.alloc_pages(1)?;
                    coremap.copy_page(old_paddr, new_paddr);
                    copied.frames.push(new_paddr);
                }
                new.regions.push(copied);
            }

            let mut vaddr = old.heap_base;
            while vaddr < old.heap_top {
                if let Some(old_paddr) = coremap.find_heap_frame(old.owner, vaddr) {
                    let new_paddr = coremap.alloc_pages(1)?;
                    coremap.copy_page(old_paddr, new_paddr);
                    coremap.set_heap_owner(new_paddr, new_owner, vaddr);
                }
                vaddr += PAGE_SIZE;
            }

            for &old_paddr in &old.stack_frames {
                let new_paddr = coremap.alloc_pages(1)?;
                coremap.copy_page(old_paddr, new_paddr);
                new.stack_frames.push(new_paddr);
            }
            Ok(())
        })();

        match result {
            Ok(()) => Ok(new),
            Err(e) => {
                new.destroy(coremap);
                Err(e)
            }
        }
    }

    /// Releases every frame this address space owns: code/data/stack
    /// arrays directly, and heap frames via the coremap's
    /// owner-lookup (spec §4.2/§9).
    pub fn destroy(self, coremap: &Coremap) {
        for seg in &self.regions {
            for &paddr in &seg.frames {
                coremap.free_pages(paddr);
            }
        }
        for &paddr in &self.stack_frames {
            coremap.free_pages(paddr);
        }
        coremap.free_owned_heap_frames(self.owner, self.heap_base, self.heap_top);
    }

    /// Classifies `vaddr` per spec §4.3; used by the TLB fault
    /// handler.
    pub fn classify(&self, vaddr: usize) -> FaultRegion {
        if let Some(code) = self.code() {
            if code.contains(vaddr) {
                return FaultRegion::Code;
            }
        }
        if let Some(data) = self.data() {
            if data.contains(vaddr) {
                return FaultRegion::Data;
            }
        }
        if vaddr >= self.heap_base && vaddr < self.heap_top {
            return FaultRegion::Heap;
        }
        let stack_base = crate::constants::USERSTACK - STACK_PAGES * PAGE_SIZE;
        if vaddr >= stack_base && vaddr < crate::constants::USERSTACK {
            return FaultRegion::Stack;
        }
        FaultRegion::Invalid
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultRegion {
    Code,
    Data,
    Heap,
    Stack,
    Invalid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CoremapConfig;
    use crate::testing::FakeTlb;

    fn coremap() -> Coremap {
        Coremap::bootstrap(CoremapConfig { num_frames: 256 })
    }

    #[test]
    fn activate_invalidates_every_tlb_entry() {
        let cm = coremap();
        let mut as_ = AddressSpace::create(1);
        as_.define_region(0x1000, PAGE_SIZE, false).unwrap();
        as_.define_region(0x2000, PAGE_SIZE, true).unwrap();
        as_.prepare_load(&cm).unwrap();
        let tlb = FakeTlb::new(4);
        for slot in 0..4 {
            tlb.write_entry(slot, slot, slot, false);
        }
        assert!(tlb.find_invalid().is_none(), "every slot must be filled before activation");

        as_.activate(&tlb);

        assert_eq!(tlb.find_invalid(), Some(0), "immediately after activation every TLB entry must be invalid");
    }

    #[test]
    fn prepare_load_allocates_and_zeroes() {
        let cm = coremap();
        let mut as_ = AddressSpace::create(1);
        as_.define_region(0x1000, PAGE_SIZE * 2, false).unwrap();
        as_.define_region(0x3000, PAGE_SIZE, true).unwrap();
        as_.prepare_load(&cm).unwrap();
        assert_eq!(as_.code().unwrap().frames.len(), 2);
        assert_eq!(as_.data().unwrap().frames.len(), 1);
        assert_eq!(as_.stack_frames.len(), STACK_PAGES);
        assert!(as_.heap_base >= as_.data().unwrap().vaddr_base);
    }

    #[test]
    fn third_region_rejected() {
        let mut as_ = AddressSpace::create(1);
        as_.define_region(0, PAGE_SIZE, false).unwrap();
        as_.define_region(PAGE_SIZE, PAGE_SIZE, true).unwrap();
        assert_eq!(as_.define_region(2 * PAGE_SIZE, PAGE_SIZE, true), Err(KernelError::InvalidArgument));
    }

    #[test]
    fn copy_duplicates_content_into_fresh_frames() {
        let cm = coremap();
        let mut as_ = AddressSpace::create(1);
        as_.define_region(0x1000, PAGE_SIZE, false).unwrap();
        as_.define_region(0x2000, PAGE_SIZE, true).unwrap();
        as_.prepare_load(&cm).unwrap();
        let data_frame = as_.data().unwrap().frames[0];
        cm.write_bytes(data_frame, 0, b"parent-data");

        let copy = AddressSpace::copy(&as_, 2, &cm).unwrap();
        let copy_frame = copy.data().unwrap().frames[0];
        assert_ne!(copy_frame, data_frame);
        let mut buf = [0u8; 11];
        cm.read_bytes(copy_frame, 0, &mut buf);
        assert_eq!(&buf, b"parent-data");
    }

    #[test]
    fn destroy_frees_every_owned_frame() {
        let cm = coremap();
        let mut as_ = AddressSpace::create(1);
        as_.define_region(0x1000, PAGE_SIZE, false).unwrap();
        as_.define_region(0x2000, PAGE_SIZE, true).unwrap();
        as_.prepare_load(&cm).unwrap();
        let before_free = cm.free_frame_count();
        let frames_used = 2 + STACK_PAGES;
        as_.destroy(&cm);
        assert_eq!(cm.free_frame_count(), before_free + frames_used);
    }
}
