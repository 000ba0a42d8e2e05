//! Coremap and page-frame allocator (spec §4.1). Owns every post-boot
//! physical frame and hands out contiguous runs by first-fit scan.
//! Grounded on `original_source/kern/vm/vm.c`'s `getppages`,
//! `alloc_kpages`, and `free_kpages`.
//!
//! Since this crate never runs on real hardware, `Coremap` also owns a
//! simulated physical RAM backing store (a flat byte buffer indexed by
//! physical address) so that `as_copy`'s page-by-page content copy and
//! the heap fault handler's page-zeroing are real operations rather
//! than no-ops — see SPEC_FULL.md §3 and DESIGN.md for why this isn't
//! a spec deviation.

use alloc::vec;
use alloc::vec::Vec;

use crate::constants::{CoremapConfig, Pid, PAGE_SIZE};
use crate::error::{KernelError, KResult};
use crate::sync::Spinlock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Free,
    /// Covers the coremap's own storage; never changes state.
    Fixed,
    /// Part of a live allocation run.
    Dirty,
    /// Reserved for future swap-out support (spec §3); unused today.
    #[allow(dead_code)]
    Clean,
}

#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub state: FrameState,
    /// For heap frames, the virtual address they back (spec §3).
    pub vaddr_hint: Option<usize>,
    /// Owning process, used by `as_destroy` to reclaim heap frames
    /// without a page table (spec §9).
    pub owner: Option<Pid>,
    /// Valid only on the head frame of a run; the number of
    /// contiguous frames in that run.
    pub run_length: usize,
}

impl Frame {
    const fn free() -> Self {
        Frame { state: FrameState::Free, vaddr_hint: None, owner: None, run_length: 0 }
    }
}

struct Inner {
    frames: Vec<Frame>,
    /// Simulated physical RAM: `num_frames * PAGE_SIZE` bytes.
    ram: Vec<u8>,
}

pub struct Coremap {
    inner: Spinlock<Inner>,
}

impl Coremap {
    /// Determines the coremap's own extent (frame 0, marked `FIXED`)
    /// and marks the remainder `FREE`, per spec §4.1.
    pub fn bootstrap(config: CoremapConfig) -> Self {
        let num_frames = config.num_frames;
        let mut frames = vec![Frame::free(); num_frames];
        if let Some(first) = frames.first_mut() {
            first.state = FrameState::Fixed;
        }
        let ram = vec![0u8; num_frames * PAGE_SIZE];
        Coremap { inner: Spinlock::new(Inner { frames, ram }) }
    }

    pub fn num_frames(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn free_frame_count(&self) -> usize {
        self.inner.lock().frames.iter().filter(|f| f.state == FrameState::Free).count()
    }

    /// First-fit scan for `n` consecutive `FREE` frames; lowest index
    /// wins ties (spec §4.1).
    pub fn alloc_pages(&self, n: usize) -> KResult<usize> {
        if n == 0 {
            return Err(KernelError::InvalidArgument);
        }
        let mut inner = self.inner.lock();
        let total = inner.frames.len();
        let mut start = 0;
        while start + n <= total {
            let run_is_free = (start..start + n).all(|i| inner.frames[i].state == FrameState::Free);
            if run_is_free {
                for i in start..start + n {
                    inner.frames[i] = Frame { state: FrameState::Dirty, vaddr_hint: None, owner: None, run_length: 0 };
                }
                inner.frames[start].run_length = n;
                return Ok(start * PAGE_SIZE);
            }
            start += 1;
        }
        Err(KernelError::OutOfMemory)
    }

    /// Frees the run whose head frame is at `paddr`. Freeing a
    /// non-head frame or double-freeing is a kernel bug, detected by
    /// assertion (spec §4.1).
    pub fn free_pages(&self, paddr: usize) {
        let mut inner = self.inner.lock();
        let head = paddr / PAGE_SIZE;
        let run_length = inner.frames[head].run_length;
        assert!(run_length > 0, "free_pages: {paddr:#x} is not an allocation run head");
        for i in head..head + run_length {
            inner.frames[i] = Frame::free();
        }
    }

    pub fn zero_frame(&self, paddr: usize) {
        let mut inner = self.inner.lock();
        let start = paddr;
        inner.ram[start..start + PAGE_SIZE].fill(0);
    }

    /// Copies one full page's content from `src_paddr` to `dst_paddr`
    /// in the simulated RAM backing store. Used by `as_copy`.
    pub fn copy_page(&self, src_paddr: usize, dst_paddr: usize) {
        let mut inner = self.inner.lock();
        let (src, dst) = (src_paddr, dst_paddr);
        // Split borrow: copy through a temporary since src and dst
        // ranges may not overlap (distinct frames) but could in
        // theory alias the same slice if misused.
        let mut tmp = [0u8; PAGE_SIZE];
        tmp.copy_from_slice(&inner.ram[src..src + PAGE_SIZE]);
        inner.ram[dst..dst + PAGE_SIZE].copy_from_slice(&tmp);
    }

    pub fn write_bytes(&self, paddr: usize, within_page_offset: usize, data: &[u8]) {
        let mut inner = self.inner.lock();
        let at = paddr + within_page_offset;
        inner.ram[at..at + data.len()].copy_from_slice(data);
    }

    pub fn read_bytes(&self, paddr: usize, within_page_offset: usize, buf: &mut [u8]) {
        let inner = self.inner.lock();
        let at = paddr + within_page_offset;
        buf.copy_from_slice(&inner.ram[at..at + buf.len()]);
    }

    /// Records that the frame at `paddr` backs `owner`'s heap page at
    /// `vaddr` (page-aligned), so a later fault on the same page can
    /// reuse it (spec §4.3) and `as_destroy` can find it again (§9).
    pub fn set_heap_owner(&self, paddr: usize, owner: Pid, vaddr: usize) {
        let mut inner = self.inner.lock();
        let idx = paddr / PAGE_SIZE;
        inner.frames[idx].owner = Some(owner);
        inner.frames[idx].vaddr_hint = Some(vaddr);
    }

    /// Finds an already-faulted-in heap frame for `owner` backing
    /// `vaddr` (spec §4.3 "search the coremap for a vaddr_hint
    /// matching the fault page").
    pub fn find_heap_frame(&self, owner: Pid, vaddr: usize) -> Option<usize> {
        let inner = self.inner.lock();
        inner
            .frames
            .iter()
            .position(|f| f.owner == Some(owner) && f.vaddr_hint == Some(vaddr))
            .map(|idx| idx * PAGE_SIZE)
    }

    /// Frees every heap frame owned by `owner` whose `vaddr_hint` falls
    /// in `[heap_base, heap_top)`. Used by `as_destroy` (spec §4.2/§9)
    /// since the address space itself does not track heap frames.
    pub fn free_owned_heap_frames(&self, owner: Pid, heap_base: usize, heap_top: usize) {
        let paddrs: Vec<usize> = {
            let inner = self.inner.lock();
            inner
                .frames
                .iter()
                .enumerate()
                .filter(|(_, f)| {
                    f.owner == Some(owner)
                        && f.vaddr_hint.map(|v| v >= heap_base && v < heap_top).unwrap_or(false)
                })
                .map(|(idx, _)| idx * PAGE_SIZE)
                .collect()
        };
        for paddr in paddrs {
            self.free_pages(paddr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_coremap(n: usize) -> Coremap {
        Coremap::bootstrap(CoremapConfig { num_frames: n })
    }

    #[test]
    fn alloc_then_free_restores_capacity() {
        let cm = small_coremap(8);
        let before = cm.free_frame_count();
        let paddr = cm.alloc_pages(3).unwrap();
        assert_eq!(cm.free_frame_count(), before - 3);
        cm.free_pages(paddr);
        assert_eq!(cm.free_frame_count(), before);
    }

    #[test]
    fn first_fit_picks_lowest_index() {
        let cm = small_coremap(8);
        let a = cm.alloc_pages(2).unwrap();
        let b = cm.alloc_pages(2).unwrap();
        assert!(b > a);
        cm.free_pages(a);
        let c = cm.alloc_pages(2).unwrap();
        assert_eq!(c, a, "freed run should be reused by a later first-fit scan");
    }

    #[test]
    fn exhaustion_is_out_of_memory() {
        let cm = small_coremap(4);
        // frame 0 is FIXED, leaving 3 FREE frames.
        assert!(cm.alloc_pages(4).is_err());
        assert!(cm.alloc_pages(3).is_ok());
    }

    #[test]
    #[should_panic]
    fn freeing_a_non_head_frame_panics() {
        let cm = small_coremap(8);
        let paddr = cm.alloc_pages(3).unwrap();
        cm.free_pages(paddr + PAGE_SIZE);
    }

    #[test]
    fn interleaved_alloc_free_leaves_no_spurious_fragmentation() {
        let cm = small_coremap(16);
        let a = cm.alloc_pages(2).unwrap();
        let b = cm.alloc_pages(3).unwrap();
        let c = cm.alloc_pages(2).unwrap();
        cm.free_pages(b);
        // The 3-frame gap left by freeing `b` is large enough for a
        // fresh 3-frame request, which must land exactly where `b` was
        // rather than after `c` (first-fit, not next-fit).
        let d = cm.alloc_pages(3).unwrap();
        assert_eq!(d, b);
        cm.free_pages(a);
        cm.free_pages(c);
        cm.free_pages(d);
        assert_eq!(cm.free_frame_count(), cm.num_frames() - 1, "all DIRTY runs freed, only the FIXED head frame remains reserved");
    }

    #[test]
    fn copy_page_duplicates_content() {
        let cm = small_coremap(8);
        let src = cm.alloc_pages(1).unwrap();
        let dst = cm.alloc_pages(1).unwrap();
        cm.write_bytes(src, 0, b"hello");
        cm.copy_page(src, dst);
        let mut buf = [0u8; 5];
        cm.read_bytes(dst, 0, &mut buf);
        assert_eq!(&buf, b"hello");
    }
}
