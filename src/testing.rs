//! Test-only fakes for every trait in [`crate::platform`]. Built on
//! real `std::thread`/`std::sync` primitives so this crate's own tests
//! exercise genuine concurrency without real MIPS hardware — the
//! teacher tested against actual QEMU (`test_framework.rs`,
//! `src/bin/*_tests.rs`); this crate instead gets that coverage
//! through the standard `#[test]` harness since its collaborators are
//! trait objects.

use std::boxed::Box as StdBox;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar as StdCondvar, Mutex as StdMutex};

use crate::addrspace::AddressSpace;
use crate::constants::PAGE_SIZE;
use crate::coremap::Coremap;
use crate::error::{KernelError, KResult};
use crate::platform::{ElfLoader, NodeFs, NodeHandle, Platform, Scheduler, Tlb, TrapFrame, UserMemory};

pub struct TestScheduler {
    channels: StdMutex<HashMap<usize, Arc<(StdMutex<()>, StdCondvar)>>>,
}

impl TestScheduler {
    pub fn new() -> Self {
        TestScheduler { channels: StdMutex::new(HashMap::new()) }
    }

    fn channel(&self, id: usize) -> Arc<(StdMutex<()>, StdCondvar)> {
        self.channels.lock().unwrap().entry(id).or_insert_with(|| Arc::new((StdMutex::new(()), StdCondvar::new()))).clone()
    }
}

impl Scheduler for TestScheduler {
    fn sleep_on(&self, channel: usize) {
        let pair = self.channel(channel);
        let guard = pair.0.lock().unwrap();
        // Bounded wait: a correct test always pairs this with a wakeup,
        // but a generous timeout keeps a buggy test from hanging the
        // whole suite.
        let _ = pair.1.wait_timeout(guard, std::time::Duration::from_secs(5)).unwrap();
    }

    fn wakeup_one(&self, channel: usize) {
        self.channel(channel).1.notify_one();
    }

    fn wakeup_all(&self, channel: usize) {
        self.channel(channel).1.notify_all();
    }

    fn spawn(&self, entry: StdBox<dyn FnOnce() + Send>) {
        std::thread::spawn(entry);
    }
}

pub struct TestNodeFs {
    files: StdMutex<HashMap<String, Vec<u8>>>,
    handles: StdMutex<HashMap<NodeHandle, String>>,
    next_handle: AtomicU64,
    cwd: StdMutex<String>,
}

impl TestNodeFs {
    pub fn new() -> Self {
        TestNodeFs {
            files: StdMutex::new(HashMap::new()),
            handles: StdMutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            cwd: StdMutex::new(String::from("/")),
        }
    }
}

const O_CREAT: i32 = 0x0040;

impl NodeFs for TestNodeFs {
    fn open(&self, path: &str, flags: i32, _mode: u32) -> Result<NodeHandle, i32> {
        let mut files = self.files.lock().unwrap();
        if !files.contains_key(path) {
            if flags & O_CREAT != 0 {
                files.insert(path.to_string(), Vec::new());
            } else {
                return Err(2); // ENOENT
            }
        }
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.handles.lock().unwrap().insert(handle, path.to_string());
        Ok(handle)
    }

    fn close(&self, node: NodeHandle) {
        self.handles.lock().unwrap().remove(&node);
    }

    fn read(&self, node: NodeHandle, offset: u64, buf: &mut [u8]) -> Result<usize, i32> {
        let handles = self.handles.lock().unwrap();
        let path = handles.get(&node).ok_or(9)?; // EBADF
        let files = self.files.lock().unwrap();
        let content = files.get(path).ok_or(2)?;
        let offset = offset as usize;
        if offset >= content.len() {
            return Ok(0);
        }
        let n = buf.len().min(content.len() - offset);
        buf[..n].copy_from_slice(&content[offset..offset + n]);
        Ok(n)
    }

    fn write(&self, node: NodeHandle, offset: u64, buf: &[u8]) -> Result<usize, i32> {
        let handles = self.handles.lock().unwrap();
        let path = handles.get(&node).ok_or(9)?;
        let mut files = self.files.lock().unwrap();
        let content = files.get_mut(path).ok_or(2)?;
        let offset = offset as usize;
        if content.len() < offset + buf.len() {
            content.resize(offset + buf.len(), 0);
        }
        content[offset..offset + buf.len()].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn size(&self, node: NodeHandle) -> Result<u64, i32> {
        let handles = self.handles.lock().unwrap();
        let path = handles.get(&node).ok_or(9)?;
        let files = self.files.lock().unwrap();
        Ok(files.get(path).ok_or(2)?.len() as u64)
    }

    fn chdir(&self, path: &str) -> Result<(), i32> {
        *self.cwd.lock().unwrap() = path.to_string();
        Ok(())
    }

    fn getcwd(&self, buf: &mut [u8]) -> Result<usize, i32> {
        let cwd = self.cwd.lock().unwrap();
        let bytes = cwd.as_bytes();
        if bytes.len() > buf.len() {
            return Err(22); // EINVAL
        }
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(bytes.len())
    }
}

/// Lays out a fixed single code page + single data page "program" and
/// hands back a fixed entry point — enough to exercise `exec`'s
/// orchestration without a real ELF parser.
pub struct TestElfLoader {
    pub entry_point: u32,
}

impl TestElfLoader {
    pub fn new() -> Self {
        TestElfLoader { entry_point: 0x0040_0000 }
    }
}

impl ElfLoader for TestElfLoader {
    fn load(&self, _node: NodeHandle, space: &mut AddressSpace, coremap: &Coremap) -> KResult<u32> {
        space.define_region(0x1000, PAGE_SIZE, false)?;
        space.define_region(0x2000, PAGE_SIZE, true)?;
        space.prepare_load(coremap)?;
        space.complete_load();
        Ok(self.entry_point)
    }
}

/// User-mode memory as a sparse byte map keyed by address, standing in
/// for the flat (but mostly unmapped) 32-bit user address space —
/// a real address space spans up to `USERSTACK` (~2 GiB), so a flat
/// `Vec` sized to match would be wasteful for every test that only
/// touches a handful of pages. Unwritten addresses read as zero, the
/// way a freshly faulted-in page would.
pub struct TestUserMemory {
    mem: StdMutex<HashMap<usize, u8>>,
}

impl TestUserMemory {
    pub fn new() -> Self {
        TestUserMemory { mem: StdMutex::new(HashMap::new()) }
    }
}

impl Default for TestUserMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl UserMemory for TestUserMemory {
    fn copy_in(&self, user_addr: usize, buf: &mut [u8]) -> KResult<()> {
        user_addr.checked_add(buf.len()).ok_or(KernelError::BadAddress)?;
        let mem = self.mem.lock().unwrap();
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = *mem.get(&(user_addr + i)).unwrap_or(&0);
        }
        Ok(())
    }

    fn copy_out(&self, user_addr: usize, buf: &[u8]) -> KResult<()> {
        user_addr.checked_add(buf.len()).ok_or(KernelError::BadAddress)?;
        let mut mem = self.mem.lock().unwrap();
        for (i, &byte) in buf.iter().enumerate() {
            mem.insert(user_addr + i, byte);
        }
        Ok(())
    }

    fn copy_in_str(&self, user_addr: usize, buf: &mut [u8]) -> KResult<usize> {
        let mem = self.mem.lock().unwrap();
        let mut len = 0;
        loop {
            let addr = user_addr.checked_add(len).ok_or(KernelError::BadAddress)?;
            let byte = *mem.get(&addr).unwrap_or(&0);
            if byte == 0 {
                break;
            }
            len += 1;
            if len > buf.len() {
                return Err(KernelError::InvalidArgument);
            }
        }
        for (i, slot) in buf.iter_mut().take(len).enumerate() {
            *slot = *mem.get(&(user_addr + i)).unwrap_or(&0);
        }
        Ok(len)
    }
}

/// A small fixed-size TLB. `random_slot` is deterministic (always
/// slot 0) so tests are reproducible.
pub struct FakeTlb {
    entries: StdMutex<Vec<Option<(usize, usize, bool)>>>,
}

impl FakeTlb {
    pub fn new(capacity: usize) -> Self {
        FakeTlb { entries: StdMutex::new(vec![None; capacity]) }
    }

    pub fn last_writable(&self) -> bool {
        self.entries.lock().unwrap().iter().rev().find_map(|e| e.map(|(_, _, w)| w)).unwrap_or(false)
    }
}

impl Tlb for FakeTlb {
    fn find_invalid(&self) -> Option<usize> {
        self.entries.lock().unwrap().iter().position(|e| e.is_none())
    }

    fn random_slot(&self) -> usize {
        0
    }

    fn write_entry(&self, slot: usize, vpn: usize, pfn: usize, writable: bool) {
        self.entries.lock().unwrap()[slot] = Some((vpn, pfn, writable));
    }

    fn invalidate_all(&self) {
        self.entries.lock().unwrap().iter_mut().for_each(|e| *e = None);
    }
}

#[derive(Clone)]
pub struct FakeTrapFrame {
    pub return_value: u32,
    pub error: i32,
    pub pc: u32,
}

impl FakeTrapFrame {
    pub fn new() -> Self {
        FakeTrapFrame { return_value: 0, error: 0, pc: 0x1000 }
    }
}

impl TrapFrame for FakeTrapFrame {
    fn set_return_value(&mut self, value: u32) {
        self.return_value = value;
    }

    fn set_error(&mut self, errno: i32) {
        self.error = errno;
    }

    fn advance_pc(&mut self) {
        self.pc += 4;
    }

    fn duplicate(&self) -> StdBox<dyn TrapFrame> {
        StdBox::new(self.clone())
    }
}

pub fn test_platform() -> Platform {
    Platform {
        scheduler: Arc::new(TestScheduler::new()),
        node_fs: Arc::new(TestNodeFs::new()),
        elf_loader: Arc::new(TestElfLoader::new()),
        user_memory: Arc::new(TestUserMemory::new()),
        tlb: Arc::new(FakeTlb::new(16)),
    }
}
