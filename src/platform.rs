//! Trait seams for everything spec §1 names as an external
//! collaborator: the node-layer file system, the thread scheduler, the
//! ELF loader, the user-pointer copy primitives, the TLB, and the
//! trap frame. The core calls through these traits; it never
//! reimplements what's behind them. A host kernel provides concrete
//! implementations; `testing.rs` (under `cfg(test)`) provides fakes
//! backed by `std` so this crate's own tests can run without hardware.

use alloc::boxed::Box;
use alloc::sync::Arc;

use crate::addrspace::AddressSpace;
use crate::coremap::Coremap;
use crate::error::KResult;

/// Opaque handle into the file-system node layer. The core never
/// interprets this value beyond passing it back to [`NodeFs`].
pub type NodeHandle = u64;

/// The node-layer file system: path lookup, open/close, and
/// read/write/stat on an already-open node. Out of scope per spec §1;
/// this is the seam a real VFS plugs into.
pub trait NodeFs: Send + Sync {
    fn open(&self, path: &str, flags: i32, mode: u32) -> Result<NodeHandle, i32>;
    fn close(&self, node: NodeHandle);
    fn read(&self, node: NodeHandle, offset: u64, buf: &mut [u8]) -> Result<usize, i32>;
    fn write(&self, node: NodeHandle, offset: u64, buf: &[u8]) -> Result<usize, i32>;
    fn size(&self, node: NodeHandle) -> Result<u64, i32>;
    fn chdir(&self, path: &str) -> Result<(), i32>;
    fn getcwd(&self, buf: &mut [u8]) -> Result<usize, i32>;
}

/// Thread creation, yielding, and wait-channel sleep/wake — the
/// scheduler named as external in spec §1. [`crate::sync::BlockingMutex`]
/// and [`crate::sync::CondVar`] are built entirely on top of this.
pub trait Scheduler: Send + Sync {
    fn sleep_on(&self, channel: usize);
    fn wakeup_one(&self, channel: usize);
    fn wakeup_all(&self, channel: usize);
    /// Starts a new thread running `entry`. Used by `fork()` to start
    /// the child's entry point after the trap frame has been
    /// duplicated and prepared.
    fn spawn(&self, entry: Box<dyn FnOnce() + Send>);
}

/// Loads an ELF image from an already-open node into a freshly
/// prepared address space, allocating code/data frames from `coremap`
/// as it goes. Returns the entry point on success.
pub trait ElfLoader: Send + Sync {
    fn load(&self, node: NodeHandle, space: &mut AddressSpace, coremap: &Coremap) -> KResult<u32>;
}

/// User-pointer copy primitives (spec §6: no direct dereference of a
/// user pointer is ever permitted).
pub trait UserMemory: Send + Sync {
    fn copy_in(&self, user_addr: usize, buf: &mut [u8]) -> KResult<()>;
    fn copy_out(&self, user_addr: usize, buf: &[u8]) -> KResult<()>;
    /// Copies a NUL-terminated string of at most `buf.len()` bytes
    /// (including the terminator) into `buf`. Returns the length
    /// excluding the terminator, or `BadAddress`/`InvalidArgument` if
    /// the string doesn't fit or the pointer is bad.
    fn copy_in_str(&self, user_addr: usize, buf: &mut [u8]) -> KResult<usize>;
}

/// Raw TLB manipulation (spec §4.3). Slots are addressed by index;
/// the core decides which slot to use, this trait only performs the
/// hardware write/invalidate.
pub trait Tlb: Send + Sync {
    /// Returns the index of an invalid entry, if one exists.
    fn find_invalid(&self) -> Option<usize>;
    /// Returns a pseudo-random slot index to use when none are
    /// invalid.
    fn random_slot(&self) -> usize;
    fn write_entry(&self, slot: usize, vpn: usize, pfn: usize, writable: bool);
    /// Invalidates every entry, done on every address-space
    /// activation (context switch), per spec §4.3.
    fn invalidate_all(&self);
}

/// The saved user-mode register set at the point of a trap. Opaque to
/// the core beyond setting a syscall return value, advancing past the
/// trap instruction, and being duplicated for `fork`.
pub trait TrapFrame: Send {
    fn set_return_value(&mut self, value: u32);
    fn set_error(&mut self, errno: i32);
    fn advance_pc(&mut self);
    fn duplicate(&self) -> Box<dyn TrapFrame>;
}

/// Bundle of the collaborators a [`crate::process::Process`] needs.
/// Cheap to clone (each field is an `Arc`), so it is carried by value
/// rather than threaded through every call as separate parameters.
#[derive(Clone)]
pub struct Platform {
    pub scheduler: Arc<dyn Scheduler>,
    pub node_fs: Arc<dyn NodeFs>,
    pub elf_loader: Arc<dyn ElfLoader>,
    pub user_memory: Arc<dyn UserMemory>,
    pub tlb: Arc<dyn Tlb>,
}
