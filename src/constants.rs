//! Capacity and layout constants, plus the `*Config` structs that let
//! tests run the same code against smaller capacities.

/// Process identity: a small positive integer. `0` means "no parent /
/// already reaped"; `1` is reserved for the initial kernel process
/// (spec §3).
pub type Pid = u32;

/// Page size in bytes, matching the 32-bit MIPS-like target machine.
pub const PAGE_SIZE: usize = 4096;

/// Number of physical frames reserved for a new process's user stack.
pub const STACK_PAGES: usize = 18;

/// Highest user-space address; the initial stack pointer on `exec`.
pub const USERSTACK: usize = 0x8000_0000;

/// Maximum number of simultaneously live-or-zombie processes.
pub const PROCS_MAX: usize = 64;

/// `PID_MAX == PROCS_MAX` per spec.
pub const PID_MAX: usize = PROCS_MAX;

/// Pid of the initial kernel process, assigned at `bootstrap`.
pub const INIT_PID: u32 = 1;

/// Per-process open file descriptor capacity.
pub const OPEN_MAX: usize = 64;

/// Maximum path length accepted from user space.
pub const PATH_MAX: usize = 1024;

/// Maximum combined length of `exec` argument strings.
pub const ARG_MAX: usize = 64 * 1024;

/// Pointer size on the target machine (32-bit).
pub const PTR_SIZE: usize = 4;

/// Injected configuration for [`crate::coremap::Coremap`].
///
/// Production code uses [`CoremapConfig::default`]; tests shrink
/// `num_frames` so allocator exhaustion can be reached in a handful of
/// calls instead of thousands.
#[derive(Debug, Clone, Copy)]
pub struct CoremapConfig {
    pub num_frames: usize,
}

impl Default for CoremapConfig {
    fn default() -> Self {
        // Arbitrary production default; real boot code would derive this
        // from the machine's detected RAM size.
        CoremapConfig { num_frames: 4096 }
    }
}

/// Injected configuration for [`crate::proctable::ProcessTable`].
#[derive(Debug, Clone, Copy)]
pub struct ProcTableConfig {
    pub procs_max: usize,
}

impl Default for ProcTableConfig {
    fn default() -> Self {
        ProcTableConfig { procs_max: PROCS_MAX }
    }
}
