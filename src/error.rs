//! POSIX-style error contract (spec §6/§7). Every fallible operation in
//! this crate returns `Result<T, KernelError>`; none of them panic on
//! user-triggerable conditions. Panics are reserved for invariant
//! violations (double free, a corrupt table slot) that indicate a bug
//! in the core itself, matching the teacher's direct-panic style for
//! internal assertions.

use core::fmt;

/// One variant per error bucket named in spec §6/§7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Bad file descriptor: out of range, or an empty slot.
    BadFd,
    /// Process or open-file table is full.
    TooManyOpenFiles,
    /// Process table is full.
    TooManyProcesses,
    /// Target of `wait` is not a child of the caller.
    NotAChild,
    /// Target of `wait` does not exist.
    NoSuchProcess,
    /// Any allocation failure: coremap exhaustion, trapframe copy,
    /// address-space copy.
    OutOfMemory,
    /// Unknown `whence`, negative seek result, unknown `open` flag
    /// bits, unaligned `sbrk`, unsupported address-space region count.
    InvalidArgument,
    /// A user pointer failed a copy-in/copy-out check.
    BadAddress,
    /// Storage/IO error propagated unchanged from the file system. The
    /// node layer's own error type is an opaque `i32`; this variant
    /// forwards it without reinterpretation.
    Io(i32),
}

impl KernelError {
    /// The positive errno value a syscall layer returns to user space.
    pub const fn errno(self) -> i32 {
        match self {
            KernelError::NoSuchProcess => 3,   // ESRCH
            KernelError::BadFd => 9,           // EBADF
            KernelError::NotAChild => 10,      // ECHILD
            KernelError::OutOfMemory => 12,    // ENOMEM
            KernelError::BadAddress => 14,     // EFAULT
            KernelError::InvalidArgument => 22, // EINVAL
            KernelError::TooManyOpenFiles => 24, // EMFILE
            // BSD/os161 extension; not in standard POSIX numbering, so
            // it is placed outside the 1-34 POSIX range to avoid
            // colliding with any of the codes above. See DESIGN.md.
            KernelError::TooManyProcesses => 100, // ENPROC
            KernelError::Io(errno) => errno,
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::BadFd => write!(f, "bad file descriptor"),
            KernelError::TooManyOpenFiles => write!(f, "too many open files"),
            KernelError::TooManyProcesses => write!(f, "too many processes"),
            KernelError::NotAChild => write!(f, "not a child of the caller"),
            KernelError::NoSuchProcess => write!(f, "no such process"),
            KernelError::OutOfMemory => write!(f, "out of memory"),
            KernelError::InvalidArgument => write!(f, "invalid argument"),
            KernelError::BadAddress => write!(f, "bad address"),
            KernelError::Io(errno) => write!(f, "i/o error (errno {errno})"),
        }
    }
}

#[cfg(test)]
impl std::error::Error for KernelError {}

pub type KResult<T> = Result<T, KernelError>;
