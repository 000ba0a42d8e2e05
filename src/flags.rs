//! `open(2)` flag bits and the access-mode mask (spec §4.4, §4.9).
//! Mirrors the teacher's `bitflags!` usage in its own `fs.rs`.

use crate::error::KernelError;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: i32 {
        const O_RDONLY   = 0x0000;
        const O_WRONLY   = 0x0001;
        const O_RDWR     = 0x0002;
        const O_CREAT    = 0x0040;
        const O_EXCL     = 0x0080;
        const O_TRUNC    = 0x0200;
        const O_APPEND   = 0x0400;
    }
}

/// The low two bits of the flag word select the access mode; every
/// other bit is a modifier. Masking by this value is how `open`
/// derives `AccessMode` (spec §4.4 "masking flags by the access-mode
/// mask").
const O_ACCMODE: i32 = 0x0003;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    pub fn from_flags(flags: OpenFlags) -> Result<Self, KernelError> {
        match flags.bits() & O_ACCMODE {
            0x0000 => Ok(AccessMode::ReadOnly),
            0x0001 => Ok(AccessMode::WriteOnly),
            0x0002 => Ok(AccessMode::ReadWrite),
            _ => Err(KernelError::InvalidArgument),
        }
    }

    pub fn readable(self) -> bool {
        matches!(self, AccessMode::ReadOnly | AccessMode::ReadWrite)
    }

    pub fn writable(self) -> bool {
        matches!(self, AccessMode::WriteOnly | AccessMode::ReadWrite)
    }
}

/// Validates that no bit outside the known set is present, per the
/// `open` syscall's "validate flags mask" step (spec §4.9).
pub fn validate_open_flags(raw: i32) -> Result<OpenFlags, KernelError> {
    OpenFlags::from_bits(raw).ok_or(KernelError::InvalidArgument)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

impl Whence {
    pub fn from_raw(raw: i32) -> Result<Self, KernelError> {
        match raw {
            0 => Ok(Whence::Set),
            1 => Ok(Whence::Cur),
            2 => Ok(Whence::End),
            _ => Err(KernelError::InvalidArgument),
        }
    }
}
