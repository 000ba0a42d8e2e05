//! System-call layer (spec §2 item 7, §4.9). Thin trap-handlers that
//! validate user input, marshal into/out of user memory via
//! [`crate::platform::UserMemory`], and call into the other modules.
//! Split the way the teacher's original ARM64 dispatcher separated
//! concerns, but by subsystem rather than by raw syscall number since
//! `fork`/`execv` now live in their own dedicated modules
//! ([`crate::fork`], [`crate::exec`]).

pub mod file;
pub mod process;
