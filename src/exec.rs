//! `execv` (spec §4.8). Grounded on
//! `original_source/kern/syscall/proc_syscalls.c`'s `sys_execv` family
//! and the argument-copy/new-stack layout spec §6 describes. The old
//! address space is destroyed only after a fully successful stack
//! setup (resolves the original's late-failure leak, see DESIGN.md).

use alloc::vec::Vec;

use crate::addrspace::AddressSpace;
use crate::constants::{ARG_MAX, PTR_SIZE};
use crate::coremap::Coremap;
use crate::error::{KernelError, KResult};
use crate::process::Process;

/// What the trap layer needs to enter user mode after a successful
/// `execv`: the ELF entry point, argc, the address of `uargv[0]`, and
/// the final stack pointer (which is the same address as `uargv[0]`
/// per spec §6's exec stack layout).
pub struct ExecOutcome {
    pub entry_point: u32,
    pub argc: u32,
    pub argv_addr: usize,
    pub stack_ptr: usize,
}

fn round_up4(n: usize) -> usize {
    (n + 3) & !3
}

pub fn execv(process: &mut Process, path: &str, argv_user_ptr: usize, coremap: &Coremap) -> KResult<ExecOutcome> {
    let user_memory = process.platform.user_memory.clone();
    let node_fs = process.platform.node_fs.clone();
    let elf_loader = process.platform.elf_loader.clone();

    // Steps 1-3: walk argv, copying each string into a kernel-side
    // bounded buffer; fail if the combined length would exceed
    // ARG_MAX.
    let mut buf: heapless::Vec<u8, ARG_MAX> = heapless::Vec::new();
    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut i = 0usize;
    loop {
        let mut ptr_bytes = [0u8; PTR_SIZE];
        user_memory.copy_in(argv_user_ptr + i * PTR_SIZE, &mut ptr_bytes)?;
        let arg_ptr = u32::from_le_bytes(ptr_bytes) as usize;
        if arg_ptr == 0 {
            break;
        }
        let mut scratch = [0u8; 4096];
        let len = user_memory.copy_in_str(arg_ptr, &mut scratch)?;
        if buf.len() + len + 1 > ARG_MAX {
            return Err(KernelError::InvalidArgument);
        }
        let start = buf.len();
        buf.extend_from_slice(&scratch[..len]).map_err(|_| KernelError::InvalidArgument)?;
        buf.push(0).map_err(|_| KernelError::InvalidArgument)?;
        spans.push((start, len));
        i += 1;
    }
    let argc = i as u32;

    // Step 4: open the program file.
    let node = node_fs.open(path, 0, 0).map_err(KernelError::Io)?;

    // Step 5: install a fresh, empty address space as current,
    // keeping the old one to reinstall on failure.
    let old_space = core::mem::replace(&mut process.address_space, AddressSpace::create(process.pid));

    // Step 6: load the ELF (the loader allocates code/data/stack
    // frames via as_prepare_load internally).
    let entry_point = match elf_loader.load(node, &mut process.address_space, coremap) {
        Ok(entry) => entry,
        Err(e) => {
            node_fs.close(node);
            let failed = core::mem::replace(&mut process.address_space, old_space);
            failed.destroy(coremap);
            return Err(e);
        }
    };

    // Step 7: initial user stack pointer.
    let mut stack_ptr = process.address_space.define_stack();

    // Step 8: lay out argument strings and the argv pointer vector,
    // bottom-up, wrapped so any copy-out fault reinstalls the old
    // address space (spec §4.8, decided Open Question #3).
    let result = (|| -> KResult<(u32, Vec<usize>)> {
        let mut uargv = alloc::vec![0usize; argc as usize + 1];
        for (idx, &(start, len)) in spans.iter().enumerate() {
            let padded = round_up4(len + 1);
            stack_ptr -= padded;
            user_memory.copy_out(stack_ptr, &buf[start..=start + len])?;
            uargv[idx] = stack_ptr;
        }
        uargv[argc as usize] = 0;
        for idx in (0..=argc as usize).rev() {
            stack_ptr -= PTR_SIZE;
            user_memory.copy_out(stack_ptr, &(uargv[idx] as u32).to_le_bytes())?;
        }
        Ok((argc, uargv))
    })();

    match result {
        Ok(_) => {
            let argv_addr = stack_ptr;
            old_space.destroy(coremap);
            Ok(ExecOutcome { entry_point, argc, argv_addr, stack_ptr })
        }
        Err(e) => {
            let failed = core::mem::replace(&mut process.address_space, old_space);
            failed.destroy(coremap);
            Err(e)
        }
    }
}
