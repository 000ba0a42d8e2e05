//! File system call bodies (spec §4.9). Grounded on
//! `original_source/kern/syscall/file_syscalls.c`. These are the thin
//! trap-handlers: validate, marshal user memory, call the open-file /
//! file-table layer.

use alloc::vec;

use crate::constants::{OPEN_MAX, PATH_MAX};
use crate::error::{KernelError, KResult};
use crate::flags::{validate_open_flags, Whence};
use crate::openfile::OpenFile;
use crate::process::Process;

fn copy_in_path(process: &Process, path_ptr: usize) -> KResult<alloc::string::String> {
    let mut buf = [0u8; PATH_MAX];
    let len = process.platform.user_memory.copy_in_str(path_ptr, &mut buf)?;
    core::str::from_utf8(&buf[..len]).map(|s| s.into()).map_err(|_| KernelError::InvalidArgument)
}

pub fn open(process: &mut Process, path_ptr: usize, flags_raw: i32, mode: u32) -> KResult<usize> {
    let flags = validate_open_flags(flags_raw)?;
    let path = copy_in_path(process, path_ptr)?;
    let file = OpenFile::open(&path, flags, mode, process.platform.node_fs.clone(), process.platform.scheduler.clone())?;
    process.file_table.add(file)
}

pub fn read(process: &mut Process, fd: usize, user_buf_ptr: usize, len: usize) -> KResult<usize> {
    let file = process.file_table.get(fd)?;
    let mut tmp = vec![0u8; len];
    let n = file.read(&mut tmp)?;
    process.platform.user_memory.copy_out(user_buf_ptr, &tmp[..n])?;
    Ok(n)
}

pub fn write(process: &mut Process, fd: usize, user_buf_ptr: usize, len: usize) -> KResult<usize> {
    let file = process.file_table.get(fd)?;
    let mut tmp = vec![0u8; len];
    process.platform.user_memory.copy_in(user_buf_ptr, &mut tmp)?;
    file.write(&tmp)
}

pub fn close(process: &mut Process, fd: usize) -> KResult<()> {
    let file = process.file_table.remove(fd)?;
    file.decref();
    Ok(())
}

pub fn lseek(process: &mut Process, fd: usize, pos: i64, whence_raw: i32) -> KResult<u64> {
    let whence = Whence::from_raw(whence_raw)?;
    let file = process.file_table.get(fd)?;
    file.seek(pos, whence)
}

/// Reject out-of-range. If equal, return. If `new` is in use, close it.
/// Install the old file at `new`, incrementing its refcount (spec
/// §4.9).
pub fn dup2(process: &mut Process, old: usize, new: usize) -> KResult<usize> {
    if old >= OPEN_MAX || new >= OPEN_MAX {
        return Err(KernelError::BadFd);
    }
    let file = process.file_table.get(old)?;
    if old == new {
        return Ok(new);
    }
    if process.file_table.is_occupied(new) {
        let displaced = process.file_table.remove(new)?;
        displaced.decref();
    }
    file.incref();
    process.file_table.install(new, file)?;
    Ok(new)
}

pub fn chdir(process: &mut Process, path_ptr: usize) -> KResult<()> {
    let path = copy_in_path(process, path_ptr)?;
    process.platform.node_fs.chdir(&path).map_err(KernelError::Io)
}

pub fn getcwd(process: &mut Process, buf_ptr: usize, len: usize) -> KResult<usize> {
    let mut tmp = vec![0u8; len];
    let n = process.platform.node_fs.getcwd(&mut tmp).map_err(KernelError::Io)?;
    process.platform.user_memory.copy_out(buf_ptr, &tmp[..n])?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrspace::AddressSpace;
    use crate::constants::OPEN_MAX;
    use crate::filetable::FileTable;
    use crate::testing::test_platform;

    fn process() -> Process {
        Process::new(1, AddressSpace::create(1), FileTable::new(), test_platform())
    }

    fn write_user_string(p: &Process, addr: usize, s: &str) {
        p.platform.user_memory.copy_out(addr, s.as_bytes()).unwrap();
        p.platform.user_memory.copy_out(addr + s.len(), &[0]).unwrap();
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut p = process();
        write_user_string(&p, 0x1000, "/tmp/a");
        let fd = open(&mut p, 0x1000, 0x0042 /* O_RDWR|O_CREAT */, 0).unwrap();
        let payload = b"Twiddle dee dee, Twiddle dum dum.......\n";
        p.platform.user_memory.copy_out(0x2000, payload).unwrap();
        let n = write(&mut p, fd, 0x2000, payload.len()).unwrap();
        assert_eq!(n, payload.len());
        lseek(&mut p, fd, 0, 0).unwrap();
        let n = read(&mut p, fd, 0x3000, payload.len()).unwrap();
        assert_eq!(n, payload.len());
        let mut back = vec![0u8; payload.len()];
        p.platform.user_memory.copy_in(0x3000, &mut back).unwrap();
        assert_eq!(&back[..], &payload[..]);
        close(&mut p, fd).unwrap();
    }

    #[test]
    fn lseek_round_trip() {
        let mut p = process();
        write_user_string(&p, 0x1000, "/tmp/b");
        let fd = open(&mut p, 0x1000, 0x0042, 0).unwrap();
        p.platform.user_memory.copy_out(0x2000, b"0123456789").unwrap();
        write(&mut p, fd, 0x2000, 10).unwrap();
        lseek(&mut p, fd, 3, 0).unwrap();
        let cur = lseek(&mut p, fd, 0, 1).unwrap();
        assert_eq!(cur, 3);
    }

    #[test]
    fn negative_lseek_is_rejected_and_offset_unchanged() {
        let mut p = process();
        write_user_string(&p, 0x1000, "/tmp/c");
        let fd = open(&mut p, 0x1000, 0x0042, 0).unwrap();
        lseek(&mut p, fd, 5, 0).unwrap();
        assert_eq!(lseek(&mut p, fd, -10, 0), Err(KernelError::InvalidArgument));
        assert_eq!(lseek(&mut p, fd, 0, 1).unwrap(), 5);
    }

    #[test]
    fn dup2_same_fd_is_a_no_op() {
        let mut p = process();
        write_user_string(&p, 0x1000, "/tmp/d");
        let fd = open(&mut p, 0x1000, 0x0042, 0).unwrap();
        assert_eq!(dup2(&mut p, fd, fd).unwrap(), fd);
    }

    #[test]
    fn dup2_shares_the_offset() {
        let mut p = process();
        write_user_string(&p, 0x1000, "/tmp/e");
        let fd = open(&mut p, 0x1000, 0x0042, 0).unwrap();
        let new_fd = fd + 5;
        dup2(&mut p, fd, new_fd).unwrap();
        p.platform.user_memory.copy_out(0x2000, b"hi").unwrap();
        write(&mut p, new_fd, 0x2000, 2).unwrap();
        let via_fd = p.file_table.get(fd).unwrap();
        assert_eq!(via_fd.current_offset(), 2);
    }

    #[test]
    fn open_max_plus_one_fails_emfile() {
        let mut p = process();
        let mut fds = vec![];
        // Reserve 0/1/2 (STDIN/STDOUT/STDERR) the way a real process
        // would at startup; §4.5 allocates them like any other fd.
        for i in 0..3 {
            write_user_string(&p, 0x1000, &alloc::format!("/tmp/std{i}"));
            fds.push(open(&mut p, 0x1000, 0x0042, 0).unwrap());
        }
        for i in 0..OPEN_MAX - 3 {
            write_user_string(&p, 0x1000, &alloc::format!("/tmp/f{i}"));
            fds.push(open(&mut p, 0x1000, 0x0042, 0).unwrap());
        }
        write_user_string(&p, 0x1000, "/tmp/overflow");
        assert_eq!(open(&mut p, 0x1000, 0x0042, 0), Err(KernelError::TooManyOpenFiles));
        close(&mut p, fds[0]).unwrap();
        write_user_string(&p, 0x1000, "/tmp/overflow");
        assert!(open(&mut p, 0x1000, 0x0042, 0).is_ok());
    }

    #[test]
    fn open_close_n_fds_leaves_table_empty() {
        let mut p = process();
        let mut fds = vec![];
        for i in 0..10 {
            write_user_string(&p, 0x1000, &alloc::format!("/tmp/g{i}"));
            fds.push(open(&mut p, 0x1000, 0x0042, 0).unwrap());
        }
        for fd in fds.into_iter().rev() {
            close(&mut p, fd).unwrap();
        }
        assert!(p.file_table.is_empty());
    }
}
