//! Linux realization of [`RemoteMemoryReader`]: probe `process_vm_readv`,
//! then `/proc/<pid>/mem`, then word-at-a-time `PTRACE_PEEKDATA`, and cache
//! whichever succeeds first for the life of the session.

use super::{RemoteAddress, RemoteMemoryReader};
use crate::error::ReadError;
use std::os::unix::fs::FileExt;
use std::sync::OnceLock;

#[derive(Debug)]
enum Style {
    VirtualMem,
    File(std::fs::File),
    Ptrace,
}

pub struct LinuxMemReader {
    pid: nix::unistd::Pid,
    style: OnceLock<Style>,
}

impl LinuxMemReader {
    pub fn new(pid: i32) -> Self {
        Self {
            pid: nix::unistd::Pid::from_raw(pid),
            style: OnceLock::new(),
        }
    }

    fn map_err(&self, address: usize, length: usize, source: nix::Error) -> ReadError {
        match source {
            nix::Error::ESRCH => ReadError::NoSuchProcess(self.pid.as_raw()),
            nix::Error::EPERM => ReadError::PermissionDenied {
                pid: self.pid.as_raw(),
            },
            _ => ReadError::MemoryFault {
                pid: self.pid.as_raw(),
                address,
                length,
            },
        }
    }

    fn vmem(pid: nix::unistd::Pid, address: usize, dst: &mut [u8]) -> Result<usize, nix::Error> {
        let remote = &[nix::sys::uio::RemoteIoVec {
            base: address,
            len: dst.len(),
        }];
        nix::sys::uio::process_vm_readv(pid, &mut [std::io::IoSliceMut::new(dst)], remote)
    }

    fn file(file: &std::fs::File, address: usize, dst: &mut [u8]) -> Result<usize, nix::Error> {
        file.read_exact_at(dst, address as u64).map_err(|err| {
            err.raw_os_error()
                .map(nix::Error::from_raw)
                .unwrap_or(nix::Error::EIO)
        })?;
        Ok(dst.len())
    }

    fn ptrace(pid: nix::unistd::Pid, address: usize, dst: &mut [u8]) -> Result<usize, nix::Error> {
        let word_size = std::mem::size_of::<usize>();
        let mut offset = 0;
        let mut chunks = dst.chunks_exact_mut(word_size);
        for chunk in chunks.by_ref() {
            let word = nix::sys::ptrace::read(pid, (address + offset) as *mut std::ffi::c_void)?;
            chunk.copy_from_slice(&word.to_ne_bytes());
            offset += word_size;
        }
        let rest = chunks.into_remainder();
        if !rest.is_empty() {
            let word = nix::sys::ptrace::read(pid, (address + offset) as *mut std::ffi::c_void)?;
            rest.copy_from_slice(&word.to_ne_bytes()[..rest.len()]);
        }
        Ok(dst.len())
    }

    fn probe(&self, address: usize, dst: &mut [u8]) -> Result<usize, nix::Error> {
        if let Ok(len) = Self::vmem(self.pid, address, dst) {
            let _ = self.style.set(Style::VirtualMem);
            return Ok(len);
        }
        if let Ok(file) = std::fs::File::open(format!("/proc/{}/mem", self.pid)) {
            if let Ok(len) = Self::file(&file, address, dst) {
                let _ = self.style.set(Style::File(file));
                return Ok(len);
            }
        }
        let len = Self::ptrace(self.pid, address, dst)?;
        let _ = self.style.set(Style::Ptrace);
        Ok(len)
    }
}

impl RemoteMemoryReader for LinuxMemReader {
    fn read_exact(&self, address: RemoteAddress, dst: &mut [u8]) -> Result<(), ReadError> {
        let addr = address.as_usize();
        let result = match self.style.get() {
            Some(Style::VirtualMem) => Self::vmem(self.pid, addr, dst),
            Some(Style::File(file)) => Self::file(file, addr, dst),
            Some(Style::Ptrace) => Self::ptrace(self.pid, addr, dst),
            None => self.probe(addr, dst),
        };

        match result {
            Ok(got) if got == dst.len() => Ok(()),
            Ok(got) => Err(ReadError::ShortRead {
                pid: self.pid.as_raw(),
                address: addr,
                length: dst.len(),
                got,
            }),
            Err(source) => Err(self.map_err(addr, dst.len(), source)),
        }
    }
}
