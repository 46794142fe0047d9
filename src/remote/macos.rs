//! macOS realization of [`RemoteMemoryReader`] via `mach_vm_read_overwrite`
//! against the target's task port, using the Mach kernel bindings in
//! `mac/mach.rs`.

use super::{RemoteAddress, RemoteMemoryReader};
use crate::error::ReadError;
use crate::mac::mach::{self, KernelError};
use mach2::vm::mach_vm_read_overwrite;

pub struct MachMemReader {
    pid: i32,
    task: mach::mach_port_name_t,
}

impl MachMemReader {
    pub fn new(pid: i32) -> Result<Self, ReadError> {
        let mut task: mach::mach_port_name_t = 0;
        // SAFETY: FFI call into the kernel with valid out-param.
        let kr = unsafe { mach2::traps::task_for_pid(mach::mach_task_self(), pid, &mut task) };
        if kr != mach::KERN_SUCCESS {
            return Err(match KernelError::from(kr) {
                KernelError::InvalidTask | KernelError::NotFound => ReadError::NoSuchProcess(pid),
                _ => ReadError::PermissionDenied { pid },
            });
        }
        Ok(Self { pid, task })
    }
}

impl RemoteMemoryReader for MachMemReader {
    fn read_exact(&self, address: RemoteAddress, dst: &mut [u8]) -> Result<(), ReadError> {
        let mut out_size: u64 = 0;
        // SAFETY: `dst` is a valid, appropriately sized buffer for the
        // duration of the call; the kernel writes at most `dst.len()` bytes.
        let kr = unsafe {
            mach_vm_read_overwrite(
                self.task,
                address.0,
                dst.len() as u64,
                dst.as_mut_ptr() as u64,
                &mut out_size,
            )
        };
        if kr != mach::KERN_SUCCESS {
            return Err(match KernelError::from(kr) {
                KernelError::InvalidTask => ReadError::NoSuchProcess(self.pid),
                KernelError::NoAccess | KernelError::ProtectionFailure => {
                    ReadError::PermissionDenied { pid: self.pid }
                }
                _ => ReadError::MemoryFault {
                    pid: self.pid,
                    address: address.as_usize(),
                    length: dst.len(),
                },
            });
        }
        if out_size as usize != dst.len() {
            return Err(ReadError::ShortRead {
                pid: self.pid,
                address: address.as_usize(),
                length: dst.len(),
                got: out_size as usize,
            });
        }
        Ok(())
    }
}
