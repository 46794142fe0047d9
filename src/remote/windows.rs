//! Windows realization of [`RemoteMemoryReader`] via `ReadProcessMemory`
//! against a process handle opened with `PROCESS_VM_READ | PROCESS_QUERY_INFORMATION`.

use super::{RemoteAddress, RemoteMemoryReader};
use crate::error::ReadError;
use windows_sys::Win32::Foundation::{CloseHandle, GetLastError, ERROR_ACCESS_DENIED, HANDLE};
use windows_sys::Win32::System::Diagnostics::Debug::ReadProcessMemory;
use windows_sys::Win32::System::Threading::{
    OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ,
};

pub struct Win32MemReader {
    pid: i32,
    handle: HANDLE,
}

// SAFETY: the handle is only ever used to issue read-only queries and is
// closed exactly once in `Drop`.
unsafe impl Send for Win32MemReader {}
unsafe impl Sync for Win32MemReader {}

impl Win32MemReader {
    pub fn new(pid: i32) -> Result<Self, ReadError> {
        // SAFETY: FFI call with a valid access mask and pid.
        let handle = unsafe {
            OpenProcess(
                PROCESS_QUERY_INFORMATION | PROCESS_VM_READ,
                0,
                pid as u32,
            )
        };
        if handle == 0 {
            // SAFETY: FFI call, no preconditions.
            let err = unsafe { GetLastError() };
            return Err(if err == ERROR_ACCESS_DENIED {
                ReadError::PermissionDenied { pid }
            } else {
                ReadError::NoSuchProcess(pid)
            });
        }
        Ok(Self { pid, handle })
    }
}

impl Drop for Win32MemReader {
    fn drop(&mut self) {
        // SAFETY: `self.handle` was returned by a successful `OpenProcess`.
        unsafe {
            CloseHandle(self.handle);
        }
    }
}

impl RemoteMemoryReader for Win32MemReader {
    fn read_exact(&self, address: RemoteAddress, dst: &mut [u8]) -> Result<(), ReadError> {
        let mut bytes_read = 0usize;
        // SAFETY: `dst` is valid for `dst.len()` bytes for the duration of
        // the call, and `bytes_read` is a valid out-param.
        let ok = unsafe {
            ReadProcessMemory(
                self.handle,
                address.0 as *const _,
                dst.as_mut_ptr() as *mut _,
                dst.len(),
                &mut bytes_read,
            )
        };
        if ok == 0 {
            return Err(ReadError::MemoryFault {
                pid: self.pid,
                address: address.as_usize(),
                length: dst.len(),
            });
        }
        if bytes_read != dst.len() {
            return Err(ReadError::ShortRead {
                pid: self.pid,
                address: address.as_usize(),
                length: dst.len(),
                got: bytes_read,
            });
        }
        Ok(())
    }
}
