//! Remote Memory Reader: reads bytes out of another process's address space
//! without pausing it, injecting code, or mutating it.
//!
//! One capability trait, one struct per platform, behind
//! [`RemoteMemoryReader`] so the rest of the crate never matches on target
//! OS.

use crate::error::ReadError;

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        mod linux;
        pub use linux::LinuxMemReader as PlatformReader;

        /// Opens the platform's native remote-memory reader for `pid`.
        pub fn open_platform_reader(pid: i32) -> Result<PlatformReader, ReadError> {
            Ok(PlatformReader::new(pid))
        }
    } else if #[cfg(target_os = "macos")] {
        mod macos;
        pub use macos::MachMemReader as PlatformReader;

        /// Opens the platform's native remote-memory reader for `pid`.
        pub fn open_platform_reader(pid: i32) -> Result<PlatformReader, ReadError> {
            PlatformReader::new(pid)
        }
    } else if #[cfg(target_os = "windows")] {
        mod windows;
        pub use windows::Win32MemReader as PlatformReader;

        /// Opens the platform's native remote-memory reader for `pid`.
        pub fn open_platform_reader(pid: i32) -> Result<PlatformReader, ReadError> {
            PlatformReader::new(pid)
        }
    }
}

/// An address in the target process's address space. Never dereferenced
/// locally; only ever handed to a [`RemoteMemoryReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RemoteAddress(pub u64);

impl RemoteAddress {
    #[inline]
    pub fn offset(self, delta: u64) -> Self {
        Self(self.0.wrapping_add(delta))
    }

    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::LowerHex for RemoteAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Marker for types that are valid for any bit pattern and so can be read
/// directly out of untrusted remote memory. Only implement this for plain
/// fixed-layout structs of integers (no padding-sensitive enums, no pointers
/// that get dereferenced locally).
///
/// # Safety
/// Implementors must be `#[repr(C)]` (or a primitive integer), contain no
/// padding bytes that participate in validity, and have every bit pattern be
/// a legal value of the type.
pub unsafe trait Pod: Copy {}

unsafe impl Pod for u8 {}
unsafe impl Pod for u16 {}
unsafe impl Pod for u32 {}
unsafe impl Pod for u64 {}
unsafe impl Pod for i32 {}
unsafe impl Pod for i64 {}

/// Reads raw bytes from a remote process's address space.
///
/// Implementations own whatever OS handle (pid, task port, process handle)
/// is needed, probe for the cheapest working method on first use, and cache
/// it for the life of the session.
///
/// Kept to a single, non-generic method so `dyn RemoteMemoryReader` stays
/// object-safe; the typed convenience helpers (`read_pod`, `read_cstr`, ...)
/// live on [`RemoteMemoryReaderExt`] instead, since a generic method can't be
/// part of a trait object's vtable.
pub trait RemoteMemoryReader {
    /// Fills `dst` by reading `dst.len()` bytes starting at `address`.
    /// Short reads are an error: callers never see partially filled buffers.
    fn read_exact(&self, address: RemoteAddress, dst: &mut [u8]) -> Result<(), ReadError>;
}

/// Typed convenience reads layered over any [`RemoteMemoryReader`], including
/// `dyn RemoteMemoryReader` (blanket-implemented for `?Sized` so callers
/// holding a trait object, like [`crate::probe::Probe`], can still call
/// `read_pod::<u64>(...)`).
pub trait RemoteMemoryReaderExt: RemoteMemoryReader {
    fn read_to_vec(&self, address: RemoteAddress, len: usize) -> Result<Vec<u8>, ReadError> {
        let mut buf = vec![0u8; len];
        self.read_exact(address, &mut buf)?;
        Ok(buf)
    }

    fn read_pod<T: Pod>(&self, address: RemoteAddress) -> Result<T, ReadError> {
        let mut value: T = unsafe { std::mem::zeroed() };
        // SAFETY: `T: Pod` guarantees any bit pattern is valid, and the slice
        // covers exactly `size_of::<T>()` bytes of `value`.
        let bytes = unsafe {
            std::slice::from_raw_parts_mut(&mut value as *mut T as *mut u8, std::mem::size_of::<T>())
        };
        self.read_exact(address, bytes)?;
        Ok(value)
    }

    fn read_pod_vec<T: Pod>(&self, mut address: RemoteAddress, count: usize) -> Result<Vec<T>, ReadError> {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.read_pod(address)?);
            address = address.offset(std::mem::size_of::<T>() as u64);
        }
        Ok(out)
    }

    /// Reads a NUL-terminated byte string, capped at `max_len` bytes.
    fn read_cstr(&self, mut address: RemoteAddress, max_len: usize) -> Result<Vec<u8>, ReadError> {
        let mut out = Vec::new();
        let mut byte = [0u8; 1];
        while out.len() < max_len {
            self.read_exact(address, &mut byte)?;
            if byte[0] == 0 {
                break;
            }
            out.push(byte[0]);
            address = address.offset(1);
        }
        Ok(out)
    }
}

impl<T: RemoteMemoryReader + ?Sized> RemoteMemoryReaderExt for T {}

/// Wraps a platform [`RemoteMemoryReader`] with the `[min_addr, max_addr)`
/// bounds from a session's [`crate::process_map::MemoryMap`], rejecting any
/// out-of-range read before it reaches a syscall.
pub struct BoundedReader<R> {
    inner: R,
    pid: i32,
    min_addr: u64,
    max_addr: u64,
}

impl<R: RemoteMemoryReader> BoundedReader<R> {
    pub fn new(inner: R, pid: i32, min_addr: u64, max_addr: u64) -> Self {
        Self {
            inner,
            pid,
            min_addr,
            max_addr,
        }
    }

    /// True when `[address, address + len)` lies entirely within bounds.
    fn in_bounds(&self, address: RemoteAddress, len: usize) -> bool {
        match address.0.checked_add(len as u64) {
            Some(end) => address.0 >= self.min_addr && end <= self.max_addr,
            None => false,
        }
    }
}

impl<R: RemoteMemoryReader> RemoteMemoryReader for BoundedReader<R> {
    fn read_exact(&self, address: RemoteAddress, dst: &mut [u8]) -> Result<(), ReadError> {
        if !self.in_bounds(address, dst.len()) {
            return Err(ReadError::MemoryFault {
                pid: self.pid,
                address: address.as_usize(),
                length: dst.len(),
            });
        }
        self.inner.read_exact(address, dst)
    }
}

#[cfg(test)]
mod bounds_tests {
    use super::*;

    struct AlwaysOk;
    impl RemoteMemoryReader for AlwaysOk {
        fn read_exact(&self, _address: RemoteAddress, dst: &mut [u8]) -> Result<(), ReadError> {
            dst.fill(0xAA);
            Ok(())
        }
    }

    #[test]
    fn rejects_reads_below_min_addr_without_delegating() {
        let reader = BoundedReader::new(AlwaysOk, 1, 0x1000, 0x2000);
        let mut buf = [0u8; 8];
        let err = reader.read_exact(RemoteAddress(0x500), &mut buf).unwrap_err();
        assert!(matches!(err, ReadError::MemoryFault { .. }));
    }

    #[test]
    fn rejects_reads_that_overrun_max_addr() {
        let reader = BoundedReader::new(AlwaysOk, 1, 0x1000, 0x2000);
        let mut buf = [0u8; 16];
        let err = reader
            .read_exact(RemoteAddress(0x1ff8), &mut buf)
            .unwrap_err();
        assert!(matches!(err, ReadError::MemoryFault { .. }));
    }

    #[test]
    fn allows_reads_fully_inside_bounds() {
        let reader = BoundedReader::new(AlwaysOk, 1, 0x1000, 0x2000);
        let mut buf = [0u8; 8];
        reader.read_exact(RemoteAddress(0x1800), &mut buf).unwrap();
        assert_eq!(buf, [0xAA; 8]);
    }
}
