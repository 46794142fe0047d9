//! Minimal binding to `proc_regionfilename` (`<libproc.h>`), part of
//! `libSystem` and therefore linked into every macOS binary with no extra
//! dependency. `mach_vm_region_recurse` (see [`super::mach`]) reports a
//! region's address, size and protection but never its backing file; this
//! is the one libproc call needed to recover that path.

use std::os::raw::{c_int, c_void};

const MAXPATHLEN: usize = 1024;

unsafe extern "C" {
    fn proc_regionfilename(pid: c_int, address: u64, buffer: *mut c_void, buffersize: u32) -> c_int;
}

/// Returns the backing file path of the mapping containing `address` in
/// `pid`, or `None` for anonymous mappings (stack, heap, malloc arenas) or
/// on any libproc failure.
pub fn region_filename(pid: i32, address: u64) -> Option<String> {
    let mut buf = [0u8; MAXPATHLEN];
    // SAFETY: `buf` is a valid, `buf.len()`-byte buffer for the duration of
    // the call; `proc_regionfilename` writes at most that many bytes and
    // returns the byte count written (not NUL-terminated).
    let written = unsafe {
        proc_regionfilename(pid, address, buf.as_mut_ptr() as *mut c_void, buf.len() as u32)
    };
    if written <= 0 {
        return None;
    }
    Some(String::from_utf8_lossy(&buf[..written as usize]).into_owned())
}
