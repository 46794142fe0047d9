//! Windows realization walking `VirtualQueryEx` regions, with module paths
//! filled in from `EnumProcessModules`/`GetModuleFileNameExW`.

use super::{MappingInfo, MemoryMap};
use crate::error::MapError;
use crate::remote::RemoteAddress;
use std::collections::BTreeMap;
use windows_sys::Win32::Foundation::CloseHandle;
use windows_sys::Win32::System::Memory::{
    VirtualQueryEx, MEMORY_BASIC_INFORMATION, MEM_COMMIT, PAGE_EXECUTE, PAGE_EXECUTE_READ,
    PAGE_EXECUTE_READWRITE, PAGE_EXECUTE_WRITECOPY, PAGE_READWRITE, PAGE_WRITECOPY,
};
use windows_sys::Win32::System::ProcessStatus::{EnumProcessModules, GetModuleFileNameExW};
use windows_sys::Win32::System::Threading::{
    OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ,
};

fn module_paths(handle: isize) -> BTreeMap<usize, String> {
    let mut modules = vec![0isize; 256];
    let mut needed = 0u32;
    // SAFETY: `modules` is a valid buffer of the given byte size.
    let ok = unsafe {
        EnumProcessModules(
            handle,
            modules.as_mut_ptr().cast(),
            (modules.len() * std::mem::size_of::<isize>()) as u32,
            &mut needed,
        )
    };
    let mut out = BTreeMap::new();
    if ok == 0 {
        return out;
    }
    let count = (needed as usize / std::mem::size_of::<isize>()).min(modules.len());
    for &module in &modules[..count] {
        let mut buf = [0u16; 1024];
        // SAFETY: `buf` is a valid, appropriately sized buffer.
        let len = unsafe { GetModuleFileNameExW(handle, module, buf.as_mut_ptr(), buf.len() as u32) };
        if len > 0 {
            let name = String::from_utf16_lossy(&buf[..len as usize]);
            out.insert(module as usize, name);
        }
    }
    out
}

pub fn load_memory_map(pid: i32) -> Result<MemoryMap, MapError> {
    // SAFETY: FFI call with a valid access mask and pid.
    let handle = unsafe {
        OpenProcess(PROCESS_QUERY_INFORMATION | PROCESS_VM_READ, 0, pid as u32)
    };
    if handle == 0 {
        return Err(MapError::NoSuchProcess(pid));
    }

    let paths = module_paths(handle);
    let mut mappings = Vec::new();
    let mut address: usize = 0;

    loop {
        let mut info: MEMORY_BASIC_INFORMATION = unsafe { std::mem::zeroed() };
        // SAFETY: `info` is valid for the size passed.
        let written = unsafe {
            VirtualQueryEx(
                handle,
                address as *const _,
                &mut info,
                std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
            )
        };
        if written == 0 {
            break;
        }

        if info.State == MEM_COMMIT {
            let executable = matches!(
                info.Protect,
                PAGE_EXECUTE | PAGE_EXECUTE_READ | PAGE_EXECUTE_READWRITE | PAGE_EXECUTE_WRITECOPY
            );
            let writable = matches!(
                info.Protect,
                PAGE_READWRITE | PAGE_WRITECOPY | PAGE_EXECUTE_READWRITE | PAGE_EXECUTE_WRITECOPY
            );
            mappings.push(MappingInfo {
                start: RemoteAddress(info.BaseAddress as u64),
                end: RemoteAddress(info.BaseAddress as u64 + info.RegionSize as u64),
                file_offset: 0,
                executable,
                writable,
                path: paths.get(&(info.AllocationBase as usize)).cloned(),
            });
        }

        address = (info.BaseAddress as usize).saturating_add(info.RegionSize);
        if address == 0 {
            break;
        }
    }

    // SAFETY: `handle` was returned by a successful `OpenProcess`.
    unsafe {
        CloseHandle(handle);
    }

    Ok(MemoryMap::from_mappings(mappings))
}
