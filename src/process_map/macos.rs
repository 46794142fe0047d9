//! macOS realization walking `mach_vm_region_recurse` submap entries via
//! the Mach kernel bindings in `mac/mach.rs`.

use super::{MappingInfo, MemoryMap};
use crate::error::MapError;
use crate::mac::libproc;
use crate::mac::mach::{self, vm_region_submap_info_64, KernelError};
use crate::remote::RemoteAddress;
use mach2::vm_region::VM_REGION_SUBMAP_INFO_COUNT_64;
use mach2::vm_types::{mach_vm_address_t, mach_vm_size_t, natural_t};

pub fn load_memory_map(pid: i32) -> Result<MemoryMap, MapError> {
    let mut task: mach::mach_port_name_t = 0;
    // SAFETY: FFI call into the kernel with a valid out-param.
    let kr = unsafe { mach2::traps::task_for_pid(mach::mach_task_self(), pid, &mut task) };
    if kr != mach::KERN_SUCCESS {
        return Err(match KernelError::from(kr) {
            KernelError::InvalidTask | KernelError::NotFound => MapError::NoSuchProcess(pid),
            _ => MapError::PermissionDenied(pid),
        });
    }

    let mut mappings = Vec::new();
    let mut address: mach_vm_address_t = 0;

    loop {
        let mut size: mach_vm_size_t = 0;
        let mut depth: natural_t = 0;
        let mut info = vm_region_submap_info_64::default();
        let mut info_count = VM_REGION_SUBMAP_INFO_COUNT_64;

        // SAFETY: all out-params are valid and correctly sized for the call.
        let kr = unsafe {
            mach::mach_vm_region_recurse(
                task,
                &mut address,
                &mut size,
                &mut depth,
                (&mut info as *mut vm_region_submap_info_64).cast(),
                &mut info_count,
            )
        };
        if kr != mach::KERN_SUCCESS {
            break;
        }

        mappings.push(MappingInfo {
            start: RemoteAddress(address),
            end: RemoteAddress(address + size),
            file_offset: 0,
            executable: info.protection & libc::PROT_EXEC != 0,
            writable: info.protection & libc::PROT_WRITE != 0,
            // `mach_vm_region_recurse` never reports a backing file; ask
            // libproc separately, since selecting the interpreter binary and
            // re-reading it from disk both need a path.
            path: libproc::region_filename(pid, address),
        });

        address += size;
    }

    Ok(MemoryMap::from_mappings(mappings))
}
