//! Process Map Introspector: enumerates a target process's mapped regions
//! and applies the binary-selection heuristic from the runtime probe.
//!
//! Linux parses `/proc/<pid>/maps` directly; macOS and Windows walk the
//! platform's native region-enumeration APIs into the same [`MappingInfo`]
//! shape.

use crate::error::MapError;
use crate::remote::RemoteAddress;

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        mod linux;
        pub use linux::load_memory_map;
    } else if #[cfg(target_os = "macos")] {
        mod macos;
        pub use macos::load_memory_map;
    } else if #[cfg(target_os = "windows")] {
        mod windows;
        pub use windows::load_memory_map;
    }
}

/// Below this size a mapping is assumed to be a library, not the main
/// interpreter binary, when multiple candidates share a name fragment.
pub const MIN_MAIN_BINARY_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct MappingInfo {
    pub start: RemoteAddress,
    pub end: RemoteAddress,
    /// Offset into the backing file, if any, at which `start` maps.
    pub file_offset: u64,
    pub executable: bool,
    pub writable: bool,
    /// Backing path, e.g. `/usr/bin/python3.11`, `[heap]`, or `None` for
    /// anonymous mappings.
    pub path: Option<String>,
}

impl MappingInfo {
    pub fn size(&self) -> u64 {
        self.end.0.saturating_sub(self.start.0)
    }

    pub fn contains(&self, addr: RemoteAddress) -> bool {
        addr.0 >= self.start.0 && addr.0 < self.end.0
    }
}

/// Pseudo-mapping names that do not represent real, independently
/// allocated process memory and must be excluded from the `min_addr`/
/// `max_addr` bounds computation.
const PSEUDO_REGIONS: &[&str] = &["[vsyscall]", "[vvar]", "[vdso]", "[vectors]"];

#[derive(Debug, Clone, Default)]
pub struct MemoryMap {
    pub mappings: Vec<MappingInfo>,
    /// Lowest base address across real (non-pseudo) regions.
    pub min_addr: u64,
    /// Highest end address across real (non-pseudo) regions.
    pub max_addr: u64,
}

impl MemoryMap {
    /// Builds a map from raw platform mappings, computing `min_addr`/
    /// `max_addr` over the subset that represents real address space.
    pub fn from_mappings(mappings: Vec<MappingInfo>) -> Self {
        let real = mappings.iter().filter(|m| {
            !m.path
                .as_deref()
                .map(|p| PSEUDO_REGIONS.contains(&p))
                .unwrap_or(false)
        });
        let min_addr = real.clone().map(|m| m.start.0).min().unwrap_or(0);
        let max_addr = real.map(|m| m.end.0).max().unwrap_or(0);
        Self {
            mappings,
            min_addr,
            max_addr,
        }
    }

    pub fn heap(&self) -> Option<&MappingInfo> {
        self.mappings
            .iter()
            .find(|m| m.path.as_deref() == Some("[heap]"))
            .or_else(|| {
                // Fall back to the first sizeable anonymous, writable
                // mapping directly after the main binary's mappings, which
                // is where the brk-managed heap usually lands when the
                // pseudo-path isn't reported (e.g. under some sandboxes).
                self.mappings
                    .iter()
                    .find(|m| m.path.is_none() && m.writable && m.size() >= MIN_MAIN_BINARY_SIZE / 16)
            })
    }

    pub fn bss(&self, binary: &MappingInfo) -> Option<&MappingInfo> {
        // The BSS of the main binary is the anonymous, writable mapping
        // whose file_offset continues on from the binary's own mapped data,
        // typically appearing immediately after it in the map.
        let binary_path = binary.path.as_deref();
        self.mappings
            .iter()
            .skip_while(|m| m.path.as_deref() != binary_path)
            .find(|m| m.path.is_none() && m.writable)
    }

    /// Selects the mapping that best represents the interpreter's main
    /// binary: prefer an executable mapping whose path contains
    /// `name_hint`, preferring larger mappings over small shim/loader
    /// mappings.
    pub fn select_binary(&self, name_hint: &str) -> Option<&MappingInfo> {
        let lower_hint = name_hint.to_ascii_lowercase();
        self.mappings
            .iter()
            .filter(|m| m.executable)
            .filter(|m| {
                m.path
                    .as_deref()
                    .map(|p| p.to_ascii_lowercase().contains(&lower_hint))
                    .unwrap_or(false)
            })
            .max_by_key(|m| m.size())
            .or_else(|| {
                self.mappings
                    .iter()
                    .filter(|m| m.executable && m.size() >= MIN_MAIN_BINARY_SIZE)
                    .max_by_key(|m| m.size())
            })
    }
}
