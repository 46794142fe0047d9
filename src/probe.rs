//! Runtime Probe: locates the interpreter's anchor structures in a target
//! process, via the symbol table first and a heuristic memory scan second.
//!
//! The scan fallback is written as a lazy iterator of candidate addresses
//! filtered by a validator closure rather than nested loops.

use crate::binary::BinaryImage;
use crate::error::ProbeError;
use crate::layout::{RuntimeFamily, VersionDescriptor};
use crate::process_map::{MappingInfo, MemoryMap};
use crate::remote::{RemoteAddress, RemoteMemoryReader, RemoteMemoryReaderExt};

/// Step between successive scan candidates. Anchor structures are always
/// pointer-aligned, so there is no value scanning byte-by-byte.
const SCAN_STRIDE: u64 = std::mem::size_of::<u64>() as u64;

/// Upper bound an OS thread identifier is plausible under; well above any
/// real `pid_max`/tid ceiling, so this only rejects a candidate whose
/// "thread id" field is clearly garbage (a stray pointer, a length field).
const MAX_PLAUSIBLE_THREAD_ID: u64 = 1 << 31;

/// Upper bound an interpreter id is plausible under. Zero is a legitimate
/// id (the main interpreter), so this only bounds the value rather than
/// requiring it nonzero.
const MAX_PLAUSIBLE_INTERPRETER_ID: u64 = 4096;

/// Result of a successful probe: the resolved version plus the remote
/// address of the head of the interpreter's thread-state chain, cached by
/// the session for the lifetime of sampling.
pub struct ProbeResult {
    pub version: VersionDescriptor,
    pub thread_state_head: RemoteAddress,
}

pub struct Probe<'a> {
    family: &'a dyn RuntimeFamily,
}

impl<'a> Probe<'a> {
    pub fn new(family: &'a dyn RuntimeFamily) -> Self {
        Self { family }
    }

    /// Resolves anchors for `major.minor` and validates them by walking the
    /// runtime → interpreter → thread → frame pointer chain, trying the
    /// symbol table first and falling back to a scan of BSS then heap when
    /// neither anchor symbol resolves or validation fails.
    pub fn find_anchors(
        &self,
        reader: &dyn RemoteMemoryReader,
        map: &MemoryMap,
        _binary_mapping: &MappingInfo,
        binary: &BinaryImage,
        major: u16,
        minor: u16,
    ) -> Result<ProbeResult, ProbeError> {
        let version = *self
            .family
            .find_version(major, minor)
            .ok_or(ProbeError::UnsupportedVersion { major, minor })?;

        let names = self.family.anchor_names();

        // `goblin` already resolved symbol addresses relative to the
        // mapping's runtime base at parse time (see `binary::parse_object`),
        // so they can be used directly as remote addresses.
        let runtime_state = binary.symbol(names.runtime_state).map(RemoteAddress);
        let thread_state_head = binary.symbol(names.thread_state_head).map(RemoteAddress);

        if let Some(head) = thread_state_head {
            if self.validate_thread_head(reader, map, head, &version) {
                return Ok(ProbeResult {
                    version,
                    thread_state_head: head,
                });
            }
        }

        if let Some(runtime) = runtime_state {
            if let Some(head) = self.resolve_thread_head(reader, map, runtime, &version) {
                return Ok(ProbeResult {
                    version,
                    thread_state_head: head,
                });
            }
        }

        self.scan_fallback(reader, map, &version)
    }

    /// Walks `runtime_state.interpreter_head -> interpreter.thread_head`,
    /// validating every pointer against the map's bounds along the way.
    fn resolve_thread_head(
        &self,
        reader: &dyn RemoteMemoryReader,
        map: &MemoryMap,
        runtime_state: RemoteAddress,
        version: &VersionDescriptor,
    ) -> Option<RemoteAddress> {
        if !Self::in_map(map, runtime_state, 8) {
            return None;
        }
        let interp_ptr_addr = runtime_state.offset(version.runtime.interpreter_head as u64);
        if !Self::in_map(map, interp_ptr_addr, 8) {
            return None;
        }
        let interp = reader.read_pod::<u64>(interp_ptr_addr).ok()?;
        if interp == 0 || !Self::in_map(map, RemoteAddress(interp), 8) {
            return None;
        }

        // §4.6 round-trip validation: the interpreter-identifier field must
        // look plausible (bounded) before the candidate is trusted further.
        // Zero is a legitimate id (the main interpreter), so this only
        // bounds the value rather than requiring it nonzero.
        let interp_id_addr = RemoteAddress(interp).offset(version.interpreter.id as u64);
        if !Self::in_map(map, interp_id_addr, 8) {
            return None;
        }
        let interp_id = reader.read_pod::<u64>(interp_id_addr).ok()?;
        if interp_id > MAX_PLAUSIBLE_INTERPRETER_ID {
            return None;
        }

        let thread_ptr_addr = RemoteAddress(interp).offset(version.interpreter.thread_head as u64);
        if !Self::in_map(map, thread_ptr_addr, 8) {
            return None;
        }
        let head = reader.read_pod::<u64>(thread_ptr_addr).ok()?;
        if head == 0 {
            return None;
        }
        let head = RemoteAddress(head);
        self.validate_thread_head(reader, map, head, version)
            .then_some(head)
    }

    /// Round-trips the invariant checks `spec.md` §4.6 calls for: the
    /// thread-state head must be in-bounds, its thread-identifier field must
    /// look like a plausible OS thread id (nonzero, bounded), and its
    /// top-frame pointer (if non-null) must also be in-bounds.
    fn validate_thread_head(
        &self,
        reader: &dyn RemoteMemoryReader,
        map: &MemoryMap,
        head: RemoteAddress,
        version: &VersionDescriptor,
    ) -> bool {
        if !Self::in_map(map, head, 8) {
            return false;
        }

        let thread_id_addr = head.offset(version.thread.thread_id as u64);
        if !Self::in_map(map, thread_id_addr, 8) {
            return false;
        }
        match reader.read_pod::<u64>(thread_id_addr) {
            Ok(tid) if tid == 0 || tid > MAX_PLAUSIBLE_THREAD_ID => return false,
            Ok(_) => {}
            Err(_) => return false,
        }

        let frame_ptr_addr = head.offset(version.thread.current_frame as u64);
        if !Self::in_map(map, frame_ptr_addr, 8) {
            return false;
        }
        match reader.read_pod::<u64>(frame_ptr_addr) {
            Ok(0) => true,
            Ok(frame) => Self::in_map(map, RemoteAddress(frame), 1),
            Err(_) => false,
        }
    }

    fn in_map(map: &MemoryMap, addr: RemoteAddress, len: u64) -> bool {
        match addr.0.checked_add(len) {
            Some(end) => addr.0 >= map.min_addr && end <= map.max_addr,
            None => false,
        }
    }

    fn scan_fallback(
        &self,
        reader: &dyn RemoteMemoryReader,
        map: &MemoryMap,
        version: &VersionDescriptor,
    ) -> Result<ProbeResult, ProbeError> {
        let candidates = Self::scan_regions(map)
            .flat_map(Self::candidates_in)
            .filter(|&addr| self.validate_thread_head(reader, map, addr, version));

        for addr in candidates {
            return Ok(ProbeResult {
                version: *version,
                thread_state_head: addr,
            });
        }

        Err(ProbeError::RuntimeNotFound(0))
    }

    /// BSS first, then heap: the two mapping kinds most likely to hold the
    /// runtime's statically allocated or lazily initialized singleton state.
    fn scan_regions(map: &MemoryMap) -> impl Iterator<Item = &MappingInfo> {
        let bss = map
            .mappings
            .iter()
            .find(|m| m.path.is_none() && m.writable && !m.executable);
        let heap = map.heap();
        bss.into_iter().chain(heap).filter(|m| m.size() > 0)
    }

    fn candidates_in(region: &MappingInfo) -> impl Iterator<Item = RemoteAddress> + '_ {
        let start = region.start.0;
        let end = region.end.0;
        std::iter::successors(Some(start), move |addr| {
            let next = addr + SCAN_STRIDE;
            (next < end).then_some(next)
        })
        .map(RemoteAddress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReadError;
    use crate::runtime::cpython::CPython;
    use std::cell::RefCell;

    struct FakeProcess {
        bytes: RefCell<Vec<u8>>,
    }

    impl FakeProcess {
        fn new(size: usize) -> Self {
            Self {
                bytes: RefCell::new(vec![0u8; size]),
            }
        }
        fn write_u64(&self, offset: usize, value: u64) {
            self.bytes.borrow_mut()[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
        }
    }

    impl RemoteMemoryReader for FakeProcess {
        fn read_exact(&self, address: RemoteAddress, dst: &mut [u8]) -> Result<(), ReadError> {
            let bytes = self.bytes.borrow();
            let start = address.as_usize();
            let end = start + dst.len();
            if end > bytes.len() {
                return Err(ReadError::MemoryFault {
                    pid: 0,
                    address: start,
                    length: dst.len(),
                });
            }
            dst.copy_from_slice(&bytes[start..end]);
            Ok(())
        }
    }

    fn map_covering(size: u64) -> MemoryMap {
        MemoryMap {
            mappings: vec![],
            min_addr: 0,
            max_addr: size,
        }
    }

    #[test]
    fn resolves_thread_head_through_runtime_and_interpreter_pointers() {
        let family = CPython;
        let version = family.find_version(3, 11).copied().unwrap();
        let proc = FakeProcess::new(4096);
        let map = map_covering(4096);

        let runtime_addr = 0usize;
        let interp_addr = 500usize;
        let thread_addr = 1000usize;

        proc.write_u64(runtime_addr + version.runtime.interpreter_head, interp_addr as u64);
        proc.write_u64(interp_addr + version.interpreter.thread_head, thread_addr as u64);
        proc.write_u64(thread_addr + version.thread.thread_id, 4242);
        proc.write_u64(thread_addr + version.thread.current_frame, 0);

        let probe = Probe::new(&family);
        let head = probe
            .resolve_thread_head(&proc, &map, RemoteAddress(runtime_addr as u64), &version)
            .expect("should resolve thread head");
        assert_eq!(head.0, thread_addr as u64);
    }

    #[test]
    fn rejects_out_of_bounds_runtime_pointer_without_reading_further() {
        let family = CPython;
        let version = family.find_version(3, 11).copied().unwrap();
        let proc = FakeProcess::new(4096);
        let map = map_covering(100);

        let probe = Probe::new(&family);
        assert!(probe
            .resolve_thread_head(&proc, &map, RemoteAddress(4000), &version)
            .is_none());
    }

    #[test]
    fn falls_back_to_scan_when_no_anchors_resolve() {
        let family = CPython;
        let version = family.find_version(3, 11).copied().unwrap();
        let proc = FakeProcess::new(8192);
        proc.write_u64(4096 + version.thread.thread_id, 4242);
        proc.write_u64(4096 + version.thread.current_frame, 0);

        let map = MemoryMap {
            mappings: vec![MappingInfo {
                start: RemoteAddress(4096),
                end: RemoteAddress(8192),
                file_offset: 0,
                executable: false,
                writable: true,
                path: None,
            }],
            min_addr: 0,
            max_addr: 8192,
        };

        let probe = Probe::new(&family);
        let result = probe.scan_fallback(&proc, &map, &version).unwrap();
        assert_eq!(result.thread_state_head.0, 4096);
    }
}
