//! Frame Stack Sampler: walks one thread's frame chain into an ordered list
//! of [`RemoteFrame`]s, backed by a per-session [`CodeSnapshot`] cache keyed
//! by the code object's remote address (code objects are immutable and
//! shared across frames/calls, so re-reading them every sample would be
//! wasted work).

use crate::error::SampleErrorKind;
use crate::layout::{LineTableKind, RuntimeFamily, VersionDescriptor};
use crate::remote::{RemoteAddress, RemoteMemoryReader, RemoteMemoryReaderExt};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

const MAX_NAME_LEN: usize = 256;
const MAX_LINE_TABLE_LEN: usize = 4096;

/// Synthetic frame appended when a walk is truncated at `max_depth`, per the
/// depth-exceeded policy: truncate the stack rather than discard the sample,
/// but mark the truncation so downstream consumers can tell a capped stack
/// from a genuinely shallow one.
const DEPTH_EXCEEDED_SENTINEL: &str = "<depth-limit-exceeded>";

/// A single resolved stack frame, root-to-leaf order within [`Sample`].
#[derive(Debug, Clone)]
pub struct RemoteFrame {
    pub function: String,
    pub filename: String,
    pub line: u32,
}

/// One fully resolved thread stack at a point in time.
#[derive(Debug, Clone)]
pub struct Sample {
    pub pid: i32,
    pub tid: i32,
    pub frames: Vec<RemoteFrame>,
}

#[derive(Debug, Clone)]
struct CodeSnapshot {
    name: String,
    filename: String,
    first_line: u32,
    line_table: Vec<u8>,
}

pub struct Sampler<'a> {
    reader: &'a dyn RemoteMemoryReader,
    family: &'a dyn RuntimeFamily,
    code_cache: RefCell<HashMap<u64, Rc<CodeSnapshot>>>,
}

impl<'a> Sampler<'a> {
    pub fn new(reader: &'a dyn RemoteMemoryReader, family: &'a dyn RuntimeFamily) -> Self {
        Self {
            reader,
            family,
            code_cache: RefCell::new(HashMap::new()),
        }
    }

    /// Walks the frame chain starting at `top_frame`, returning frames in
    /// root-to-leaf order, or a [`SampleErrorKind`] if the walk cannot
    /// continue.
    pub fn sample(
        &self,
        pid: i32,
        tid: i32,
        top_frame: RemoteAddress,
        version: &VersionDescriptor,
    ) -> Result<Sample, SampleErrorKind> {
        let mut leaf_to_root = Vec::new();
        let mut current = Some(top_frame);
        let mut depth = 0;
        let mut truncated = false;

        while let Some(frame_addr) = current {
            if depth >= version.max_depth {
                truncated = true;
                break;
            }

            let code_addr = self
                .reader
                .read_pod::<u64>(frame_addr.offset(version.frame.code as u64))
                .map_err(|_| SampleErrorKind::MemoryFault)?;
            let last_instr = self
                .reader
                .read_pod::<i32>(frame_addr.offset(version.frame.last_instruction as u64))
                .map_err(|_| SampleErrorKind::MemoryFault)?;

            if code_addr != 0 {
                let snapshot = self
                    .code_snapshot(RemoteAddress(code_addr), version)
                    .map_err(|_| SampleErrorKind::MemoryFault)?;
                let line = self.family.decode_line(
                    version.line_table_kind,
                    snapshot.first_line,
                    &snapshot.line_table,
                    last_instr,
                );
                leaf_to_root.push(RemoteFrame {
                    function: snapshot.name.clone(),
                    filename: snapshot.filename.clone(),
                    line,
                });
            }

            let back = self
                .reader
                .read_pod::<u64>(frame_addr.offset(version.frame.back as u64))
                .map_err(|_| SampleErrorKind::MemoryFault)?;
            current = (back != 0).then_some(RemoteAddress(back));
            depth += 1;
        }

        if truncated {
            leaf_to_root.push(RemoteFrame {
                function: DEPTH_EXCEEDED_SENTINEL.to_string(),
                filename: String::new(),
                line: 0,
            });
        }

        leaf_to_root.reverse();
        Ok(Sample {
            pid,
            tid,
            frames: leaf_to_root,
        })
    }

    fn code_snapshot(
        &self,
        code_addr: RemoteAddress,
        version: &VersionDescriptor,
    ) -> Result<Rc<CodeSnapshot>, ()> {
        if let Some(cached) = self.code_cache.borrow().get(&code_addr.0) {
            return Ok(cached.clone());
        }

        let name_ptr = self
            .reader
            .read_pod::<u64>(code_addr.offset(version.code.name as u64))
            .map_err(|_| ())?;
        let filename_ptr = self
            .reader
            .read_pod::<u64>(code_addr.offset(version.code.filename as u64))
            .map_err(|_| ())?;
        let first_line = self
            .reader
            .read_pod::<u32>(code_addr.offset(version.code.first_line as u64))
            .map_err(|_| ())?;
        let line_table_ptr = self
            .reader
            .read_pod::<u64>(code_addr.offset(version.code.line_table as u64))
            .map_err(|_| ())?;

        let name = self.read_string(RemoteAddress(name_ptr))?;
        let filename = self.read_string(RemoteAddress(filename_ptr))?;
        let line_table = if line_table_ptr != 0 {
            self.reader
                .read_to_vec(RemoteAddress(line_table_ptr), MAX_LINE_TABLE_LEN)
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let snapshot = Rc::new(CodeSnapshot {
            name,
            filename,
            first_line,
            line_table,
        });
        self.code_cache
            .borrow_mut()
            .insert(code_addr.0, snapshot.clone());
        Ok(snapshot)
    }

    fn read_string(&self, addr: RemoteAddress) -> Result<String, ()> {
        if addr.0 == 0 {
            return Ok(String::new());
        }
        let bytes = self
            .reader
            .read_cstr(addr, MAX_NAME_LEN)
            .map_err(|_| ())?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReadError;
    use crate::layout::RuntimeFamily;
    use crate::runtime::cpython::CPython;
    use std::cell::RefCell as StdRefCell;

    /// A tiny in-memory "remote process" backed by a byte buffer, used to
    /// drive the sampler without a real child process.
    struct FakeProcess {
        bytes: StdRefCell<Vec<u8>>,
    }

    impl FakeProcess {
        fn new(size: usize) -> Self {
            Self {
                bytes: StdRefCell::new(vec![0u8; size]),
            }
        }

        fn write_u64(&self, offset: usize, value: u64) {
            self.bytes.borrow_mut()[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
        }

        fn write_u32(&self, offset: usize, value: u32) {
            self.bytes.borrow_mut()[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        }

        fn write_bytes(&self, offset: usize, data: &[u8]) {
            self.bytes.borrow_mut()[offset..offset + data.len()].copy_from_slice(data);
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

    #[test]
    fn walks_a_two_frame_chain_root_to_leaf() {
        let version = CPython.find_version(3, 11).copied().unwrap();
        let proc = FakeProcess::new(4096);

        // Layout: frame objects at 0 and 200, code objects at 1000 and 1100.
        let root_frame = 0usize;
        let leaf_frame = 200usize;
        let root_code = 1000usize;
        let leaf_code = 1100usize;

        proc.write_u64(root_frame + version.frame.back, 0);
        proc.write_u64(root_frame + version.frame.code, root_code as u64);
        proc.write_u32(root_frame + version.frame.last_instruction as usize, 0);

        proc.write_u64(leaf_frame + version.frame.back, root_frame as u64);
        proc.write_u64(leaf_frame + version.frame.code, leaf_code as u64);
        proc.write_u32(leaf_frame + version.frame.last_instruction as usize, 0);

        for (code_addr, name, filename) in
            [(root_code, b"main\0".as_slice(), b"app.py\0".as_slice()),
             (leaf_code, b"work\0".as_slice(), b"app.py\0".as_slice())]
        {
            let name_ptr = code_addr + 500;
            let filename_ptr = code_addr + 600;
            proc.write_u64(code_addr + version.code.name, name_ptr as u64);
            proc.write_u64(code_addr + version.code.filename, filename_ptr as u64);
            proc.write_u32(code_addr + version.code.first_line, 1);
            proc.write_u64(code_addr + version.code.line_table, 0);
            proc.write_bytes(name_ptr, name);
            proc.write_bytes(filename_ptr, filename);
        }

        let family = CPython;
        let sampler = Sampler::new(&proc, &family);
        let sample = sampler
            .sample(123, 456, RemoteAddress(leaf_frame as u64), &version)
            .unwrap();

        assert_eq!(sample.pid, 123);
        assert_eq!(sample.tid, 456);
        assert_eq!(sample.frames.len(), 2);
        assert_eq!(sample.frames[0].function, "main");
        assert_eq!(sample.frames[1].function, "work");
    }

    #[test]
    fn depth_exceeded_truncates_and_appends_sentinel_frame() {
        let mut version = CPython.find_version(3, 11).copied().unwrap();
        version.max_depth = 1;
        let proc = FakeProcess::new(4096);
        proc.write_u64(0 + version.frame.back, 200);
        proc.write_u64(200 + version.frame.back, 0);

        let family = CPython;
        let sampler = Sampler::new(&proc, &family);
        let sample = sampler.sample(1, 1, RemoteAddress(0), &version).unwrap();

        assert_eq!(sample.frames.len(), 1);
        assert_eq!(sample.frames[0].function, DEPTH_EXCEEDED_SENTINEL);
    }
}
