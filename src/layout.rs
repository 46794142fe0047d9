//! Runtime Layout Descriptor: versioned, data-driven opaque struct layout.
//!
//! Struct offsets for each supported interpreter version live in one data
//! table keyed by `(major, minor)` instead of a header-switch, plus the
//! [`RuntimeFamily`] trait that supplies the active runtime's own table
//! and anchor names.

/// Byte offsets of the fields needed to walk from the runtime's global
/// state object down to the head of its interpreter-state chain.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeStateOffsets {
    /// Offset of the pointer to the first `PyInterpreterState` in the
    /// runtime's interpreter chain.
    pub interpreter_head: usize,
}

/// Byte offsets of the fields needed to walk from one interpreter state
/// down to the head of its thread-state chain.
#[derive(Debug, Clone, Copy)]
pub struct InterpreterStateOffsets {
    /// Offset of the pointer to the first thread state owned by this
    /// interpreter.
    pub thread_head: usize,
    /// Offset of a small identifying field (interpreter id), read by
    /// [`crate::probe::Probe::find_anchors`]'s round-trip validation and
    /// required to be bounded (zero is a legitimate id: the main
    /// interpreter's).
    pub id: usize,
}

/// Byte offsets of the fields the sampler needs inside the target
/// runtime's opaque per-frame struct.
#[derive(Debug, Clone, Copy)]
pub struct FrameOffsets {
    /// Offset of the pointer to the calling frame (or `None`/null sentinel
    /// at the stack base).
    pub back: usize,
    /// Offset of the pointer to this frame's code object.
    pub code: usize,
    /// Offset of the last-instruction / bytecode-offset field used to
    /// resolve the current line.
    pub last_instruction: usize,
}

/// Byte offsets of the fields the sampler needs inside the target
/// runtime's opaque code-object struct.
#[derive(Debug, Clone, Copy)]
pub struct CodeOffsets {
    pub name: usize,
    pub filename: usize,
    pub first_line: usize,
    /// Offset of the pointer to the line-number table blob (`lnotab` in
    /// CPython's glossary terms).
    pub line_table: usize,
}

/// Byte offsets of the fields the sampler needs inside the target
/// runtime's opaque per-thread struct, used to walk the interpreter's own
/// thread-state linked list starting from [`crate::probe::ProbeResult::thread_state_head`].
#[derive(Debug, Clone, Copy)]
pub struct ThreadStateOffsets {
    /// Offset of the pointer to the next thread state in the list.
    pub next: usize,
    /// Offset of the pointer to this thread's current (topmost) frame.
    pub current_frame: usize,
    /// Offset of the OS-level thread id field, read by
    /// [`crate::probe::Probe::find_anchors`]'s round-trip validation and
    /// required to look like a plausible OS thread id (nonzero, bounded).
    pub thread_id: usize,
}

/// Which scheme decodes the line-number table blob into a line number.
/// Kept as a table column (REDESIGN FLAGS) rather than a version-range
/// `if`/`match` scattered through the sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineTableKind {
    /// Pre-3.10 CPython `co_lnotab`: a sequence of `(bytecode_delta,
    /// line_delta)` signed byte pairs.
    FixedPair,
    /// 3.10+ CPython `co_linetable` (PEP 626): a variable-length encoding
    /// with a leading header byte per entry.
    VariableLength,
}

#[derive(Debug, Clone, Copy)]
pub struct VersionDescriptor {
    pub major: u16,
    pub minor: u16,
    pub runtime: RuntimeStateOffsets,
    pub interpreter: InterpreterStateOffsets,
    pub frame: FrameOffsets,
    pub code: CodeOffsets,
    pub thread: ThreadStateOffsets,
    pub line_table_kind: LineTableKind,
    /// Maximum frames walked before [`crate::sampler::Sampler::sample`]
    /// truncates the walk and appends a depth-exceeded sentinel frame.
    pub max_depth: usize,
}

/// Symbol names the [`crate::probe::Probe`] resolves to locate the
/// runtime's anchor structures. At least one of the two must resolve.
#[derive(Debug, Clone, Copy)]
pub struct AnchorNames {
    pub runtime_state: &'static str,
    pub thread_state_head: &'static str,
}

/// Decouples the sampler core from a specific interpreter: a family
/// supplies anchor symbol names, the version table, and how to decode a
/// thread's current line number. One concrete family (`cpython`) ships as
/// the reference implementation (see `crate::runtime::cpython`).
pub trait RuntimeFamily: Send + Sync {
    fn name(&self) -> &'static str;

    fn anchor_names(&self) -> AnchorNames;

    fn version_table(&self) -> &'static [VersionDescriptor];

    fn find_version(&self, major: u16, minor: u16) -> Option<&'static VersionDescriptor> {
        self.version_table()
            .iter()
            .find(|v| v.major == major && v.minor == minor)
    }

    /// Decodes a bytecode offset into a source line number given a code
    /// object's first line and raw line-table bytes.
    fn decode_line(&self, kind: LineTableKind, first_line: u32, table: &[u8], instr_offset: i32) -> u32;
}
