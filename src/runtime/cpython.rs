//! CPython runtime family: anchor names, the per-version opaque-struct
//! layout table, and line-table decoding.
//!
//! CPython is the one shipped concrete [`RuntimeFamily`]; its data model
//! (`frame`, `code`, `lnotab`, `first_line`) maps directly onto
//! `PyFrameObject`/`PyCodeObject`. Offsets below are illustrative
//! placeholders for the handful of versions tabulated here; see DESIGN.md
//! for how new versions are added (a data row, not a code change).

use crate::layout::{
    AnchorNames, CodeOffsets, FrameOffsets, InterpreterStateOffsets, LineTableKind, RuntimeFamily,
    RuntimeStateOffsets, ThreadStateOffsets, VersionDescriptor,
};

const VERSION_TABLE: &[VersionDescriptor] = &[
    VersionDescriptor {
        major: 3,
        minor: 8,
        runtime: RuntimeStateOffsets {
            interpreter_head: 32,
        },
        interpreter: InterpreterStateOffsets {
            thread_head: 8,
            id: 0,
        },
        thread: ThreadStateOffsets {
            next: 8,
            current_frame: 16,
            thread_id: 176,
        },
        frame: FrameOffsets {
            back: 24,
            code: 32,
            last_instruction: 128,
        },
        code: CodeOffsets {
            name: 96,
            filename: 88,
            first_line: 68,
            line_table: 104,
        },
        line_table_kind: LineTableKind::FixedPair,
        max_depth: 512,
    },
    VersionDescriptor {
        major: 3,
        minor: 9,
        runtime: RuntimeStateOffsets {
            interpreter_head: 32,
        },
        interpreter: InterpreterStateOffsets {
            thread_head: 8,
            id: 0,
        },
        thread: ThreadStateOffsets {
            next: 8,
            current_frame: 16,
            thread_id: 176,
        },
        frame: FrameOffsets {
            back: 24,
            code: 32,
            last_instruction: 128,
        },
        code: CodeOffsets {
            name: 96,
            filename: 88,
            first_line: 68,
            line_table: 104,
        },
        line_table_kind: LineTableKind::FixedPair,
        max_depth: 512,
    },
    VersionDescriptor {
        major: 3,
        minor: 10,
        runtime: RuntimeStateOffsets {
            interpreter_head: 32,
        },
        interpreter: InterpreterStateOffsets {
            thread_head: 8,
            id: 0,
        },
        thread: ThreadStateOffsets {
            next: 8,
            current_frame: 16,
            thread_id: 184,
        },
        frame: FrameOffsets {
            back: 24,
            code: 32,
            last_instruction: 132,
        },
        code: CodeOffsets {
            name: 96,
            filename: 88,
            first_line: 68,
            line_table: 112,
        },
        line_table_kind: LineTableKind::VariableLength,
        max_depth: 512,
    },
    VersionDescriptor {
        major: 3,
        minor: 11,
        runtime: RuntimeStateOffsets {
            interpreter_head: 40,
        },
        interpreter: InterpreterStateOffsets {
            thread_head: 16,
            id: 0,
        },
        thread: ThreadStateOffsets {
            next: 8,
            current_frame: 24,
            thread_id: 176,
        },
        frame: FrameOffsets {
            back: 16,
            code: 32,
            last_instruction: 56,
        },
        code: CodeOffsets {
            name: 112,
            filename: 104,
            first_line: 72,
            line_table: 128,
        },
        line_table_kind: LineTableKind::VariableLength,
        max_depth: 512,
    },
    VersionDescriptor {
        major: 3,
        minor: 12,
        runtime: RuntimeStateOffsets {
            interpreter_head: 40,
        },
        interpreter: InterpreterStateOffsets {
            thread_head: 16,
            id: 0,
        },
        thread: ThreadStateOffsets {
            next: 8,
            current_frame: 24,
            thread_id: 176,
        },
        frame: FrameOffsets {
            back: 16,
            code: 32,
            last_instruction: 56,
        },
        code: CodeOffsets {
            name: 112,
            filename: 104,
            first_line: 72,
            line_table: 128,
        },
        line_table_kind: LineTableKind::VariableLength,
        max_depth: 512,
    },
];

/// Extracts a `(major, minor)` version tuple from a mapped binary's backing
/// path, e.g. `/usr/bin/python3.11` or `/usr/lib/libpython3.10.so.1.0`.
/// Used as a fallback when no version string can be read out of the
/// runtime's own memory.
pub fn version_from_path(path: &str) -> Option<(u16, u16)> {
    let lower = path.to_ascii_lowercase();
    let idx = lower.find("python")?;
    let rest = &lower[idx + "python".len()..];
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(rest.len());
    let version = &rest[..digits_end];
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}

pub struct CPython;

impl RuntimeFamily for CPython {
    fn name(&self) -> &'static str {
        "cpython"
    }

    fn anchor_names(&self) -> AnchorNames {
        AnchorNames {
            runtime_state: "_PyRuntime",
            thread_state_head: "_PyThreadState_GetCurrent",
        }
    }

    fn version_table(&self) -> &'static [VersionDescriptor] {
        VERSION_TABLE
    }

    fn decode_line(&self, kind: LineTableKind, first_line: u32, table: &[u8], instr_offset: i32) -> u32 {
        match kind {
            LineTableKind::FixedPair => decode_fixed_pair(first_line, table, instr_offset),
            LineTableKind::VariableLength => decode_variable_length(first_line, table, instr_offset),
        }
    }
}

/// Classic `co_lnotab`: a sequence of `(bytecode_delta, line_delta)` signed
/// byte pairs, walked until the accumulated bytecode offset passes
/// `instr_offset`.
fn decode_fixed_pair(first_line: u32, table: &[u8], instr_offset: i32) -> u32 {
    let mut addr: i32 = 0;
    let mut line = first_line as i32;
    let mut best_line = line;

    for pair in table.chunks_exact(2) {
        if addr > instr_offset {
            break;
        }
        let addr_incr = pair[0] as i32;
        let line_incr = pair[1] as i8 as i32;
        addr += addr_incr;
        line += line_incr;
        if addr <= instr_offset {
            best_line = line;
        }
    }

    best_line.max(0) as u32
}

/// PEP 626 `co_linetable`: a run-length encoding of `(code_units,
/// line_delta)` entries, one leading length byte followed by a signed
/// 16-bit line delta per entry.
fn decode_variable_length(first_line: u32, table: &[u8], instr_offset: i32) -> u32 {
    let mut addr: i32 = 0;
    let mut line = first_line as i32;
    let mut best_line = line;
    let mut offset = 0;

    while offset + 3 <= table.len() {
        if addr > instr_offset {
            break;
        }
        let code_units = table[offset] as i32;
        let line_delta = i16::from_le_bytes([table[offset + 1], table[offset + 2]]) as i32;
        offset += 3;
        addr += code_units;
        line += line_delta;
        if addr <= instr_offset {
            best_line = line;
        }
    }

    best_line.max(0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_pair_tracks_accumulated_line() {
        // offset 0..2 -> line 10, offset 2..6 -> line 11
        let table = [2u8, 1u8, 4u8, 0u8];
        assert_eq!(decode_fixed_pair(10, &table, 0), 10);
        assert_eq!(decode_fixed_pair(10, &table, 3), 11);
    }

    #[test]
    fn fixed_pair_handles_negative_deltas() {
        let table = [2u8, (-1i8) as u8];
        assert_eq!(decode_fixed_pair(10, &table, 3), 9);
    }

    #[test]
    fn variable_length_tracks_accumulated_line() {
        let mut table = Vec::new();
        table.extend_from_slice(&[2u8]);
        table.extend_from_slice(&1i16.to_le_bytes());
        assert_eq!(decode_variable_length(5, &table, 0), 5);
        assert_eq!(decode_variable_length(5, &table, 2), 6);
    }

    #[test]
    fn version_from_path_parses_binary_and_library_names() {
        assert_eq!(version_from_path("/usr/bin/python3.11"), Some((3, 11)));
        assert_eq!(
            version_from_path("/usr/lib/x86_64-linux-gnu/libpython3.10.so.1.0"),
            Some((3, 10))
        );
        assert_eq!(version_from_path("/usr/bin/node"), None);
    }

    #[test]
    fn every_tabulated_version_is_reachable_by_find_version() {
        let family = CPython;
        for v in VERSION_TABLE {
            assert!(family.find_version(v.major, v.minor).is_some());
        }
    }
}
