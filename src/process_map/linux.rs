//! Hand-rolled `/proc/<pid>/maps` parser rather than an external maps
//! crate.

use super::{MappingInfo, MemoryMap};
use crate::error::MapError;
use crate::remote::RemoteAddress;
use std::io::{BufRead, BufReader};

/// Parses one line of `/proc/<pid>/maps`, e.g.:
/// `7f1234560000-7f1234580000 r-xp 00000000 08:01 131073 /usr/bin/python3.11`
fn parse_line(line: &str) -> Result<MappingInfo, MapError> {
    let mut fields = line.split_whitespace();

    let addr_range = fields
        .next()
        .ok_or_else(|| MapError::MalformedLine(line.to_string()))?;
    let perms = fields
        .next()
        .ok_or_else(|| MapError::MalformedLine(line.to_string()))?;
    let offset = fields
        .next()
        .ok_or_else(|| MapError::MalformedLine(line.to_string()))?;
    let _dev = fields.next();
    let _inode = fields.next();
    let path = fields.next().map(str::to_string);

    let (start_str, end_str) = addr_range
        .split_once('-')
        .ok_or_else(|| MapError::MalformedLine(line.to_string()))?;
    let start = u64::from_str_radix(start_str, 16)
        .map_err(|_| MapError::MalformedLine(line.to_string()))?;
    let end = u64::from_str_radix(end_str, 16)
        .map_err(|_| MapError::MalformedLine(line.to_string()))?;
    let file_offset = u64::from_str_radix(offset, 16)
        .map_err(|_| MapError::MalformedLine(line.to_string()))?;

    let executable = perms.as_bytes().get(2) == Some(&b'x');
    let writable = perms.as_bytes().get(1) == Some(&b'w');

    Ok(MappingInfo {
        start: RemoteAddress(start),
        end: RemoteAddress(end),
        file_offset,
        executable,
        writable,
        path,
    })
}

/// Merges adjacent mappings that share a path into one logical module entry:
/// a shared object's text/rodata/data/bss segments are separate `mmap`s but
/// one module.
fn merge_adjacent(mut mappings: Vec<MappingInfo>) -> Vec<MappingInfo> {
    mappings.sort_by_key(|m| m.start.0);
    let mut merged: Vec<MappingInfo> = Vec::with_capacity(mappings.len());
    for mapping in mappings {
        if let Some(last) = merged.last_mut() {
            let same_module = mapping.path.is_some() && mapping.path == last.path;
            let contiguous = last.end.0 == mapping.start.0;
            if same_module && contiguous {
                last.end = mapping.end;
                last.executable |= mapping.executable;
                last.writable |= mapping.writable;
                continue;
            }
        }
        merged.push(mapping);
    }
    merged
}

pub fn load_memory_map(pid: i32) -> Result<MemoryMap, MapError> {
    let path = format!("/proc/{pid}/maps");
    let file = std::fs::File::open(&path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            MapError::NoSuchProcess(pid)
        } else if source.kind() == std::io::ErrorKind::PermissionDenied {
            MapError::PermissionDenied(pid)
        } else {
            MapError::Io { pid, source }
        }
    })?;

    let reader = BufReader::new(file);
    let mut mappings = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|source| MapError::Io { pid, source })?;
        if line.is_empty() {
            continue;
        }
        mappings.push(parse_line(&line)?);
    }

    Ok(MemoryMap::from_mappings(merge_adjacent(mappings)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_executable_mapping_with_path() {
        let m = parse_line(
            "7f1234560000-7f1234580000 r-xp 00000000 08:01 131073 /usr/bin/python3.11",
        )
        .unwrap();
        assert_eq!(m.start.0, 0x7f1234560000);
        assert_eq!(m.end.0, 0x7f1234580000);
        assert!(m.executable);
        assert!(!m.writable);
        assert_eq!(m.path.as_deref(), Some("/usr/bin/python3.11"));
    }

    #[test]
    fn parses_anonymous_mapping() {
        let m = parse_line("7f1234580000-7f1234590000 rw-p 00000000 00:00 0").unwrap();
        assert!(m.path.is_none());
        assert!(m.writable);
        assert!(!m.executable);
    }

    #[test]
    fn rejects_malformed_line() {
        assert!(parse_line("not a maps line").is_err());
    }

    #[test]
    fn merges_contiguous_same_module_segments() {
        let mappings = vec![
            parse_line("1000-2000 r-xp 00000000 08:01 1 /lib/libfoo.so").unwrap(),
            parse_line("2000-3000 rw-p 00001000 08:01 1 /lib/libfoo.so").unwrap(),
        ];
        let merged = merge_adjacent(mappings);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].start.0, 0x1000);
        assert_eq!(merged[0].end.0, 0x3000);
        assert!(merged[0].executable);
        assert!(merged[0].writable);
    }
}
