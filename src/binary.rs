//! Binary Format Parser: one format-agnostic entry point backed by `goblin`,
//! dispatching uniformly over `goblin::Object::parse` across ELF, Mach-O
//! and PE instead of hand-walking one format's structures.

use crate::error::ParseError;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectFormat {
    Elf,
    MachO,
    Pe,
}

/// A parsed, in-memory view of a binary (executable or shared library)
/// mapped into the target process, with its dynamic symbol table resolved
/// to file offsets already adjusted by load bias.
#[derive(Debug, Clone, Default)]
pub struct BinaryImage {
    pub format: Option<ObjectFormat>,
    /// Difference between a symbol's linked virtual address and its actual
    /// runtime address: `runtime = linked + load_bias`.
    pub load_bias: u64,
    pub symbols: HashMap<String, u64>,
}

impl BinaryImage {
    pub fn symbol(&self, name: &str) -> Option<u64> {
        self.symbols.get(name).copied()
    }
}

/// Parses raw bytes of a mapped object file into a [`BinaryImage`].
///
/// `map_base` is the runtime address at which `data` was mapped, used to
/// compute the load bias against the first loadable segment.
pub fn parse_object(data: &[u8], map_base: u64) -> Result<BinaryImage, ParseError> {
    use goblin::Object;

    match Object::parse(data)? {
        Object::Elf(elf) => {
            let first_load = elf
                .program_headers
                .iter()
                .find(|ph| ph.p_type == goblin::elf::program_header::PT_LOAD);
            // The first `PT_LOAD` segment's vaddr rounded down to its own
            // alignment gives the base the loader actually mapped.
            let load_bias = match first_load {
                Some(ph) => {
                    let align = ph.p_align.max(1);
                    let aligned_vaddr = ph.p_vaddr - (ph.p_vaddr % align);
                    map_base.wrapping_sub(aligned_vaddr)
                }
                None => 0,
            };

            let mut symbols = HashMap::new();
            for sym in elf.dynsyms.iter() {
                if sym.st_value == 0 {
                    continue;
                }
                if let Some(name) = elf.dynstrtab.get_at(sym.st_name) {
                    symbols.insert(name.to_string(), sym.st_value.wrapping_add(load_bias));
                }
            }
            if symbols.is_empty() {
                return Err(ParseError::NoDynamicSymbols);
            }

            Ok(BinaryImage {
                format: Some(ObjectFormat::Elf),
                load_bias,
                symbols,
            })
        }
        Object::Mach(goblin::mach::Mach::Binary(macho)) => {
            // Mirrors the ELF branch's "first `PT_LOAD` segment" rule: skip
            // `__PAGEZERO`, an unmapped, zero-filesize reservation segment
            // that every real macOS executable (but not a `.dylib`) carries
            // first. Biasing off it would yield `load_bias == map_base`
            // instead of the offset to the first segment actually backed by
            // the file's contents.
            let first_load = macho.segments.iter().find(|seg| {
                seg.filesize > 0 && seg.name().map(|n| n != "__PAGEZERO").unwrap_or(true)
            });
            let load_bias = match first_load {
                Some(seg) => map_base.wrapping_sub(seg.vmaddr),
                None => 0,
            };

            let mut symbols = HashMap::new();
            if let Some(exports) = macho.exports().ok() {
                for export in exports {
                    symbols.insert(export.name, export.offset.wrapping_add(load_bias));
                }
            }
            if symbols.is_empty() {
                return Err(ParseError::NoDynamicSymbols);
            }

            Ok(BinaryImage {
                format: Some(ObjectFormat::MachO),
                load_bias,
                symbols,
            })
        }
        Object::PE(pe) => {
            // PE carries an explicit preferred image base; the load bias is
            // the difference to wherever it actually landed (usually zero
            // unless ASLR relocated it and we're reading the relocated copy).
            let load_bias = map_base.wrapping_sub(pe.image_base as u64);

            let mut symbols = HashMap::new();
            for export in &pe.exports {
                if let (Some(name), rva) = (export.name, export.rva) {
                    symbols.insert(name.to_string(), (rva as u64).wrapping_add(load_bias));
                }
            }
            if symbols.is_empty() {
                return Err(ParseError::NoDynamicSymbols);
            }

            Ok(BinaryImage {
                format: Some(ObjectFormat::Pe),
                load_bias,
                symbols,
            })
        }
        _ => Err(ParseError::NoDynamicSymbols),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_truncated_input() {
        let garbage = [0u8; 4];
        assert!(parse_object(&garbage, 0).is_err());
    }
}
