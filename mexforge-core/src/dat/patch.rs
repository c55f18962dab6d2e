//! Relocatable native code patches and the archives that carry them.
//!
//! An archive is a DAT file with one root per patch. Each root points at
//! a header holding the code blob, the relocation rows and the exported
//! symbol rows.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::record::{dat_record, reference_fields, scalar_fields, Buffer};
use super::{DatError, DatFile, DatRecord};

pub const ENABLED_ARCHIVE: &str = "files/MxPt.dat";
pub const DISABLED_ARCHIVE: &str = "files/MxPtOff.dat";

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("patch '{patch}': {kind:?} relocation at 0x{offset:X} is outside the {len}-byte code blob")]
    RelocationOutOfBounds {
        patch: String,
        kind: RelocationKind,
        offset: u32,
        len: usize,
    },
    #[error("patch '{patch}': symbol '{symbol}' (0x{start:X}..0x{end:X}) is outside the {len}-byte code blob")]
    SymbolOutOfBounds {
        patch: String,
        symbol: String,
        start: u32,
        end: u32,
        len: usize,
    },
    #[error("patch '{patch}': branch at 0x{offset:X} cannot reach 0x{target:08X} from load address 0x{load_address:08X}")]
    BranchOutOfRange {
        patch: String,
        offset: u32,
        target: u32,
        load_address: u32,
    },
    #[error("unknown relocation type {0}")]
    UnknownRelocation(u32),
    #[error(transparent)]
    Dat(#[from] DatError),
}

pub type PatchResult<T> = std::result::Result<T, PatchError>;

/// PowerPC ELF relocation types that patches may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelocationKind {
    Addr32,
    Addr16Lo,
    Addr16Hi,
    Addr16Ha,
    Rel24,
}

impl RelocationKind {
    pub fn id(self) -> u32 {
        match self {
            RelocationKind::Addr32 => 1,
            RelocationKind::Addr16Lo => 4,
            RelocationKind::Addr16Hi => 5,
            RelocationKind::Addr16Ha => 6,
            RelocationKind::Rel24 => 10,
        }
    }

    pub fn from_id(id: u32) -> PatchResult<Self> {
        Ok(match id {
            1 => RelocationKind::Addr32,
            4 => RelocationKind::Addr16Lo,
            5 => RelocationKind::Addr16Hi,
            6 => RelocationKind::Addr16Ha,
            10 => RelocationKind::Rel24,
            other => return Err(PatchError::UnknownRelocation(other)),
        })
    }

    /// Bytes of code the relocation rewrites.
    fn width(self) -> usize {
        match self {
            RelocationKind::Addr32 | RelocationKind::Rel24 => 4,
            _ => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relocation {
    pub kind: RelocationKind,
    pub code_offset: u32,
    /// Absolute address the relocated field resolves to.
    pub target: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSymbol {
    pub code_start: u32,
    pub code_end: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRecord {
    pub name: String,
    pub code: Vec<u8>,
    pub relocations: Vec<Relocation>,
    pub symbols: Vec<PatchSymbol>,
}

impl PatchRecord {
    /// Checks that every relocation and symbol lies inside the code blob.
    pub fn validate(&self) -> PatchResult<()> {
        let len = self.code.len();
        for reloc in &self.relocations {
            let end = reloc.code_offset as usize + reloc.kind.width();
            if end > len {
                return Err(PatchError::RelocationOutOfBounds {
                    patch: self.name.clone(),
                    kind: reloc.kind,
                    offset: reloc.code_offset,
                    len,
                });
            }
        }
        for symbol in &self.symbols {
            if symbol.code_start > symbol.code_end || symbol.code_end as usize > len {
                return Err(PatchError::SymbolOutOfBounds {
                    patch: self.name.clone(),
                    symbol: symbol.name.clone(),
                    start: symbol.code_start,
                    end: symbol.code_end,
                    len,
                });
            }
        }
        Ok(())
    }

    /// Returns the code with every relocation applied for a blob loaded at
    /// `load_address`.
    pub fn link(&self, load_address: u32) -> PatchResult<Vec<u8>> {
        self.validate()?;
        let mut code = self.code.clone();
        for reloc in &self.relocations {
            let at = reloc.code_offset as usize;
            let target = reloc.target;
            match reloc.kind {
                RelocationKind::Addr32 => code[at..at + 4].copy_from_slice(&target.to_be_bytes()),
                RelocationKind::Addr16Lo => code[at..at + 2].copy_from_slice(&(target as u16).to_be_bytes()),
                RelocationKind::Addr16Hi => {
                    code[at..at + 2].copy_from_slice(&((target >> 16) as u16).to_be_bytes())
                }
                RelocationKind::Addr16Ha => {
                    let high = (target.wrapping_add(0x8000) >> 16) as u16;
                    code[at..at + 2].copy_from_slice(&high.to_be_bytes())
                }
                RelocationKind::Rel24 => {
                    let place = load_address as i64 + at as i64;
                    let delta = target as i64 - place;
                    if !(-0x0200_0000..0x0200_0000).contains(&delta) || delta % 4 != 0 {
                        return Err(PatchError::BranchOutOfRange {
                            patch: self.name.clone(),
                            offset: reloc.code_offset,
                            target,
                            load_address,
                        });
                    }
                    let word = u32::from_be_bytes([code[at], code[at + 1], code[at + 2], code[at + 3]]);
                    let word = (word & 0xFC00_0003) | (delta as u32 & 0x03FF_FFFC);
                    code[at..at + 4].copy_from_slice(&word.to_be_bytes());
                }
            }
        }
        Ok(code)
    }

    fn write_into(&self, dat: &mut DatFile) -> PatchResult<()> {
        let header = PatchHeader::create(dat);
        let code = dat.alloc_buffer(self.code.clone());
        header.set_code(dat, Some(Buffer(code)));
        header.set_code_size(dat, self.code.len() as u32)?;

        if !self.relocations.is_empty() {
            let table = dat.alloc(self.relocations.len() * RELOCATION_ROW);
            for (i, reloc) in self.relocations.iter().enumerate() {
                let row = i * RELOCATION_ROW;
                dat.write::<u32>(table, row, reloc.kind.id(), "Relocation")?;
                dat.write::<u32>(table, row + 4, reloc.code_offset, "Relocation")?;
                dat.write::<u32>(table, row + 8, reloc.target, "Relocation")?;
            }
            header.set_relocations(dat, Some(Buffer(table)));
        }
        header.set_relocation_count(dat, self.relocations.len() as u32)?;

        if !self.symbols.is_empty() {
            let table = dat.alloc(self.symbols.len() * SYMBOL_ROW);
            for (i, symbol) in self.symbols.iter().enumerate() {
                let row = i * SYMBOL_ROW;
                dat.write::<u32>(table, row, symbol.code_start, "PatchSymbol")?;
                dat.write::<u32>(table, row + 4, symbol.code_end, "PatchSymbol")?;
                let name = dat.alloc_string(&symbol.name);
                dat.set_reference(table, row + 8, Some(name));
            }
            header.set_symbols(dat, Some(Buffer(table)));
        }
        header.set_symbol_count(dat, self.symbols.len() as u32)?;

        dat.set_root(&self.name, header.node());
        Ok(())
    }

    fn read_from(dat: &DatFile, name: &str, header: PatchHeader) -> PatchResult<PatchRecord> {
        let size = header.code_size(dat)? as usize;
        let code = match header.code(dat) {
            Some(buffer) => {
                let bytes = buffer.bytes(dat);
                bytes
                    .get(..size)
                    .ok_or(DatError::OutOfBounds {
                        archive: dat.name.clone(),
                        record: "PatchCode",
                        offset: 0,
                        needed: size,
                        available: bytes.len(),
                    })?
                    .to_vec()
            }
            None => Vec::new(),
        };

        let mut relocations = Vec::new();
        let count = header.relocation_count(dat)? as usize;
        if count > 0 {
            let table = header
                .relocations(dat)
                .ok_or_else(|| dat.missing_reference(PatchHeader::NAME, 0x08))?;
            for i in 0..count {
                let row = i * RELOCATION_ROW;
                relocations.push(Relocation {
                    kind: RelocationKind::from_id(dat.read::<u32>(table.0, row, "Relocation")?)?,
                    code_offset: dat.read::<u32>(table.0, row + 4, "Relocation")?,
                    target: dat.read::<u32>(table.0, row + 8, "Relocation")?,
                });
            }
        }

        let mut symbols = Vec::new();
        let count = header.symbol_count(dat)? as usize;
        if count > 0 {
            let table = header
                .symbols(dat)
                .ok_or_else(|| dat.missing_reference(PatchHeader::NAME, 0x10))?;
            for i in 0..count {
                let row = i * SYMBOL_ROW;
                let name = dat
                    .reference(table.0, row + 8)
                    .map(|id| dat.string(id))
                    .unwrap_or_default();
                symbols.push(PatchSymbol {
                    code_start: dat.read::<u32>(table.0, row, "PatchSymbol")?,
                    code_end: dat.read::<u32>(table.0, row + 4, "PatchSymbol")?,
                    name,
                });
            }
        }

        Ok(PatchRecord {
            name: name.to_string(),
            code,
            relocations,
            symbols,
        })
    }
}

const RELOCATION_ROW: usize = 12;
const SYMBOL_ROW: usize = 12;

dat_record!(PatchHeader, 0x18);

scalar_fields!(PatchHeader {
    code_size, set_code_size: u32 = 0x04;
    relocation_count, set_relocation_count: u32 = 0x0C;
    symbol_count, set_symbol_count: u32 = 0x14;
});

reference_fields!(PatchHeader {
    code, set_code: Buffer = 0x00;
    relocations, set_relocations: Buffer = 0x08;
    symbols, set_symbols: Buffer = 0x10;
});

/// Serializes patches into one archive, in the given order.
pub fn write_archive(name: &str, records: &[PatchRecord]) -> PatchResult<Vec<u8>> {
    let mut dat = DatFile::new(name);
    for record in records {
        record.validate()?;
        record.write_into(&mut dat)?;
    }
    Ok(dat.to_bytes())
}

pub fn read_archive(name: &str, bytes: &[u8]) -> PatchResult<Vec<PatchRecord>> {
    let dat = DatFile::parse(name, bytes)?;
    let mut out = Vec::with_capacity(dat.roots.len());
    for root in &dat.roots {
        let header = PatchHeader::wrap(&dat, root.node)?;
        out.push(PatchRecord::read_from(&dat, &root.name, header)?);
    }
    Ok(out)
}
