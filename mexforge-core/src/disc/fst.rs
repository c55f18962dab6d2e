//! File system table: 12-byte entries followed by a name table.
//!
//! Entry word 0 holds the directory flag in its top byte and the name
//! offset in the low 24 bits. Files then store their disc offset and
//! length; directories store the parent index and the index one past
//! their last descendant. Entry 0 is the root directory.

use std::collections::{BTreeMap, HashMap};

use byteorder::{BigEndian, ByteOrder};

use super::{DiscError, DiscResult};

pub const ENTRY_SIZE: usize = 12;
const MAX_NAME_OFFSET: usize = 1 << 24;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Entry {
    Dir { name: usize, parent: usize, next: usize },
    File { name: usize, path: String },
}

#[derive(Default)]
struct Tree {
    /// Keyed case-insensitively so listings match the disc's own order.
    children: BTreeMap<(String, String), Child>,
}

enum Child {
    File(String),
    Dir(Tree),
}

impl Tree {
    fn insert(&mut self, parts: &[&str], path: &str) {
        let Some((&name, rest)) = parts.split_first() else {
            return;
        };
        let key = (name.to_lowercase(), name.to_string());
        if rest.is_empty() {
            self.children.insert(key, Child::File(path.to_string()));
            return;
        }
        let child = self
            .children
            .entry(key)
            .or_insert_with(|| Child::Dir(Tree::default()));
        if let Child::Dir(tree) = child {
            tree.insert(rest, path);
        }
    }
}

/// A file system table laid out from a set of paths. Disc offsets are
/// supplied when it is serialized.
#[derive(Debug, Clone)]
pub struct Fst {
    entries: Vec<Entry>,
    names: Vec<u8>,
}

impl Fst {
    /// Paths are relative to the disc root (`audio/us/smash2.sem`).
    pub fn from_paths<S: AsRef<str>>(paths: &[S]) -> DiscResult<Fst> {
        let mut tree = Tree::default();
        for path in paths {
            let path = path.as_ref();
            let parts: Vec<&str> = path.split('/').collect();
            tree.insert(&parts, path);
        }

        let mut fst = Fst {
            entries: vec![Entry::Dir { name: 0, parent: 0, next: 0 }],
            names: Vec::new(),
        };
        fst.emit(&tree, 0)?;
        let total = fst.entries.len();
        fst.entries[0] = Entry::Dir { name: 0, parent: 0, next: total };
        Ok(fst)
    }

    fn emit(&mut self, tree: &Tree, parent: usize) -> DiscResult<()> {
        for ((_, name), child) in &tree.children {
            let name_offset = self.names.len();
            if name_offset >= MAX_NAME_OFFSET {
                return Err(DiscError::CorruptFst("name table is too large".to_string()));
            }
            self.names.extend_from_slice(name.as_bytes());
            self.names.push(0);
            match child {
                Child::File(path) => self.entries.push(Entry::File {
                    name: name_offset,
                    path: path.clone(),
                }),
                Child::Dir(sub) => {
                    let index = self.entries.len();
                    self.entries.push(Entry::Dir { name: name_offset, parent, next: 0 });
                    self.emit(sub, index)?;
                    let next = self.entries.len();
                    self.entries[index] = Entry::Dir { name: name_offset, parent, next };
                }
            }
        }
        Ok(())
    }

    /// Serialized size in bytes.
    pub fn len(&self) -> usize {
        self.entries.len() * ENTRY_SIZE + self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() == 1
    }

    /// File paths in table order.
    pub fn files(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().filter_map(|e| match e {
            Entry::File { path, .. } => Some(path.as_str()),
            Entry::Dir { .. } => None,
        })
    }

    /// Serializes the table. `locations` maps each file path to its disc
    /// offset and length.
    pub fn to_bytes(&self, locations: &HashMap<String, (u32, u32)>) -> DiscResult<Vec<u8>> {
        let mut out = vec![0u8; self.entries.len() * ENTRY_SIZE];
        for (i, entry) in self.entries.iter().enumerate() {
            let row = &mut out[i * ENTRY_SIZE..(i + 1) * ENTRY_SIZE];
            match entry {
                Entry::Dir { name, parent, next } => {
                    BigEndian::write_u32(&mut row[0..4], 0x0100_0000 | *name as u32);
                    BigEndian::write_u32(&mut row[4..8], *parent as u32);
                    BigEndian::write_u32(&mut row[8..12], *next as u32);
                }
                Entry::File { name, path } => {
                    let (offset, len) = locations
                        .get(path)
                        .copied()
                        .ok_or_else(|| DiscError::CorruptFst(format!("no disc location for {path}")))?;
                    BigEndian::write_u32(&mut row[0..4], *name as u32);
                    BigEndian::write_u32(&mut row[4..8], offset);
                    BigEndian::write_u32(&mut row[8..12], len);
                }
            }
        }
        out.extend_from_slice(&self.names);
        Ok(out)
    }
}

/// A file listed in a parsed table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstFile {
    pub path: String,
    pub offset: u32,
    pub len: u32,
}

fn name_at(names: &[u8], offset: usize) -> DiscResult<String> {
    let tail = names
        .get(offset..)
        .ok_or_else(|| DiscError::CorruptFst(format!("name offset 0x{offset:X} is out of range")))?;
    let end = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| DiscError::CorruptFst(format!("name at 0x{offset:X} is not terminated")))?;
    Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
}

pub fn parse(bytes: &[u8]) -> DiscResult<Vec<FstFile>> {
    if bytes.len() < ENTRY_SIZE {
        return Err(DiscError::CorruptFst("table is shorter than its root entry".to_string()));
    }
    let count = BigEndian::read_u32(&bytes[8..12]) as usize;
    let names_start = count
        .checked_mul(ENTRY_SIZE)
        .filter(|&end| end <= bytes.len() && count > 0)
        .ok_or_else(|| DiscError::CorruptFst(format!("{count} entries do not fit in {} bytes", bytes.len())))?;
    let names = &bytes[names_start..];

    let mut files = Vec::new();
    // Open directories as (index past last descendant, path prefix).
    let mut stack: Vec<(usize, String)> = vec![(count, String::new())];
    for i in 1..count {
        while stack.last().is_some_and(|(end, _)| *end <= i) {
            stack.pop();
        }
        let prefix = stack.last().map(|(_, p)| p.clone()).unwrap_or_default();
        let row = &bytes[i * ENTRY_SIZE..(i + 1) * ENTRY_SIZE];
        let word = BigEndian::read_u32(&row[0..4]);
        let name = name_at(names, (word & 0x00FF_FFFF) as usize)?;
        if word >> 24 != 0 {
            let next = BigEndian::read_u32(&row[8..12]) as usize;
            if next <= i || next > count {
                return Err(DiscError::CorruptFst(format!("directory {name} ends at invalid entry {next}")));
            }
            stack.push((next, format!("{prefix}{name}/")));
        } else {
            files.push(FstFile {
                path: format!("{prefix}{name}"),
                offset: BigEndian::read_u32(&row[4..8]),
                len: BigEndian::read_u32(&row[8..12]),
            });
        }
    }
    Ok(files)
}
