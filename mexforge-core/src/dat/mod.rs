//! DAT archives: the engine's relocatable object graph format.
//!
//! A DAT file is a data block of structs that point at each other through
//! offsets listed in a relocation table, plus named roots. Parsing splits
//! the data block into nodes held in an arena; pointers become links
//! between node IDs, so shared and cyclic structures need no special
//! treatment. Writing lays the reachable nodes out again and rebuilds
//! the relocation table. Parsed nodes keep their source order, and nodes
//! that were contiguous in the source stay contiguous while their size is
//! unchanged, so arrays split by interior pointers survive a rewrite.

pub mod fobj;
pub mod kinds;
pub mod patch;
pub mod record;
pub mod texture;

use std::collections::{BTreeMap, BTreeSet};

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

pub use record::{ChainRecord, DatRecord, Scalar, TreeRecord};

pub const HEADER_SIZE: usize = 0x20;

#[derive(Debug, Error)]
pub enum DatError {
    #[error("{archive}: {record} at 0x{offset:X} is truncated (needs {needed} bytes, node has {available})")]
    OutOfBounds {
        archive: String,
        record: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("{archive}: {message} (offset 0x{offset:X})")]
    Corrupt {
        archive: String,
        message: String,
        offset: usize,
    },
    #[error("{archive}: root '{name}' not found")]
    MissingRoot { archive: String, name: String },
    #[error("{archive}: {record} field 0x{offset:X} has no reference")]
    MissingReference {
        archive: String,
        record: &'static str,
        offset: usize,
    },
}

impl DatError {
    fn corrupt(message: impl Into<String>, offset: usize) -> Self {
        DatError::Corrupt {
            archive: String::new(),
            message: message.into(),
            offset,
        }
    }

    /// Fills in the archive name if it is not known yet.
    pub fn in_archive(mut self, name: &str) -> Self {
        let slot = match &mut self {
            DatError::OutOfBounds { archive, .. }
            | DatError::Corrupt { archive, .. }
            | DatError::MissingRoot { archive, .. }
            | DatError::MissingReference { archive, .. } => archive,
        };
        if slot.is_empty() {
            *slot = name.to_string();
        }
        self
    }
}

pub type DatResult<T> = std::result::Result<T, DatError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Default)]
pub struct DatNode {
    pub data: Vec<u8>,
    refs: BTreeMap<usize, NodeId>,
    /// Pixel and palette buffers must start on a 32-byte boundary.
    pub align_buffer: bool,
    /// Offset and length in the parsed data block.
    source: Option<(usize, usize)>,
}

impl DatNode {
    pub fn references(&self) -> impl Iterator<Item = (usize, NodeId)> + '_ {
        self.refs.iter().map(|(&off, &id)| (off, id))
    }

    /// Length without trailing zero bytes that carry no reference.
    pub fn trimmed_len(&self) -> usize {
        let last_ref_end = self.refs.keys().next_back().map_or(0, |&off| off + 4);
        let last_data = self
            .data
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |pos| pos + 1);
        last_ref_end.max(last_data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatRoot {
    pub name: String,
    pub node: NodeId,
}

#[derive(Debug, Clone, Default)]
pub struct DatFile {
    pub name: String,
    nodes: Vec<DatNode>,
    pub roots: Vec<DatRoot>,
    pub references: Vec<DatRoot>,
}

fn be_u32(bytes: &[u8], offset: usize) -> DatResult<u32> {
    bytes
        .get(offset..offset + 4)
        .map(BigEndian::read_u32)
        .ok_or_else(|| DatError::corrupt("read past end of file", offset))
}

fn read_c_string(bytes: &[u8], offset: usize) -> DatResult<String> {
    let tail = bytes
        .get(offset..)
        .ok_or_else(|| DatError::corrupt("string offset past end of file", offset))?;
    let end = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| DatError::corrupt("unterminated string", offset))?;
    Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
}

fn align(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) / alignment * alignment
}

impl DatFile {
    pub fn new(name: impl Into<String>) -> Self {
        DatFile {
            name: name.into(),
            ..DatFile::default()
        }
    }

    pub fn parse(name: &str, bytes: &[u8]) -> DatResult<DatFile> {
        Self::parse_inner(name, bytes).map_err(|e| e.in_archive(name))
    }

    fn parse_inner(name: &str, bytes: &[u8]) -> DatResult<DatFile> {
        if bytes.len() < HEADER_SIZE {
            return Err(DatError::corrupt("header is truncated", 0));
        }
        let data_size = be_u32(bytes, 0x04)? as usize;
        let reloc_count = be_u32(bytes, 0x08)? as usize;
        let root_count = be_u32(bytes, 0x0C)? as usize;
        let ref_count = be_u32(bytes, 0x10)? as usize;

        let data_end = HEADER_SIZE
            .checked_add(data_size)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| DatError::corrupt("data block extends past end of file", 0x04))?;
        let reloc_end = reloc_count
            .checked_mul(4)
            .and_then(|len| len.checked_add(data_end))
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| DatError::corrupt("relocation table extends past end of file", 0x08))?;
        let roots_end = root_count
            .checked_mul(8)
            .and_then(|len| len.checked_add(reloc_end))
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| DatError::corrupt("root table extends past end of file", 0x0C))?;
        let refs_end = ref_count
            .checked_mul(8)
            .and_then(|len| len.checked_add(roots_end))
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| DatError::corrupt("reference table extends past end of file", 0x10))?;
        let strings = &bytes[refs_end..];
        let data = &bytes[HEADER_SIZE..data_end];

        let mut starts = BTreeSet::new();
        if data_size > 0 {
            // Bytes before the first pointer target form a node too.
            starts.insert(0);
        }
        let mut pointers = Vec::with_capacity(reloc_count);
        for i in 0..reloc_count {
            let field = be_u32(bytes, data_end + i * 4)? as usize;
            if field + 4 > data_size {
                return Err(DatError::corrupt(
                    "relocation points outside the data block",
                    HEADER_SIZE + field,
                ));
            }
            let target = BigEndian::read_u32(&data[field..field + 4]) as usize;
            if target >= data_size {
                return Err(DatError::corrupt(
                    "pointer target outside the data block",
                    HEADER_SIZE + field,
                ));
            }
            starts.insert(target);
            pointers.push((field, target));
        }

        let mut read_table = |begin: usize, count: usize| -> DatResult<Vec<(usize, String)>> {
            let mut out = Vec::with_capacity(count);
            for i in 0..count {
                let offset = be_u32(bytes, begin + i * 8)? as usize;
                let string_offset = be_u32(bytes, begin + i * 8 + 4)? as usize;
                if offset >= data_size {
                    return Err(DatError::corrupt("root offset outside the data block", begin + i * 8));
                }
                starts.insert(offset);
                out.push((offset, read_c_string(strings, string_offset)?));
            }
            Ok(out)
        };
        let root_entries = read_table(reloc_end, root_count)?;
        let ref_entries = read_table(roots_end, ref_count)?;

        let starts: Vec<usize> = starts.into_iter().collect();
        let mut dat = DatFile::new(name);
        for (i, &start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).copied().unwrap_or(data_size);
            dat.nodes.push(DatNode {
                data: data[start..end].to_vec(),
                refs: BTreeMap::new(),
                // Buffers that were 32-byte aligned stay aligned.
                align_buffer: start % 32 == 0 && end - start >= 32 && (end - start) % 32 == 0,
                source: Some((start, end - start)),
            });
        }
        let lookup = |offset: usize| -> NodeId {
            // Every offset passed here was inserted into `starts`.
            NodeId(starts.binary_search(&offset).unwrap_or(0) as u32)
        };

        for (field, target) in pointers {
            // `starts` holds offset 0, so every field has an owner.
            let owner = match starts.binary_search(&field) {
                Ok(i) => i,
                Err(i) => i.saturating_sub(1),
            };
            let local = field - starts[owner];
            let node = &mut dat.nodes[owner];
            if local + 4 > node.data.len() {
                return Err(DatError::corrupt(
                    "pointer field straddles two structs",
                    HEADER_SIZE + field,
                ));
            }
            node.data[local..local + 4].fill(0);
            node.refs.insert(local, lookup(target));
        }

        dat.roots = root_entries
            .into_iter()
            .map(|(offset, name)| DatRoot { name, node: lookup(offset) })
            .collect();
        dat.references = ref_entries
            .into_iter()
            .map(|(offset, name)| DatRoot { name, node: lookup(offset) })
            .collect();
        Ok(dat)
    }

    /// Nodes reachable from the roots and references, each once, in
    /// depth-first order.
    pub fn reachable(&self) -> Vec<NodeId> {
        let mut visited = vec![false; self.nodes.len()];
        let mut order = Vec::new();
        let mut stack: Vec<NodeId> = Vec::new();

        for root in self.roots.iter().chain(self.references.iter()) {
            stack.push(root.node);
            while let Some(id) = stack.pop() {
                if visited[id.index()] {
                    continue;
                }
                visited[id.index()] = true;
                order.push(id);
                let children: Vec<NodeId> = self.nodes[id.index()].refs.values().copied().collect();
                for child in children.into_iter().rev() {
                    if !visited[child.index()] {
                        stack.push(child);
                    }
                }
            }
        }
        order
    }

    /// Reachable nodes in write order: parsed nodes by source offset, then
    /// new nodes in reachable order.
    fn layout_order(&self) -> Vec<NodeId> {
        let (mut parsed, fresh): (Vec<NodeId>, Vec<NodeId>) = self
            .reachable()
            .into_iter()
            .partition(|id| self.nodes[id.index()].source.is_some());
        parsed.sort_by_key(|id| self.nodes[id.index()].source);
        parsed.extend(fresh);
        parsed
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let order = self.layout_order();
        let mut offsets = vec![0usize; self.nodes.len()];
        let mut data = Vec::new();
        let mut source_end = None;

        for &id in &order {
            let node = &self.nodes[id.index()];
            let glued = matches!((node.source, source_end), (Some((start, _)), Some(end)) if start == end);
            let alignment = match (node.align_buffer, glued) {
                (true, _) => 32,
                (false, true) => 1,
                (false, false) => 4,
            };
            data.resize(align(data.len(), alignment), 0);
            offsets[id.index()] = data.len();
            data.extend_from_slice(&node.data);
            if node.data.is_empty() {
                // Empty nodes still need an address of their own.
                data.extend_from_slice(&[0; 4]);
            }
            source_end = node
                .source
                .filter(|&(_, len)| len == node.data.len())
                .map(|(start, len)| start + len);
        }
        data.resize(align(data.len(), 4), 0);

        let mut relocs = Vec::new();
        for &id in &order {
            let base = offsets[id.index()];
            for (&field, &target) in &self.nodes[id.index()].refs {
                let pos = base + field;
                BigEndian::write_u32(&mut data[pos..pos + 4], offsets[target.index()] as u32);
                relocs.push(pos as u32);
            }
        }
        relocs.sort_unstable();

        let mut strings = Vec::new();
        let mut table = Vec::new();
        for entry in self.roots.iter().chain(self.references.iter()) {
            table.push((offsets[entry.node.index()] as u32, strings.len() as u32));
            strings.extend_from_slice(entry.name.as_bytes());
            strings.push(0);
        }

        let total = HEADER_SIZE + data.len() + relocs.len() * 4 + table.len() * 8 + strings.len();
        let mut out = Vec::with_capacity(total);
        let mut header = [0u8; HEADER_SIZE];
        BigEndian::write_u32(&mut header[0x00..], total as u32);
        BigEndian::write_u32(&mut header[0x04..], data.len() as u32);
        BigEndian::write_u32(&mut header[0x08..], relocs.len() as u32);
        BigEndian::write_u32(&mut header[0x0C..], self.roots.len() as u32);
        BigEndian::write_u32(&mut header[0x10..], self.references.len() as u32);
        out.extend_from_slice(&header);
        out.extend_from_slice(&data);
        for r in relocs {
            out.extend_from_slice(&r.to_be_bytes());
        }
        for (offset, string_offset) in table {
            out.extend_from_slice(&offset.to_be_bytes());
            out.extend_from_slice(&string_offset.to_be_bytes());
        }
        out.extend_from_slice(&strings);
        out
    }

    pub fn node(&self, id: NodeId) -> &DatNode {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut DatNode {
        &mut self.nodes[id.index()]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Allocates a zero-filled node.
    pub fn alloc(&mut self, len: usize) -> NodeId {
        self.alloc_bytes(vec![0; len])
    }

    pub fn alloc_bytes(&mut self, data: Vec<u8>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(DatNode {
            data,
            ..DatNode::default()
        });
        id
    }

    /// Allocates a 32-byte aligned pixel or palette buffer.
    pub fn alloc_buffer(&mut self, data: Vec<u8>) -> NodeId {
        let id = self.alloc_bytes(data);
        self.nodes[id.index()].align_buffer = true;
        id
    }

    pub fn alloc_string(&mut self, value: &str) -> NodeId {
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        self.alloc_bytes(bytes)
    }

    /// Reads a NUL-terminated string stored in its own node.
    pub fn string(&self, id: NodeId) -> String {
        let data = &self.nodes[id.index()].data;
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        String::from_utf8_lossy(&data[..end]).into_owned()
    }

    /// Copies a node's bytes and references into a new node. Children are
    /// shared, not copied.
    pub fn clone_node(&mut self, id: NodeId) -> NodeId {
        let mut copy = self.nodes[id.index()].clone();
        copy.source = None;
        let new_id = NodeId(self.nodes.len() as u32);
        self.nodes.push(copy);
        new_id
    }

    pub fn read<T: Scalar>(&self, id: NodeId, offset: usize, record: &'static str) -> DatResult<T> {
        let data = &self.nodes[id.index()].data;
        data.get(offset..offset + T::WIDTH)
            .map(T::read_be)
            .ok_or(DatError::OutOfBounds {
                archive: self.name.clone(),
                record,
                offset,
                needed: offset + T::WIDTH,
                available: data.len(),
            })
    }

    /// Writes a scalar, growing the node if the field lies past its end.
    pub fn write<T: Scalar>(&mut self, id: NodeId, offset: usize, value: T, _record: &'static str) -> DatResult<()> {
        let node = &mut self.nodes[id.index()];
        if node.data.len() < offset + T::WIDTH {
            node.data.resize(offset + T::WIDTH, 0);
        }
        value.write_be(&mut node.data[offset..offset + T::WIDTH]);
        Ok(())
    }

    pub fn reference(&self, id: NodeId, offset: usize) -> Option<NodeId> {
        self.nodes[id.index()].refs.get(&offset).copied()
    }

    pub fn set_reference(&mut self, id: NodeId, offset: usize, target: Option<NodeId>) {
        let node = &mut self.nodes[id.index()];
        if node.data.len() < offset + 4 {
            node.data.resize(offset + 4, 0);
        }
        node.data[offset..offset + 4].fill(0);
        match target {
            Some(target) => {
                node.refs.insert(offset, target);
            }
            None => {
                node.refs.remove(&offset);
            }
        }
    }

    /// Reads `count` consecutive reference slots starting at `offset`.
    pub fn reference_array(&self, id: NodeId, offset: usize, count: usize) -> Vec<Option<NodeId>> {
        (0..count).map(|i| self.reference(id, offset + i * 4)).collect()
    }

    /// Allocates a node holding one reference slot per item.
    pub fn alloc_reference_array(&mut self, items: &[Option<NodeId>]) -> NodeId {
        let id = self.alloc(items.len().max(1) * 4);
        for (i, item) in items.iter().enumerate() {
            self.set_reference(id, i * 4, *item);
        }
        id
    }

    /// Reads a reference list terminated by a null slot.
    pub fn null_terminated(&self, id: NodeId) -> Vec<NodeId> {
        let len = self.nodes[id.index()].data.len();
        let mut out = Vec::new();
        let mut offset = 0;
        while offset + 4 <= len {
            match self.reference(id, offset) {
                Some(target) => out.push(target),
                None => break,
            }
            offset += 4;
        }
        out
    }

    pub fn alloc_null_terminated(&mut self, items: &[NodeId]) -> NodeId {
        let id = self.alloc((items.len() + 1) * 4);
        for (i, &item) in items.iter().enumerate() {
            self.set_reference(id, i * 4, Some(item));
        }
        id
    }

    pub fn root(&self, name: &str) -> Option<NodeId> {
        self.roots.iter().find(|r| r.name == name).map(|r| r.node)
    }

    pub fn require_root(&self, name: &str) -> DatResult<NodeId> {
        self.root(name).ok_or_else(|| DatError::MissingRoot {
            archive: self.name.clone(),
            name: name.to_string(),
        })
    }

    /// Points an existing root at `node`, or appends a new root.
    pub fn set_root(&mut self, name: &str, node: NodeId) {
        match self.roots.iter_mut().find(|r| r.name == name) {
            Some(root) => root.node = node,
            None => self.roots.push(DatRoot {
                name: name.to_string(),
                node,
            }),
        }
    }

    pub fn missing_reference(&self, record: &'static str, offset: usize) -> DatError {
        DatError::MissingReference {
            archive: self.name.clone(),
            record,
            offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two roots sharing a child, and a node pointing at itself.
    fn sample() -> DatFile {
        let mut dat = DatFile::new("sample.dat");
        let shared = dat.alloc_bytes(vec![0xAA; 8]);
        let a = dat.alloc(8);
        let b = dat.alloc(8);
        dat.set_reference(a, 0, Some(shared));
        dat.set_reference(b, 4, Some(shared));
        dat.set_reference(b, 0, Some(b));
        dat.write::<u32>(a, 4, 0xDEADBEEF, "test").unwrap();
        dat.set_root("rootA", a);
        dat.set_root("rootB", b);
        dat
    }

    #[test]
    fn write_then_parse_keeps_graph_shape() {
        let bytes = sample().to_bytes();
        let dat = DatFile::parse("sample.dat", &bytes).unwrap();

        let a = dat.require_root("rootA").unwrap();
        let b = dat.require_root("rootB").unwrap();
        assert_eq!(dat.read::<u32>(a, 4, "test").unwrap(), 0xDEADBEEF);
        assert_eq!(dat.reference(a, 0), dat.reference(b, 4));
        assert_eq!(dat.reference(b, 0), Some(b));
        let shared = dat.reference(a, 0).unwrap();
        assert_eq!(dat.node(shared).data, vec![0xAA; 8]);
        assert_eq!(dat.reachable().len(), 3);

        // Writing again is stable.
        assert_eq!(dat.to_bytes(), bytes);
    }

    #[test]
    fn header_counts_match_layout() {
        let bytes = sample().to_bytes();
        assert_eq!(BigEndian::read_u32(&bytes[0..4]) as usize, bytes.len());
        assert_eq!(BigEndian::read_u32(&bytes[4..8]), 24);
        assert_eq!(BigEndian::read_u32(&bytes[8..12]), 3);
        assert_eq!(BigEndian::read_u32(&bytes[12..16]), 2);
    }

    #[test]
    fn truncated_files_are_rejected_with_archive_name() {
        let bytes = sample().to_bytes();
        let err = DatFile::parse("PlCo.dat", &bytes[..40]).unwrap_err();
        assert!(err.to_string().starts_with("PlCo.dat:"), "{err}");
        assert!(matches!(err, DatError::Corrupt { .. }));
    }

    #[test]
    fn bad_pointer_targets_are_corrupt() {
        let mut bytes = sample().to_bytes();
        // First relocation entry sits right after the data block.
        let data_size = BigEndian::read_u32(&bytes[4..8]) as usize;
        let field = BigEndian::read_u32(&bytes[HEADER_SIZE + data_size..]) as usize;
        BigEndian::write_u32(&mut bytes[HEADER_SIZE + field..], 0x1000);
        assert!(matches!(
            DatFile::parse("x.dat", &bytes),
            Err(DatError::Corrupt { .. })
        ));
    }

    #[test]
    fn reads_past_node_end_are_out_of_bounds() {
        let dat = sample();
        let a = dat.root("rootA").unwrap();
        let err = dat.read::<u32>(a, 8, "Joint").unwrap_err();
        assert!(matches!(err, DatError::OutOfBounds { record: "Joint", offset: 8, .. }));
    }

    #[test]
    fn reference_lists() {
        let mut dat = DatFile::new("lists.dat");
        let items: Vec<NodeId> = (0..3).map(|i| dat.alloc_bytes(vec![i; 4])).collect();
        let list = dat.alloc_null_terminated(&items);
        assert_eq!(dat.null_terminated(list), items);

        let array = dat.alloc_reference_array(&[Some(items[0]), None, Some(items[2])]);
        assert_eq!(
            dat.reference_array(array, 0, 3),
            vec![Some(items[0]), None, Some(items[2])]
        );
    }

    #[test]
    fn unreachable_nodes_are_dropped_on_write() {
        let mut dat = sample();
        dat.alloc(64);
        let reparsed = DatFile::parse("sample.dat", &dat.to_bytes()).unwrap();
        assert_eq!(reparsed.node_count(), 3);
    }

    #[test]
    fn trimmed_len_ignores_trailing_padding() {
        let mut dat = DatFile::new("t.dat");
        let id = dat.alloc_bytes(vec![1, 2, 0, 0, 0, 0, 0, 0]);
        assert_eq!(dat.node(id).trimmed_len(), 2);
        dat.set_reference(id, 4, Some(id));
        assert_eq!(dat.node(id).trimmed_len(), 8);
    }

    /// Builds an archive by hand from a data block, relocation offsets and
    /// roots.
    fn raw(data: &[u8], relocs: &[u32], roots: &[(u32, &str)]) -> Vec<u8> {
        let mut strings = Vec::new();
        let mut table = Vec::new();
        for &(offset, name) in roots {
            table.extend_from_slice(&offset.to_be_bytes());
            table.extend_from_slice(&(strings.len() as u32).to_be_bytes());
            strings.extend_from_slice(name.as_bytes());
            strings.push(0);
        }
        let total = HEADER_SIZE + data.len() + relocs.len() * 4 + table.len() + strings.len();
        let mut out = Vec::new();
        for value in [total, data.len(), relocs.len(), roots.len(), 0, 0, 0, 0] {
            out.extend_from_slice(&(value as u32).to_be_bytes());
        }
        out.extend_from_slice(data);
        for reloc in relocs {
            out.extend_from_slice(&reloc.to_be_bytes());
        }
        out.extend_from_slice(&table);
        out.extend_from_slice(&strings);
        out
    }

    #[test]
    fn bytes_before_the_first_target_become_a_node() {
        // A pointer at 0 to the table at 8, followed by unreferenced bytes.
        let mut data = vec![0, 0, 0, 8, 0x11, 0x11, 0x11, 0x11];
        data.extend_from_slice(&[0xAA; 8]);
        let dat = DatFile::parse("p.dat", &raw(&data, &[0], &[(8, "table")])).unwrap();

        assert_eq!(dat.node_count(), 2);
        let prefix = NodeId(0);
        assert_eq!(dat.node(prefix).data, vec![0, 0, 0, 0, 0x11, 0x11, 0x11, 0x11]);
        assert_eq!(dat.reference(prefix, 0), Some(dat.require_root("table").unwrap()));
    }

    #[test]
    fn interior_pointers_keep_arrays_contiguous() {
        // A u16 array at 0 split at its last element by the holder at 8,
        // which points at that element first and at the array head second.
        let mut data = Vec::new();
        for value in [1u16, 2, 3, 4] {
            data.extend_from_slice(&value.to_be_bytes());
        }
        data.extend_from_slice(&[0, 0, 0, 6, 0, 0, 0, 0]);
        let bytes = raw(&data, &[8, 12], &[(8, "holder"), (0, "array")]);

        let dat = DatFile::parse("a.dat", &bytes).unwrap();
        assert_eq!(dat.node_count(), 3);
        let out = dat.to_bytes();
        assert_eq!(&out[HEADER_SIZE..HEADER_SIZE + data.len()], &data[..]);

        let reparsed = DatFile::parse("a.dat", &out).unwrap();
        let holder = reparsed.require_root("holder").unwrap();
        let tail = reparsed.reference(holder, 0).unwrap();
        assert_eq!(reparsed.read::<u16>(tail, 0, "test").unwrap(), 4);
        let head = reparsed.require_root("array").unwrap();
        assert_eq!(reparsed.reference(holder, 4), Some(head));
        assert_eq!(reparsed.read::<u16>(head, 4, "test").unwrap(), 3);
    }

    #[test]
    fn resized_parsed_nodes_are_realigned() {
        let mut dat = DatFile::parse("sample.dat", &sample().to_bytes()).unwrap();
        let a = dat.require_root("rootA").unwrap();
        dat.write::<u8>(a, 9, 7, "test").unwrap();
        let reparsed = DatFile::parse("sample.dat", &dat.to_bytes()).unwrap();
        let a = reparsed.require_root("rootA").unwrap();
        assert_eq!(reparsed.read::<u8>(a, 9, "test").unwrap(), 7);
        assert_eq!(reparsed.read::<u32>(a, 4, "test").unwrap(), 0xDEADBEEF);
        let b = reparsed.require_root("rootB").unwrap();
        assert_eq!(reparsed.reference(b, 0), Some(b));
    }
}
