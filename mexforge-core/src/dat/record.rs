//! Typed handles over DAT nodes.
//!
//! A record is a `NodeId` wrapper with accessors at fixed offsets. Field
//! accessors are generated by the macros below so every offset lives in
//! one declaration per record kind.

use std::collections::HashSet;

use byteorder::{BigEndian, ByteOrder};

use super::{DatFile, DatResult, NodeId};

/// Fixed-width big-endian field value.
pub trait Scalar: Copy {
    const WIDTH: usize;
    fn read_be(bytes: &[u8]) -> Self;
    fn write_be(self, bytes: &mut [u8]);
}

impl Scalar for u8 {
    const WIDTH: usize = 1;
    fn read_be(bytes: &[u8]) -> Self {
        bytes[0]
    }
    fn write_be(self, bytes: &mut [u8]) {
        bytes[0] = self;
    }
}

impl Scalar for i8 {
    const WIDTH: usize = 1;
    fn read_be(bytes: &[u8]) -> Self {
        bytes[0] as i8
    }
    fn write_be(self, bytes: &mut [u8]) {
        bytes[0] = self as u8;
    }
}

macro_rules! impl_scalar {
    ($($ty:ty: $width:expr, $read:ident, $write:ident;)*) => {
        $(
            impl Scalar for $ty {
                const WIDTH: usize = $width;
                fn read_be(bytes: &[u8]) -> Self {
                    BigEndian::$read(bytes)
                }
                fn write_be(self, bytes: &mut [u8]) {
                    BigEndian::$write(bytes, self)
                }
            }
        )*
    };
}

impl_scalar! {
    u16: 2, read_u16, write_u16;
    i16: 2, read_i16, write_i16;
    u32: 4, read_u32, write_u32;
    i32: 4, read_i32, write_i32;
    f32: 4, read_f32, write_f32;
}

pub trait DatRecord: Copy + Sized {
    const NAME: &'static str;
    /// Minimum node size for a freshly allocated record.
    const SIZE: usize;

    fn from_node(node: NodeId) -> Self;
    fn node(self) -> NodeId;

    fn create(dat: &mut DatFile) -> Self {
        Self::from_node(dat.alloc(Self::SIZE))
    }

    /// Wraps a node and checks it is large enough for this record kind.
    fn wrap(dat: &DatFile, node: NodeId) -> DatResult<Self> {
        let available = dat.node(node).data.len();
        if available < Self::SIZE {
            return Err(super::DatError::OutOfBounds {
                archive: dat.name.clone(),
                record: Self::NAME,
                offset: 0,
                needed: Self::SIZE,
                available,
            });
        }
        Ok(Self::from_node(node))
    }
}

/// Records linked into sibling lists through a `Next` reference.
pub trait ChainRecord: DatRecord {
    const NEXT: usize;

    fn next(self, dat: &DatFile) -> Option<Self> {
        dat.reference(self.node(), Self::NEXT).map(Self::from_node)
    }

    fn set_next(self, dat: &mut DatFile, next: Option<Self>) {
        dat.set_reference(self.node(), Self::NEXT, next.map(DatRecord::node));
    }

    /// This record followed by every `Next` sibling. Stops on cycles.
    fn siblings(self, dat: &DatFile) -> Vec<Self> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut cursor = Some(self);
        while let Some(record) = cursor {
            if !seen.insert(record.node()) {
                break;
            }
            out.push(record);
            cursor = record.next(dat);
        }
        out
    }

    /// Relinks `records` into one chain, in order.
    fn link_chain(dat: &mut DatFile, records: &[Self]) {
        for pair in records.windows(2) {
            pair[0].set_next(dat, Some(pair[1]));
        }
        if let Some(last) = records.last() {
            last.set_next(dat, None);
        }
    }
}

/// Chain records that also own a `Child` list.
pub trait TreeRecord: ChainRecord {
    const CHILD: usize;

    fn child(self, dat: &DatFile) -> Option<Self> {
        dat.reference(self.node(), Self::CHILD).map(Self::from_node)
    }

    fn set_child(self, dat: &mut DatFile, child: Option<Self>) {
        dat.set_reference(self.node(), Self::CHILD, child.map(DatRecord::node));
    }

    fn children(self, dat: &DatFile) -> Vec<Self> {
        self.child(dat).map(|c| c.siblings(dat)).unwrap_or_default()
    }

    /// Depth-first pre-order walk of this record and its child subtree.
    /// Siblings of `self` are not included.
    fn descendants(self, dat: &DatFile) -> Vec<Self> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(record) = stack.pop() {
            if !seen.insert(record.node()) {
                continue;
            }
            out.push(record);
            let mut children = record.children(dat);
            children.reverse();
            stack.extend(children);
        }
        out
    }
}

/// Declares a record handle type.
macro_rules! dat_record {
    ($(#[$meta:meta])* $name:ident, $size:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub $crate::dat::NodeId);

        impl $crate::dat::DatRecord for $name {
            const NAME: &'static str = stringify!($name);
            const SIZE: usize = $size;

            fn from_node(node: $crate::dat::NodeId) -> Self {
                $name(node)
            }

            fn node(self) -> $crate::dat::NodeId {
                self.0
            }
        }
    };
}

/// Generates getter/setter pairs for scalar fields.
macro_rules! scalar_fields {
    ($name:ident { $($get:ident, $set:ident: $ty:ty = $offset:expr;)* }) => {
        impl $name {
            $(
                pub fn $get(self, dat: &$crate::dat::DatFile) -> $crate::dat::DatResult<$ty> {
                    dat.read::<$ty>(self.0, $offset, <Self as $crate::dat::DatRecord>::NAME)
                }

                pub fn $set(self, dat: &mut $crate::dat::DatFile, value: $ty) -> $crate::dat::DatResult<()> {
                    dat.write::<$ty>(self.0, $offset, value, <Self as $crate::dat::DatRecord>::NAME)
                }
            )*
        }
    };
}

/// Generates getter/setter pairs for reference fields.
macro_rules! reference_fields {
    ($name:ident { $($get:ident, $set:ident: $target:ty = $offset:expr;)* }) => {
        impl $name {
            $(
                pub fn $get(self, dat: &$crate::dat::DatFile) -> Option<$target> {
                    dat.reference(self.0, $offset)
                        .map(<$target as $crate::dat::DatRecord>::from_node)
                }

                pub fn $set(self, dat: &mut $crate::dat::DatFile, value: Option<$target>) {
                    dat.set_reference(
                        self.0,
                        $offset,
                        value.map(<$target as $crate::dat::DatRecord>::node),
                    )
                }
            )*
        }
    };
}

pub(crate) use {dat_record, reference_fields, scalar_fields};

dat_record!(
    /// Untyped node: pixel buffers, key streams, strings.
    Buffer,
    0
);

impl Buffer {
    pub fn bytes(self, dat: &DatFile) -> &[u8] {
        &dat.node(self.0).data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    dat_record!(TestNode, 0x0C);
    scalar_fields!(TestNode {
        value, set_value: u16 = 0x08;
        weight, set_weight: f32 = 0x04;
    });

    impl ChainRecord for TestNode {
        const NEXT: usize = 0x00;
    }

    impl TreeRecord for TestNode {
        const CHILD: usize = 0x04;
    }

    #[test]
    fn scalar_fields_are_big_endian() {
        let mut dat = DatFile::new("t.dat");
        let node = TestNode::create(&mut dat);
        node.set_value(&mut dat, 0x1234).unwrap();
        node.set_weight(&mut dat, 1.5).unwrap();
        assert_eq!(&dat.node(node.0).data[8..10], &[0x12, 0x34]);
        assert_eq!(node.weight(&dat).unwrap(), 1.5);
    }

    #[test]
    fn wrap_rejects_undersized_nodes() {
        let mut dat = DatFile::new("t.dat");
        let small = dat.alloc(4);
        let err = TestNode::wrap(&dat, small).unwrap_err();
        assert!(err.to_string().contains("TestNode"), "{err}");
    }

    #[test]
    fn tree_walks_survive_cycles() {
        let mut dat = DatFile::new("t.dat");
        let nodes: Vec<TestNode> = (0..4).map(|_| TestNode::create(&mut dat)).collect();
        // 0 -> child 1 -> next 2; 2 -> child 3; 3 loops back to 0 as a sibling.
        nodes[0].set_child(&mut dat, Some(nodes[1]));
        nodes[1].set_next(&mut dat, Some(nodes[2]));
        nodes[2].set_child(&mut dat, Some(nodes[3]));
        nodes[3].set_next(&mut dat, Some(nodes[0]));

        assert_eq!(nodes[1].siblings(&dat), vec![nodes[1], nodes[2]]);
        assert_eq!(nodes[0].descendants(&dat), nodes);
        assert_eq!(nodes[3].siblings(&dat), vec![nodes[3], nodes[0]]);
    }

    #[test]
    fn link_chain_terminates_last_record() {
        let mut dat = DatFile::new("t.dat");
        let nodes: Vec<TestNode> = (0..3).map(|_| TestNode::create(&mut dat)).collect();
        nodes[2].set_next(&mut dat, Some(nodes[0]));
        TestNode::link_chain(&mut dat, &nodes);
        assert_eq!(nodes[0].siblings(&dat), nodes);
    }
}
