//! GameCube disc images: assembling the store into a GCM image and
//! extracting an image back into a store.

mod assemble;
mod extract;
pub mod fst;
mod table;

use std::io;

use thiserror::Error;

use crate::store::StoreError;

pub use assemble::{build_disc, plan_layout, DiscLayout, Placement};
pub use extract::{extract_disc, Extracted};
pub use table::{AddressTable, Slot};

pub const BOOT_PATH: &str = "sys/boot.bin";
pub const BI2_PATH: &str = "sys/bi2.bin";
pub const APPLOADER_PATH: &str = "sys/apploader.img";
pub const DOL_PATH: &str = "sys/main.dol";

pub const BOOT_SIZE: u64 = 0x440;
pub const BI2_OFFSET: u64 = 0x440;
pub const BI2_SIZE: u64 = 0x2000;
pub const APPLOADER_OFFSET: u64 = 0x2440;

/// Boot block fields patched with the layout.
pub const BOOT_DOL_OFFSET: usize = 0x420;
pub const BOOT_FST_OFFSET: usize = 0x424;
pub const BOOT_FST_SIZE: usize = 0x428;
pub const BOOT_FST_MAX_SIZE: usize = 0x42C;
pub const BOOT_GAME_NAME: usize = 0x20;
pub const GAME_ID_LEN: usize = 6;
pub const GAME_NAME_LEN: usize = 0x3E0;

/// Capacity of a single layer GameCube disc.
pub const DISC_CAPACITY: u64 = 0x5705_8000;

#[derive(Debug, Error)]
pub enum DiscError {
    #[error("{path} is {size} bytes, larger than its {slot}-byte slot in the address table")]
    SlotOverflow { path: String, size: u64, slot: u64 },
    #[error("slot for {path} at 0x{offset:X} overlaps the system area ending at 0x{system_end:X}")]
    SlotInSystemArea {
        path: String,
        offset: u64,
        system_end: u64,
    },
    #[error("slots for {first} and {second} overlap")]
    SlotOverlap { first: String, second: String },
    #[error("address table lists {0} twice")]
    DuplicateSlot(String),
    #[error("system file {0} is missing")]
    MissingSystemFile(String),
    #[error("{path} must be {expected} bytes, found {actual}")]
    BadSystemFile {
        path: String,
        expected: u64,
        actual: u64,
    },
    #[error("image needs {0} bytes, more than a disc holds")]
    TooLarge(u64),
    #[error("{path} changed size while writing (expected {expected} bytes, copied {actual})")]
    SizeChanged {
        path: String,
        expected: u64,
        actual: u64,
    },
    #[error("corrupt file system table: {0}")]
    CorruptFst(String),
    #[error("corrupt disc header: {0}")]
    CorruptHeader(String),
    #[error("disc CRC32 is {actual:08X}, expected {expected:08X}")]
    CrcMismatch { expected: u32, actual: u32 },
    #[error("invalid address table {path}: {source}")]
    Table {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type DiscResult<T> = std::result::Result<T, DiscError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscSummary {
    pub size: u64,
    pub crc32: u32,
    pub file_count: usize,
}

pub(crate) fn align(value: u64, to: u64) -> u64 {
    value.div_ceil(to) * to
}
