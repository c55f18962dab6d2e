use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use flate2::CrcReader;
use log::{debug, info};

use super::*;
use crate::store::{join, FileStore, FILES_ROOT};

const APPLOADER_HEADER: u64 = 0x20;
const DOL_HEADER: u64 = 0x100;
const DOL_SECTIONS: usize = 18;
/// Staged bytes after which extraction flushes the store.
const FLUSH_THRESHOLD: u64 = 64 << 20;

#[derive(Debug, Clone)]
pub struct Extracted {
    pub summary: DiscSummary,
    /// Pins every file to the space it occupied on the source disc.
    pub table: AddressTable,
}

struct DiscReader {
    file: BufReader<File>,
    size: u64,
}

impl DiscReader {
    fn read_at(&mut self, offset: u64, len: u64, what: &str) -> DiscResult<Vec<u8>> {
        if offset.checked_add(len).map_or(true, |end| end > self.size) {
            return Err(DiscError::CorruptHeader(format!(
                "{what} at 0x{offset:X} (+0x{len:X}) lies past the end of the image"
            )));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

fn image_crc(path: &Path) -> DiscResult<u32> {
    let mut reader = CrcReader::new(BufReader::new(File::open(path)?));
    io::copy(&mut reader, &mut io::sink())?;
    Ok(reader.crc().sum())
}

fn dol_len(header: &[u8]) -> u64 {
    (0..DOL_SECTIONS)
        .map(|i| {
            let offset = BigEndian::read_u32(&header[i * 4..]) as u64;
            let size = BigEndian::read_u32(&header[0x90 + i * 4..]) as u64;
            if size == 0 {
                0
            } else {
                offset + size
            }
        })
        .max()
        .unwrap_or(0)
        .max(DOL_HEADER)
}

/// Slot sizes reach up to the next file's start so a rebuilt file may grow
/// into the padding the source disc left after it.
fn original_slots(files: &[fst::FstFile]) -> AddressTable {
    let mut sorted: Vec<&fst::FstFile> = files.iter().collect();
    sorted.sort_by_key(|f| (f.offset, f.len));
    let slots = sorted
        .iter()
        .map(|file| {
            let start = file.offset as u64;
            let end = start + file.len as u64;
            let next = sorted
                .iter()
                .map(|f| f.offset as u64)
                .filter(|&o| o > start)
                .min()
                .unwrap_or(end);
            Slot {
                path: join(FILES_ROOT, &file.path),
                offset: start,
                size: end.max(next) - start,
            }
        })
        .collect();
    AddressTable { slots }
}

/// Unpacks a disc image into the store's `sys/` and `files/` trees.
///
/// With `expected_crc` set the image checksum is verified before anything
/// is staged. Large images are flushed to the store's backing directory
/// as extraction proceeds.
pub fn extract_disc(image: &Path, store: &mut FileStore, expected_crc: Option<u32>) -> DiscResult<Extracted> {
    let crc32 = image_crc(image)?;
    if let Some(expected) = expected_crc {
        if expected != crc32 {
            return Err(DiscError::CrcMismatch { expected, actual: crc32 });
        }
    }

    let file = File::open(image)?;
    let size = file.metadata()?.len();
    let mut disc = DiscReader {
        file: BufReader::new(file),
        size,
    };

    let boot = disc.read_at(0, BOOT_SIZE, "boot block")?;
    let bi2 = disc.read_at(BI2_OFFSET, BI2_SIZE, "bi2")?;
    let header = disc.read_at(APPLOADER_OFFSET, APPLOADER_HEADER, "apploader header")?;
    let apploader_len =
        APPLOADER_HEADER + BigEndian::read_u32(&header[0x14..]) as u64 + BigEndian::read_u32(&header[0x18..]) as u64;
    let apploader = disc.read_at(APPLOADER_OFFSET, apploader_len, "apploader")?;

    let dol_offset = BigEndian::read_u32(&boot[BOOT_DOL_OFFSET..]) as u64;
    let dol_header = disc.read_at(dol_offset, DOL_HEADER, "executable header")?;
    let dol = disc.read_at(dol_offset, dol_len(&dol_header), "executable")?;

    let fst_offset = BigEndian::read_u32(&boot[BOOT_FST_OFFSET..]) as u64;
    let fst_size = BigEndian::read_u32(&boot[BOOT_FST_SIZE..]) as u64;
    let fst_bytes = disc.read_at(fst_offset, fst_size, "file system table")?;
    let files = fst::parse(&fst_bytes)?;

    store.set(BOOT_PATH, boot)?;
    store.set(BI2_PATH, bi2)?;
    store.set(APPLOADER_PATH, apploader)?;
    store.set(DOL_PATH, dol)?;

    let mut staged = 0u64;
    for file in &files {
        let data = disc.read_at(file.offset as u64, file.len as u64, &file.path)?;
        staged += data.len() as u64;
        store.set(&join(FILES_ROOT, &file.path), data)?;
        debug!("extracted {} ({} bytes)", file.path, file.len);
        if staged >= FLUSH_THRESHOLD {
            store.save()?;
            staged = 0;
        }
    }

    info!(
        "Extracted {} files from {} ({} bytes, CRC32 {:08X})",
        files.len(),
        image.display(),
        size,
        crc32
    );
    Ok(Extracted {
        summary: DiscSummary {
            size,
            crc32,
            file_count: files.len(),
        },
        table: original_slots(&files),
    })
}
