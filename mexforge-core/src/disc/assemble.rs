use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};
use flate2::CrcWriter;
use log::{debug, info};

use super::fst::Fst;
use super::*;
use crate::project::Build;
use crate::store::{FileStore, StoreError, FILES_ROOT};

/// Alignment of the executable and the file system table.
const SYSTEM_ALIGN: u64 = 0x100;
/// Alignment of file payloads placed outside the address table.
const FILE_ALIGN: u64 = 0x20;

/// Where one store entry lands on the disc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub path: String,
    pub offset: u64,
    pub len: u64,
}

#[derive(Debug, Clone)]
pub struct DiscLayout {
    pub apploader_len: u64,
    pub dol_offset: u64,
    pub dol_len: u64,
    pub fst_offset: u64,
    pub fst: Vec<u8>,
    /// Game files sorted by disc offset.
    pub files: Vec<Placement>,
    pub size: u64,
}

fn system_len(store: &FileStore, path: &str) -> DiscResult<u64> {
    match store.len(path) {
        Ok(len) => Ok(len),
        Err(StoreError::NotFound(_)) => Err(DiscError::MissingSystemFile(path.to_string())),
        Err(e) => Err(e.into()),
    }
}

fn expect_len(path: &str, actual: u64, expected: u64) -> DiscResult<()> {
    if actual != expected {
        return Err(DiscError::BadSystemFile {
            path: path.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Checks the address table against the system area and returns its
/// slots sorted by offset.
fn checked_slots(table: Option<&AddressTable>, system_end: u64) -> DiscResult<Vec<Slot>> {
    let mut slots: Vec<Slot> = table.map(|t| t.slots.clone()).unwrap_or_default();
    let mut seen = HashSet::new();
    for slot in &slots {
        if !seen.insert(slot.path.as_str()) {
            return Err(DiscError::DuplicateSlot(slot.path.clone()));
        }
        if slot.offset < system_end {
            return Err(DiscError::SlotInSystemArea {
                path: slot.path.clone(),
                offset: slot.offset,
                system_end,
            });
        }
    }
    slots.sort_by_key(|s| s.offset);
    for pair in slots.windows(2) {
        if pair[0].offset + pair[0].size > pair[1].offset {
            return Err(DiscError::SlotOverlap {
                first: pair[0].path.clone(),
                second: pair[1].path.clone(),
            });
        }
    }
    Ok(slots)
}

/// First aligned offset at or after `from` where `len` bytes avoid every
/// reserved slot.
fn first_fit(from: u64, len: u64, slots: &[Slot]) -> u64 {
    let mut at = align(from, FILE_ALIGN);
    for slot in slots {
        if at + len <= slot.offset {
            break;
        }
        if at < slot.offset + slot.size {
            at = align(slot.offset + slot.size, FILE_ALIGN);
        }
    }
    at
}

/// Computes and validates the complete image layout without writing
/// anything.
pub fn plan_layout(store: &FileStore, table: Option<&AddressTable>) -> DiscResult<DiscLayout> {
    expect_len(BOOT_PATH, system_len(store, BOOT_PATH)?, BOOT_SIZE)?;
    expect_len(BI2_PATH, system_len(store, BI2_PATH)?, BI2_SIZE)?;
    let apploader_len = system_len(store, APPLOADER_PATH)?;
    let dol_len = system_len(store, DOL_PATH)?;

    let paths = store.list(FILES_ROOT)?;
    let prefix = format!("{FILES_ROOT}/");
    let relative: Vec<&str> = paths.iter().filter_map(|p| p.strip_prefix(&prefix)).collect();
    let fst = Fst::from_paths(&relative)?;

    let dol_offset = align(APPLOADER_OFFSET + apploader_len, SYSTEM_ALIGN);
    let fst_offset = align(dol_offset + dol_len, SYSTEM_ALIGN);
    let system_end = fst_offset + fst.len() as u64;
    let slots = checked_slots(table, system_end)?;

    let mut files = Vec::with_capacity(relative.len());
    let mut cursor = system_end;
    for rel in fst.files() {
        let path = format!("{prefix}{rel}");
        let len = store.len(&path)?;
        let offset = match slots.iter().find(|s| s.path == path) {
            Some(slot) if len > slot.size => {
                return Err(DiscError::SlotOverflow {
                    path,
                    size: len,
                    slot: slot.size,
                })
            }
            Some(slot) => slot.offset,
            None => {
                let at = first_fit(cursor, len, &slots);
                cursor = at + len;
                at
            }
        };
        files.push(Placement { path, offset, len });
    }
    for slot in &slots {
        if !files.iter().any(|f| f.path == slot.path) {
            debug!("address table slot {} has no file, leaving it empty", slot.path);
        }
    }

    let size = files
        .iter()
        .map(|f| f.offset + f.len)
        .chain([system_end])
        .max()
        .unwrap_or(system_end);
    if size > DISC_CAPACITY {
        return Err(DiscError::TooLarge(size));
    }

    let locations: HashMap<String, (u32, u32)> = files
        .iter()
        .map(|f| (f.path[prefix.len()..].to_string(), (f.offset as u32, f.len as u32)))
        .collect();
    let fst = fst.to_bytes(&locations)?;
    files.sort_by_key(|f| f.offset);

    Ok(DiscLayout {
        apploader_len,
        dol_offset,
        dol_len,
        fst_offset,
        fst,
        files,
        size,
    })
}

fn patch_boot(boot: &mut [u8], layout: &DiscLayout, build: &Build) {
    BigEndian::write_u32(&mut boot[BOOT_DOL_OFFSET..], layout.dol_offset as u32);
    BigEndian::write_u32(&mut boot[BOOT_FST_OFFSET..], layout.fst_offset as u32);
    BigEndian::write_u32(&mut boot[BOOT_FST_SIZE..], layout.fst.len() as u32);
    BigEndian::write_u32(&mut boot[BOOT_FST_MAX_SIZE..], layout.fst.len() as u32);

    if let Some(id) = &build.game_id {
        let id = id.as_bytes();
        let len = id.len().min(GAME_ID_LEN);
        boot[..len].copy_from_slice(&id[..len]);
    }
    if let Some(name) = &build.game_name {
        let field = &mut boot[BOOT_GAME_NAME..BOOT_GAME_NAME + GAME_NAME_LEN];
        field.fill(0);
        let name = name.as_bytes();
        let len = name.len().min(GAME_NAME_LEN - 1);
        field[..len].copy_from_slice(&name[..len]);
    }
}

struct ImageWriter<W: Write> {
    out: CrcWriter<W>,
    pos: u64,
}

impl<W: Write> ImageWriter<W> {
    fn pad_to(&mut self, offset: u64) -> io::Result<()> {
        if offset > self.pos {
            io::copy(&mut io::repeat(0).take(offset - self.pos), &mut self.out)?;
            self.pos = offset;
        }
        Ok(())
    }

    fn bytes_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.pad_to(offset)?;
        self.out.write_all(data)?;
        self.pos += data.len() as u64;
        Ok(())
    }

    fn entry_at(&mut self, store: &FileStore, offset: u64, path: &str, len: u64) -> DiscResult<()> {
        self.pad_to(offset)?;
        let reader = store.open_stream(path)?;
        let copied = io::copy(&mut reader.take(len), &mut self.out)?;
        if copied != len {
            return Err(DiscError::SizeChanged {
                path: path.to_string(),
                expected: len,
                actual: copied,
            });
        }
        self.pos += len;
        Ok(())
    }
}

fn write_image(store: &FileStore, layout: &DiscLayout, boot: &[u8], part: &Path) -> DiscResult<u32> {
    let file = File::create(part)?;
    let mut image = ImageWriter {
        out: CrcWriter::new(BufWriter::new(file)),
        pos: 0,
    };

    image.bytes_at(0, boot)?;
    image.entry_at(store, BI2_OFFSET, BI2_PATH, BI2_SIZE)?;
    image.entry_at(store, APPLOADER_OFFSET, APPLOADER_PATH, layout.apploader_len)?;
    image.entry_at(store, layout.dol_offset, DOL_PATH, layout.dol_len)?;
    image.bytes_at(layout.fst_offset, &layout.fst)?;
    for file in &layout.files {
        image.entry_at(store, file.offset, &file.path, file.len)?;
    }
    image.pad_to(layout.size)?;

    let crc = image.out.crc().sum();
    let mut buffered = image.out.into_inner();
    buffered.flush()?;
    let file = buffered.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(crc)
}

fn part_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Assembles the store's `sys/` and `files/` trees into a disc image.
///
/// The layout is validated before anything is written. The image is
/// streamed into `<output>.part` and renamed once complete, so a failure
/// never leaves a partial image at `output`.
pub fn build_disc(
    store: &FileStore,
    output: &Path,
    table: Option<&AddressTable>,
    build: &Build,
) -> DiscResult<DiscSummary> {
    let layout = plan_layout(store, table)?;
    let mut boot = store.get(BOOT_PATH)?;
    patch_boot(&mut boot, &layout, build);

    let part = part_path(output);
    let crc32 = match write_image(store, &layout, &boot, &part) {
        Ok(crc) => crc,
        Err(e) => {
            let _ = fs::remove_file(&part);
            return Err(e);
        }
    };
    fs::rename(&part, output)?;

    info!(
        "Assembled disc: {} files, executable at 0x{:X}, FST at 0x{:X}",
        layout.files.len(),
        layout.dol_offset,
        layout.fst_offset
    );
    Ok(DiscSummary {
        size: layout.size,
        crc32,
        file_count: layout.files.len(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// A store holding minimal system files and two game files.
    pub(crate) fn disc_store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path().join("ws")).unwrap();
        let mut boot = vec![0u8; BOOT_SIZE as usize];
        boot[..6].copy_from_slice(b"GALE01");
        store.set(BOOT_PATH, boot).unwrap();
        store.set(BI2_PATH, vec![2u8; BI2_SIZE as usize]).unwrap();
        store.set(APPLOADER_PATH, vec![3u8; 0x40]).unwrap();
        // One text section of 0x20 bytes right after the header.
        let mut dol = vec![0u8; 0x120];
        BigEndian::write_u32(&mut dol[0x00..], 0x100);
        BigEndian::write_u32(&mut dol[0x90..], 0x20);
        store.set(DOL_PATH, dol).unwrap();
        store.set("files/PlCo.dat", vec![0xAA; 100]).unwrap();
        store.set("files/audio/nr.ssm", vec![0xBB; 50]).unwrap();
        (dir, store)
    }

    #[test]
    fn layout_places_system_files_and_patches_boot() {
        let (dir, store) = disc_store();
        let output = dir.path().join("game.iso");
        let build = Build {
            game_name: Some("Forge".to_string()),
            ..Build::default()
        };

        let summary = build_disc(&store, &output, None, &build).unwrap();
        let image = fs::read(&output).unwrap();
        assert!(!part_path(&output).exists());
        assert_eq!(image.len() as u64, summary.size);
        assert_eq!(summary.file_count, 2);

        let mut crc = flate2::Crc::new();
        crc.update(&image);
        assert_eq!(crc.sum(), summary.crc32);

        assert_eq!(&image[..6], b"GALE01");
        assert_eq!(&image[0x20..0x26], b"Forge\0");
        assert_eq!(BigEndian::read_u32(&image[BOOT_DOL_OFFSET..]), 0x2500);
        assert_eq!(BigEndian::read_u32(&image[BOOT_FST_OFFSET..]), 0x2700);
        assert!(image[0x440..0x2440].iter().all(|&b| b == 2));
        assert_eq!(BigEndian::read_u32(&image[0x2500..]), 0x100);

        let fst_len = BigEndian::read_u32(&image[BOOT_FST_SIZE..]) as usize;
        let files = fst::parse(&image[0x2700..0x2700 + fst_len]).unwrap();
        let co = files.iter().find(|f| f.path == "PlCo.dat").unwrap();
        assert_eq!(co.len, 100);
        assert_eq!(co.offset as u64 % FILE_ALIGN, 0);
        assert!(image[co.offset as usize..co.offset as usize + 100].iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn pinned_files_land_on_their_slot_and_others_avoid_it() {
        let (_dir, store) = disc_store();
        let layout = plan_layout(&store, None).unwrap();
        let free = layout.files[0].offset;

        let table = AddressTable {
            slots: vec![Slot {
                path: "files/PlCo.dat".to_string(),
                offset: 0x10000,
                size: 0x200,
            }],
        };
        let layout = plan_layout(&store, Some(&table)).unwrap();
        let co = layout.files.iter().find(|f| f.path == "files/PlCo.dat").unwrap();
        assert_eq!(co.offset, 0x10000);
        let nr = layout.files.iter().find(|f| f.path == "files/audio/nr.ssm").unwrap();
        assert_eq!(nr.offset, free);
        assert_eq!(layout.size, 0x10000 + 100);
    }

    #[test]
    fn oversized_file_fails_without_output() {
        let (dir, store) = disc_store();
        let output = dir.path().join("game.iso");
        let table = AddressTable {
            slots: vec![Slot {
                path: "files/PlCo.dat".to_string(),
                offset: 0x10000,
                size: 10,
            }],
        };

        let err = build_disc(&store, &output, Some(&table), &Build::default()).unwrap_err();
        match err {
            DiscError::SlotOverflow { path, size, slot } => {
                assert_eq!(path, "files/PlCo.dat");
                assert_eq!((size, slot), (100, 10));
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(!output.exists());
        assert!(!part_path(&output).exists());
    }

    #[test]
    fn bad_slots_are_rejected() {
        let (_dir, store) = disc_store();
        let slot = |path: &str, offset, size| Slot { path: path.to_string(), offset, size };

        let table = AddressTable { slots: vec![slot("files/PlCo.dat", 0x2000, 0x100)] };
        assert!(matches!(plan_layout(&store, Some(&table)), Err(DiscError::SlotInSystemArea { .. })));

        let table = AddressTable {
            slots: vec![slot("files/PlCo.dat", 0x10000, 0x100), slot("files/audio/nr.ssm", 0x10080, 0x100)],
        };
        assert!(matches!(plan_layout(&store, Some(&table)), Err(DiscError::SlotOverlap { .. })));
    }

    #[test]
    fn missing_or_malformed_system_files() {
        let (_dir, mut store) = disc_store();
        store.set(BI2_PATH, vec![0u8; 16]).unwrap();
        assert!(matches!(plan_layout(&store, None), Err(DiscError::BadSystemFile { .. })));
        store.remove(DOL_PATH).unwrap();
        store.set(BI2_PATH, vec![0u8; BI2_SIZE as usize]).unwrap();
        assert!(matches!(plan_layout(&store, None), Err(DiscError::MissingSystemFile(p)) if p == DOL_PATH));
    }
}
