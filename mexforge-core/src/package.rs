//! Importing assets from zip packages into the store.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use image::ImageFormat;
use log::info;
use thiserror::Error;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::project::{Costume, Music, Stage};
use crate::store::{file_name, join, FileStore};
use crate::Result;

pub const CSS_ICON_DIR: &str = "assets/css/";
pub const STAGE_ICON_DIR: &str = "assets/sss/";
pub const MUSIC_DIR: &str = "assets/music/";

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("failed to read package {path}: {source}")]
    Zip {
        path: String,
        #[source]
        source: ZipError,
    },
    #[error("{entry} in {path} is not a valid PNG: {source}")]
    InvalidImage {
        path: String,
        entry: String,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to read {entry} from {path}: {source}")]
    Io {
        path: String,
        entry: String,
        #[source]
        source: io::Error,
    },
}

/// Copies `entry` from the zip package at `archive` into the store and
/// returns the asset path it was stored under, or `None` when the package
/// has no such entry.
///
/// A `base_path` ending in `/` is a directory and the entry's file name is
/// appended. The final path is made unique so an import never replaces an
/// existing asset.
pub fn set_from_package(store: &mut FileStore, archive: &Path, entry: &str, base_path: &str) -> Result<Option<String>> {
    let path = archive.display().to_string();
    let zip_error = |source| PackageError::Zip { path: path.clone(), source };

    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file).map_err(zip_error)?;
    let mut bytes = Vec::new();
    match zip.by_name(entry) {
        Ok(mut file) => {
            file.read_to_end(&mut bytes).map_err(|source| PackageError::Io {
                path: path.clone(),
                entry: entry.to_string(),
                source,
            })?;
        }
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(zip_error(e).into()),
    }

    if entry.to_ascii_lowercase().ends_with(".png") {
        image::load_from_memory_with_format(&bytes, ImageFormat::Png).map_err(|source| PackageError::InvalidImage {
            path: path.clone(),
            entry: entry.to_string(),
            source,
        })?;
    }

    let base = if base_path.ends_with('/') {
        join(base_path, file_name(entry))
    } else {
        base_path.to_string()
    };
    let target = store.unique_file_path(&base)?;
    store.set(&target, bytes)?;
    info!("Imported {entry} from {path} as {target}");
    Ok(Some(target))
}

fn assign(target: &mut Option<String>, stored: Option<String>) -> bool {
    match stored {
        Some(path) => {
            *target = Some(path);
            true
        }
        None => false,
    }
}

impl Costume {
    pub fn set_icon_from_package(&mut self, store: &mut FileStore, archive: &Path, entry: &str) -> Result<bool> {
        let stored = set_from_package(store, archive, entry, CSS_ICON_DIR)?;
        Ok(assign(&mut self.css_icon, stored))
    }
}

impl Stage {
    pub fn set_icon_from_package(&mut self, store: &mut FileStore, archive: &Path, entry: &str) -> Result<bool> {
        let stored = set_from_package(store, archive, entry, STAGE_ICON_DIR)?;
        Ok(assign(&mut self.icon, stored))
    }
}

impl Music {
    pub fn set_from_package(&mut self, store: &mut FileStore, archive: &Path, entry: &str) -> Result<bool> {
        let stored = set_from_package(store, archive, entry, MUSIC_DIR)?;
        Ok(assign(&mut self.asset, stored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gen::testutil::{png, store};
    use crate::ForgeError;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn package(dir: &Path, entries: &[(&str, Vec<u8>)]) -> std::path::PathBuf {
        let path = dir.join("package.zip");
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        for (name, data) in entries {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
        path
    }

    #[test]
    fn imports_get_unique_paths() {
        let (dir, mut store) = store();
        let archive = package(dir.path(), &[("icons/mario.png", png([255, 0, 0, 255]))]);
        store.set("assets/css/mario.png", vec![1]).unwrap();

        let mut costume = Costume::default();
        assert!(costume.set_icon_from_package(&mut store, &archive, "icons/mario.png").unwrap());
        assert_eq!(costume.css_icon.as_deref(), Some("assets/css/mario_1.png"));
        assert_eq!(store.get("assets/css/mario.png").unwrap(), vec![1]);

        let mut stage = Stage::default();
        assert!(!stage.set_icon_from_package(&mut store, &archive, "icons/absent.png").unwrap());
        assert_eq!(stage.icon, None);
    }

    #[test]
    fn broken_png_is_rejected() {
        let (dir, mut store) = store();
        let archive = package(dir.path(), &[("bad.png", vec![0, 1, 2, 3]), ("theme.hps", vec![9; 32])]);

        let err = set_from_package(&mut store, &archive, "bad.png", "assets/bad.png").unwrap_err();
        assert!(matches!(err, ForgeError::Package(PackageError::InvalidImage { .. })));

        let mut music = Music::default();
        assert!(music.set_from_package(&mut store, &archive, "theme.hps").unwrap());
        assert_eq!(store.get("assets/music/theme.hps").unwrap(), vec![9; 32]);
    }
}
