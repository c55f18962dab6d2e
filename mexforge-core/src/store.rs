//! Virtual file store.
//!
//! Every compiler pass reads and writes game files through this store
//! using virtual paths such as `files/PlCo.dat`. Writes are staged in
//! memory and only reach the backing directory on [`FileStore::save`].

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use log::{debug, info};
use thiserror::Error;
use walkdir::WalkDir;

/// Top-level roots of the virtual tree.
pub const SYS_ROOT: &str = "sys";
pub const FILES_ROOT: &str = "files";
pub const PROJECT_ROOT: &str = "project";
pub const ASSETS_ROOT: &str = "assets";

pub const ROOTS: [&str; 4] = [SYS_ROOT, FILES_ROOT, PROJECT_ROOT, ASSETS_ROOT];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file not found in store: {0}")]
    NotFound(String),
    #[error("invalid virtual path '{0}'")]
    InvalidPath(String),
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to flush '{path}': {source}")]
    Flush {
        path: String,
        #[source]
        source: io::Error,
    },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone)]
enum Pending {
    Write(Vec<u8>),
    Remove,
}

/// Checks and normalizes a virtual path.
pub fn normalize_path(path: &str) -> StoreResult<String> {
    if path.contains('\\') {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
    if parts.len() < 2 || !ROOTS.contains(&parts[0]) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    if parts.iter().any(|p| p.is_empty() || *p == "." || *p == "..") {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(parts.join("/"))
}

/// Joins a directory-like virtual prefix and a file name.
pub fn join(prefix: &str, name: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), name.trim_start_matches('/'))
}

/// Last component of a virtual path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Change-tracking key/value store over a backing directory.
pub struct FileStore {
    root: PathBuf,
    pending: BTreeMap<String, Pending>,
    reserved: BTreeSet<String>,
}

impl FileStore {
    /// Opens (and creates if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        for dir in ROOTS {
            let path = root.join(dir);
            fs::create_dir_all(&path).map_err(|source| StoreError::Io {
                path: path.display().to_string(),
                source,
            })?;
        }
        Ok(FileStore {
            root,
            pending: BTreeMap::new(),
            reserved: BTreeSet::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn disk_path(&self, normalized: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in normalized.split('/') {
            path.push(part);
        }
        path
    }

    pub fn exists(&self, path: &str) -> bool {
        let Ok(path) = normalize_path(path) else {
            return false;
        };
        match self.pending.get(&path) {
            Some(Pending::Write(_)) => true,
            Some(Pending::Remove) => false,
            None => self.disk_path(&path).is_file(),
        }
    }

    pub fn get(&self, path: &str) -> StoreResult<Vec<u8>> {
        let path = normalize_path(path)?;
        match self.pending.get(&path) {
            Some(Pending::Write(data)) => Ok(data.clone()),
            Some(Pending::Remove) => Err(StoreError::NotFound(path)),
            None => {
                let disk = self.disk_path(&path);
                if !disk.is_file() {
                    return Err(StoreError::NotFound(path));
                }
                fs::read(&disk).map_err(|source| StoreError::Io { path, source })
            }
        }
    }

    /// Reads an entry if it exists.
    pub fn try_get(&self, path: &str) -> StoreResult<Option<Vec<u8>>> {
        match self.get(path) {
            Ok(data) => Ok(Some(data)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Size of an entry without reading it.
    pub fn len(&self, path: &str) -> StoreResult<u64> {
        let path = normalize_path(path)?;
        match self.pending.get(&path) {
            Some(Pending::Write(data)) => Ok(data.len() as u64),
            Some(Pending::Remove) => Err(StoreError::NotFound(path)),
            None => {
                let disk = self.disk_path(&path);
                match fs::metadata(&disk) {
                    Ok(meta) if meta.is_file() => Ok(meta.len()),
                    _ => Err(StoreError::NotFound(path)),
                }
            }
        }
    }

    /// Stages a write. Creates or overwrites the entry.
    pub fn set(&mut self, path: &str, data: impl Into<Vec<u8>>) -> StoreResult<()> {
        let path = normalize_path(path)?;
        self.reserved.remove(&path);
        self.pending.insert(path, Pending::Write(data.into()));
        Ok(())
    }

    /// Stages a removal. Returns whether the entry existed.
    pub fn remove(&mut self, path: &str) -> StoreResult<bool> {
        let existed = self.exists(path);
        let path = normalize_path(path)?;
        self.reserved.remove(&path);
        if self.disk_path(&path).is_file() {
            self.pending.insert(path, Pending::Remove);
        } else {
            self.pending.remove(&path);
        }
        Ok(existed)
    }

    /// Returns a path derived from `base` that is neither stored nor
    /// handed out by an earlier call, and reserves it.
    pub fn unique_file_path(&mut self, base: &str) -> StoreResult<String> {
        let base = normalize_path(base)?;
        let (dir, name) = match base.rfind('/') {
            Some(pos) => (&base[..pos], &base[pos + 1..]),
            None => ("", base.as_str()),
        };
        let (stem, ext) = match name.rfind('.') {
            Some(pos) if pos > 0 => (&name[..pos], &name[pos..]),
            _ => (name, ""),
        };

        let mut candidate = base.clone();
        let mut counter = 1usize;
        while self.exists(&candidate) || self.reserved.contains(&candidate) {
            candidate = format!("{dir}/{stem}_{counter}{ext}");
            counter += 1;
        }
        self.reserved.insert(candidate.clone());
        Ok(candidate)
    }

    /// Opens an entry for streaming reads.
    pub fn open_stream(&self, path: &str) -> StoreResult<Box<dyn Read + '_>> {
        let path = normalize_path(path)?;
        match self.pending.get(&path) {
            Some(Pending::Write(data)) => Ok(Box::new(Cursor::new(data.as_slice()))),
            Some(Pending::Remove) => Err(StoreError::NotFound(path)),
            None => {
                let disk = self.disk_path(&path);
                let file = fs::File::open(&disk).map_err(|source| match source.kind() {
                    io::ErrorKind::NotFound => StoreError::NotFound(path.clone()),
                    _ => StoreError::Io {
                        path: path.clone(),
                        source,
                    },
                })?;
                Ok(Box::new(io::BufReader::new(file)))
            }
        }
    }

    /// Lists every entry under `prefix`, sorted.
    pub fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let prefix = prefix.trim_matches('/');
        let mut out = BTreeSet::new();

        let mut disk_dir = self.root.clone();
        for part in prefix.split('/').filter(|p| !p.is_empty()) {
            disk_dir.push(part);
        }
        if disk_dir.is_dir() {
            for entry in WalkDir::new(&disk_dir).sort_by_file_name() {
                let entry = entry.map_err(|e| StoreError::Io {
                    path: disk_dir.display().to_string(),
                    source: e.into(),
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(rel) = entry.path().strip_prefix(&self.root) else {
                    continue;
                };
                let virtual_path = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                out.insert(virtual_path);
            }
        }

        let scope = format!("{prefix}/");
        for (path, pending) in &self.pending {
            if !path.starts_with(&scope) {
                continue;
            }
            match pending {
                Pending::Write(_) => {
                    out.insert(path.clone());
                }
                Pending::Remove => {
                    out.remove(path);
                }
            }
        }

        Ok(out.into_iter().collect())
    }

    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn dirty_paths(&self) -> Vec<&str> {
        self.pending.keys().map(String::as_str).collect()
    }

    /// Drops every staged change.
    pub fn discard(&mut self) {
        self.pending.clear();
        self.reserved.clear();
    }

    /// Flushes staged changes to the backing directory. A failure part way
    /// through leaves the remaining changes staged.
    pub fn save(&mut self) -> StoreResult<usize> {
        let pending = std::mem::take(&mut self.pending);
        let mut flushed = 0usize;
        let mut iter = pending.into_iter();

        while let Some((path, change)) = iter.next() {
            let disk = self.disk_path(&path);
            let result = match &change {
                Pending::Write(data) => disk
                    .parent()
                    .map_or(Ok(()), |dir| fs::create_dir_all(dir))
                    .and_then(|_| fs::write(&disk, data)),
                Pending::Remove => match fs::remove_file(&disk) {
                    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                    other => other,
                },
            };
            if let Err(source) = result {
                self.pending.insert(path.clone(), change);
                self.pending.extend(iter);
                return Err(StoreError::Flush { path, source });
            }
            debug!("flushed {path}");
            flushed += 1;
        }

        info!("store flushed {flushed} entries to {}", self.root.display());
        Ok(flushed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn rejects_paths_outside_roots() {
        assert!(normalize_path("files/a.dat").is_ok());
        assert!(normalize_path("/files/a.dat/").is_ok());
        assert!(normalize_path("other/a.dat").is_err());
        assert!(normalize_path("files/../sys/a").is_err());
        assert!(normalize_path("files\\a.dat").is_err());
        assert!(normalize_path("files").is_err());
    }

    #[test]
    fn writes_stay_staged_until_save() {
        let (dir, mut store) = temp_store();
        store.set("files/PlCo.dat", vec![1, 2, 3]).unwrap();

        assert!(store.exists("files/PlCo.dat"));
        assert_eq!(store.get("files/PlCo.dat").unwrap(), vec![1, 2, 3]);
        assert!(!dir.path().join("files/PlCo.dat").exists());

        assert_eq!(store.save().unwrap(), 1);
        assert!(!store.is_dirty());
        assert_eq!(fs::read(dir.path().join("files/PlCo.dat")).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn missing_entries_report_not_found() {
        let (_dir, store) = temp_store();
        assert!(matches!(store.get("files/none.dat"), Err(StoreError::NotFound(_))));
        assert!(store.try_get("files/none.dat").unwrap().is_none());
    }

    #[test]
    fn remove_hides_disk_entry_until_flushed() {
        let (dir, mut store) = temp_store();
        store.set("assets/a.png", vec![9]).unwrap();
        store.save().unwrap();

        assert!(store.remove("assets/a.png").unwrap());
        assert!(!store.exists("assets/a.png"));
        assert!(dir.path().join("assets/a.png").exists());
        store.save().unwrap();
        assert!(!dir.path().join("assets/a.png").exists());
    }

    #[test]
    fn unique_paths_never_collide() {
        let (_dir, mut store) = temp_store();
        store.set("assets/icon.png", vec![0]).unwrap();

        let first = store.unique_file_path("assets/icon.png").unwrap();
        let second = store.unique_file_path("assets/icon.png").unwrap();
        assert_eq!(first, "assets/icon_1.png");
        assert_eq!(second, "assets/icon_2.png");
        assert!(!store.exists(&first));

        store.set(&first, vec![1]).unwrap();
        let third = store.unique_file_path("assets/icon.png").unwrap();
        assert_eq!(third, "assets/icon_3.png");

        let plain = store.unique_file_path("assets/blob").unwrap();
        assert_eq!(plain, "assets/blob");
    }

    #[test]
    fn list_merges_disk_and_pending() {
        let (_dir, mut store) = temp_store();
        store.set("files/a.dat", vec![0]).unwrap();
        store.set("files/sub/b.dat", vec![0]).unwrap();
        store.save().unwrap();
        store.set("files/c.dat", vec![0]).unwrap();
        store.remove("files/a.dat").unwrap();
        store.set("project/x.json", vec![0]).unwrap();

        assert_eq!(
            store.list("files").unwrap(),
            vec!["files/c.dat".to_string(), "files/sub/b.dat".to_string()]
        );
    }

    #[test]
    fn stream_and_len_agree() {
        let (_dir, mut store) = temp_store();
        store.set("sys/main.dol", vec![7u8; 300]).unwrap();
        assert_eq!(store.len("sys/main.dol").unwrap(), 300);
        let mut buf = Vec::new();
        store.open_stream("sys/main.dol").unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf.len(), 300);
        store.save().unwrap();
        let mut buf = Vec::new();
        store.open_stream("sys/main.dol").unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, vec![7u8; 300]);
    }
}
