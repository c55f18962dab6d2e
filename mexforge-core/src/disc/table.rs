use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{DiscError, DiscResult};

/// A file pinned to a fixed disc offset. `size` is the space reserved
/// for it; the file may be smaller but never larger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub path: String,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressTable {
    pub slots: Vec<Slot>,
}

impl AddressTable {
    pub fn from_json_file(path: &Path) -> DiscResult<Self> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|source| DiscError::Table {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn to_json(&self) -> DiscResult<String> {
        serde_json::to_string_pretty(self).map_err(|source| DiscError::Table {
            path: String::new(),
            source,
        })
    }

    pub fn write_json_file(&self, path: &Path) -> DiscResult<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn slot(&self, path: &str) -> Option<&Slot> {
        self.slots.iter().find(|s| s.path == path)
    }
}
