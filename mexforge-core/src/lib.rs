use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod dat;
pub mod disc;
pub mod gen;
pub mod ids;
pub mod package;
pub mod persist;
pub mod project;
pub mod report;
pub mod store;
pub mod workspace;

use dat::patch::PatchError;
use dat::texture::TextureError;
use dat::DatError;
use disc::{AddressTable, DiscError};
use package::PackageError;
use report::CompileReport;
use store::StoreError;
use workspace::Workspace;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileSettings {
    /// Directory backing the virtual file store.
    pub workspace_path: PathBuf,
    #[serde(default)]
    pub output_iso: Option<PathBuf>,
    /// JSON address table pinning files to fixed disc offsets.
    #[serde(default)]
    pub address_table: Option<PathBuf>,
    #[serde(default)]
    pub expected_disc_crc: Option<u32>,
    #[serde(default)]
    pub debug: bool,
}

impl CompileSettings {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            ForgeError::Config(format!("invalid settings file {}: {e}", path.display()))
        })
    }
}

#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("corrupt record: {0}")]
    Dat(#[from] DatError),
    #[error("texture error: {0}")]
    Texture(#[from] TextureError),
    #[error("patch error: {0}")]
    Patch(#[from] PatchError),
    #[error("disc error: {0}")]
    Disc(#[from] DiscError),
    #[error("package error: {0}")]
    Package(#[from] PackageError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{pass} pass failed: {source}")]
    Pass {
        pass: &'static str,
        #[source]
        source: Box<ForgeError>,
    },
}

pub type Result<T> = std::result::Result<T, ForgeError>;

pub const COMPILE_LOG_PATH: &str = "project/compile_log.txt";

/// Compiles the workspace and, when an output path is set, assembles the
/// disc image.
pub fn run(settings: CompileSettings) -> Result<CompileReport> {
    if !settings.workspace_path.exists() {
        return Err(ForgeError::Config(format!(
            "Workspace path does not exist: {}",
            settings.workspace_path.display()
        )));
    }

    let table = match &settings.address_table {
        Some(path) => Some(AddressTable::from_json_file(path)?),
        None => None,
    };

    let mut workspace = Workspace::open(&settings.workspace_path)?;
    let mut report = workspace.compile()?;

    if let Some(output) = &settings.output_iso {
        let summary = workspace.build_disc(output, table.as_ref())?;
        info!(
            "Wrote {} ({} bytes, CRC32 {:08X})",
            output.display(),
            summary.size,
            summary.crc32
        );
        if let Some(expected) = settings.expected_disc_crc {
            if expected != summary.crc32 {
                return Err(DiscError::CrcMismatch {
                    expected,
                    actual: summary.crc32,
                }
                .into());
            }
        }
        report.disc = Some(summary);
    }

    if settings.debug {
        workspace.store.set(COMPILE_LOG_PATH, report.render())?;
        workspace.store.save()?;
    }

    Ok(report)
}
