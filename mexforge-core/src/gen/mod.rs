//! Compiler passes. Each pass reads the project plus one template archive
//! from the store and writes regenerated tables back into the store.

pub mod css;
pub mod data_table;
pub mod fighter_load;
pub mod lookup;
pub mod patches;
pub mod result;
pub mod series;
pub mod sound;
pub mod sss;
pub mod trophy;

use log::{debug, warn};

use crate::dat::texture::{PaletteFormat, Texture, TextureFormat};
use crate::dat::DatFile;
use crate::project::Project;
use crate::report::Warning;
use crate::store::FileStore;
use crate::Result;

/// Shared state handed to every pass.
pub struct PassContext<'a> {
    pub project: &'a mut Project,
    pub store: &'a mut FileStore,
    pass: &'static str,
    warnings: &'a mut Vec<Warning>,
}

impl<'a> PassContext<'a> {
    pub fn new(
        pass: &'static str,
        project: &'a mut Project,
        store: &'a mut FileStore,
        warnings: &'a mut Vec<Warning>,
    ) -> Self {
        PassContext {
            project,
            store,
            pass,
            warnings,
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("[{}] {}", self.pass, message);
        self.warnings.push(Warning {
            pass: self.pass,
            message,
        });
    }

    /// Parses a template archive, or `None` when the store does not have it.
    pub fn load_template(&self, path: &str) -> Result<Option<DatFile>> {
        match self.store.try_get(path)? {
            Some(bytes) => {
                debug!("[{}] loaded template {} ({} bytes)", self.pass, path, bytes.len());
                Ok(Some(DatFile::parse(crate::store::file_name(path), &bytes)?))
            }
            None => Ok(None),
        }
    }

    pub fn save_dat(&mut self, path: &str, dat: &DatFile) -> Result<()> {
        let bytes = dat.to_bytes();
        debug!("[{}] staged {} ({} bytes)", self.pass, path, bytes.len());
        self.store.set(path, bytes)?;
        Ok(())
    }

    /// Loads and encodes a PNG asset. Missing or unreadable assets are
    /// reported as a warning naming `owner` and yield `None`.
    pub fn load_texture(
        &mut self,
        owner: &str,
        path: Option<&str>,
        format: TextureFormat,
        palette: PaletteFormat,
    ) -> Option<Texture> {
        let path = path?;
        let bytes = match self.store.try_get(path) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                self.warn(format!("{owner}: image {path} is missing"));
                return None;
            }
            Err(e) => {
                self.warn(format!("{owner}: image {path} could not be read: {e}"));
                return None;
            }
        };
        match Texture::from_png(&bytes, format, palette) {
            Ok(texture) => Some(texture),
            Err(e) => {
                self.warn(format!("{owner}: image {path} could not be encoded: {e}"));
                None
            }
        }
    }
}

pub trait Generator {
    fn name(&self) -> &'static str;

    /// Runs the pass. Returns `Ok(false)` when the pass was skipped because
    /// its template is absent.
    fn run(&self, ctx: &mut PassContext) -> Result<bool>;
}

/// Every pass in execution order. The sound pass comes first since other
/// tables carry its script offsets, and the data table pass assigns the
/// external IDs the menu passes read.
pub fn passes() -> Vec<Box<dyn Generator>> {
    vec![
        Box::new(sound::SoundPass),
        Box::new(data_table::DataTablePass),
        Box::new(fighter_load::FighterLoadPass),
        Box::new(series::SeriesPass),
        Box::new(css::CssPass),
        Box::new(sss::SssPass),
        Box::new(result::ResultPass),
        Box::new(trophy::TrophyPass),
        Box::new(patches::PatchPass),
    ]
}
