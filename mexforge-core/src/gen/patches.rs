//! Native code patch archives. Patches are split by their enabled flag
//! into two archives so toggling one never rewrites the other set.

use std::collections::HashSet;

use log::{debug, info};

use super::{Generator, PassContext};
use crate::dat::patch::{self, PatchRecord, DISABLED_ARCHIVE, ENABLED_ARCHIVE};
use crate::Result;

/// Address patches are test-linked at. The loader picks the real one at
/// boot; this only catches branches that can never reach their target.
pub const NOMINAL_LOAD_ADDRESS: u32 = 0x8040_0000;

fn unique_name(name: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(name) {
        return name.to_string();
    }
    (1..)
        .map(|n| format!("{name}_{n}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}

pub struct PatchPass;

impl Generator for PatchPass {
    fn name(&self) -> &'static str {
        "patches"
    }

    fn run(&self, ctx: &mut PassContext) -> Result<bool> {
        let mut taken = HashSet::new();
        let mut enabled = Vec::new();
        let mut disabled = Vec::new();

        let patches = ctx.project.patches.clone();
        for (i, patch) in patches.iter().enumerate() {
            let code = match ctx.store.try_get(&patch.code)? {
                Some(code) => code,
                None => {
                    ctx.warn(format!("patch {i} ({}): code {} is missing, skipped", patch.name, patch.code));
                    continue;
                }
            };

            let name = unique_name(&patch.name, &taken);
            if name != patch.name {
                ctx.warn(format!("patch {i}: name '{}' is already used, stored as '{name}'", patch.name));
            }
            taken.insert(name.clone());

            let record = PatchRecord {
                name,
                code,
                relocations: patch.relocations.clone(),
                symbols: patch.symbols.clone(),
            };
            record.validate()?;
            if let Err(e) = record.link(NOMINAL_LOAD_ADDRESS) {
                ctx.warn(e.to_string());
            }
            debug!(
                "patch {} ({} bytes, {} relocations, enabled: {})",
                record.name,
                record.code.len(),
                record.relocations.len(),
                patch.enabled
            );
            if patch.enabled {
                enabled.push(record);
            } else {
                disabled.push(record);
            }
        }

        let on = patch::write_archive(crate::store::file_name(ENABLED_ARCHIVE), &enabled)?;
        let off = patch::write_archive(crate::store::file_name(DISABLED_ARCHIVE), &disabled)?;
        ctx.store.set(ENABLED_ARCHIVE, on)?;
        ctx.store.set(DISABLED_ARCHIVE, off)?;
        info!("Wrote {} enabled and {} disabled patches", enabled.len(), disabled.len());
        Ok(true)
    }
}
