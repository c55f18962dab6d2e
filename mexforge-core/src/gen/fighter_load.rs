//! Common fighter-load data: one fixed-size bone lookup table per fighter,
//! followed by a dummy table the engine reads as the end-of-roster row.

use log::info;

use super::{Generator, PassContext};
use crate::dat::DatRecord;
use crate::dat::record::{dat_record, reference_fields, scalar_fields, Buffer};
use crate::Result;

pub const TEMPLATE: &str = "files/PlCo.dat";
pub const ROOT: &str = "ftLoadCommonData";

/// Entries in every bone lookup table.
pub const BONE_TABLE_LEN: usize = 0x40;
/// Lookup entry for a bone the fighter does not have.
pub const NO_BONE: u8 = 0xFF;

dat_record!(LoadCommonData, 0x08);

scalar_fields!(LoadCommonData {
    table_count, set_table_count: u32 = 0x04;
});

reference_fields!(LoadCommonData {
    bone_tables, set_bone_tables: Buffer = 0x00;
});

dat_record!(BoneTable, 0x08);

scalar_fields!(BoneTable {
    entry_count, set_entry_count: u32 = 0x00;
});

reference_fields!(BoneTable {
    lookup, set_lookup: Buffer = 0x04;
});

pub struct FighterLoadPass;

impl Generator for FighterLoadPass {
    fn name(&self) -> &'static str {
        "fighter load"
    }

    fn run(&self, ctx: &mut PassContext) -> Result<bool> {
        let Some(mut dat) = ctx.load_template(TEMPLATE)? else {
            return Ok(false);
        };
        let root = LoadCommonData::wrap(&dat, dat.require_root(ROOT)?)?;

        let mut truncated = Vec::new();
        let mut tables = Vec::with_capacity(ctx.project.fighters.len() + 1);
        for (i, fighter) in ctx.project.fighters.iter().enumerate() {
            let mut lookup = vec![NO_BONE; BONE_TABLE_LEN];
            let used = fighter.bone_lookup.len().min(BONE_TABLE_LEN);
            lookup[..used].copy_from_slice(&fighter.bone_lookup[..used]);
            if fighter.bone_lookup.len() > BONE_TABLE_LEN {
                truncated.push(format!(
                    "fighter {i} ({}): bone lookup has {} entries, only {BONE_TABLE_LEN} are kept",
                    fighter.name,
                    fighter.bone_lookup.len()
                ));
            }

            let table = BoneTable::create(&mut dat);
            table.set_entry_count(&mut dat, used as u32)?;
            let buffer = dat.alloc_bytes(lookup);
            table.set_lookup(&mut dat, Some(Buffer(buffer)));
            tables.push(Some(table.node()));
        }

        let dummy = BoneTable::create(&mut dat);
        let buffer = dat.alloc_bytes(vec![NO_BONE; BONE_TABLE_LEN]);
        dummy.set_lookup(&mut dat, Some(Buffer(buffer)));
        tables.push(Some(dummy.node()));

        let array = dat.alloc_reference_array(&tables);
        root.set_bone_tables(&mut dat, Some(Buffer(array)));
        root.set_table_count(&mut dat, tables.len() as u32)?;

        for message in truncated {
            ctx.warn(message);
        }
        ctx.save_dat(TEMPLATE, &dat)?;
        info!("Wrote {} bone lookup tables", tables.len());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dat::DatFile;
    use crate::gen::testutil::{run_pass, store};
    use crate::project::{Fighter, Project};

    #[test]
    fn one_table_per_fighter_plus_dummy() {
        let (_dir, mut store) = store();
        let mut template = DatFile::new("PlCo.dat");
        let root = LoadCommonData::create(&mut template);
        template.set_root(ROOT, root.node());
        store.set(TEMPLATE, template.to_bytes()).unwrap();

        let mut project = Project {
            fighters: vec![
                Fighter { bone_lookup: vec![0, 1, 2], ..Fighter::default() },
                Fighter { bone_lookup: vec![7; BONE_TABLE_LEN + 2], ..Fighter::default() },
            ],
            ..Project::default()
        };
        let (ran, warnings) = run_pass(&FighterLoadPass, &mut project, &mut store);
        assert!(ran);
        assert_eq!(warnings.len(), 1);

        let dat = DatFile::parse("PlCo.dat", &store.get(TEMPLATE).unwrap()).unwrap();
        let root = LoadCommonData(dat.require_root(ROOT).unwrap());
        assert_eq!(root.table_count(&dat).unwrap(), 3);
        let array = root.bone_tables(&dat).unwrap();
        let tables: Vec<BoneTable> = dat
            .reference_array(array.0, 0, 3)
            .into_iter()
            .map(|t| BoneTable(t.unwrap()))
            .collect();

        let first = tables[0].lookup(&dat).unwrap();
        assert_eq!(&first.bytes(&dat)[..4], &[0, 1, 2, NO_BONE]);
        assert_eq!(tables[1].entry_count(&dat).unwrap(), BONE_TABLE_LEN as u32);
        assert_eq!(tables[2].entry_count(&dat).unwrap(), 0);
        assert!(tables[2].lookup(&dat).unwrap().bytes(&dat)[..BONE_TABLE_LEN].iter().all(|&b| b == NO_BONE));
    }

    #[test]
    fn missing_root_is_fatal() {
        let (_dir, mut store) = store();
        store.set(TEMPLATE, DatFile::new("PlCo.dat").to_bytes()).unwrap();
        let mut project = Project::default();
        let mut warnings = Vec::new();
        let mut ctx = crate::gen::PassContext::new("fighter load", &mut project, &mut store, &mut warnings);
        assert!(FighterLoadPass.run(&mut ctx).is_err());
    }
}
