//! Character select screen: icon placement and the strided costume icon
//! track (`external_id + fighter_count * costume`).

use log::info;

use super::lookup::{find_tex_anim, rebuild_icon_joints, strided_frame, ImageSource, TrackBuilder};
use super::{Generator, PassContext};
use crate::dat::texture::{PaletteFormat, TextureFormat};
use crate::dat::DatFile;
use crate::ids;
use crate::Result;

pub const TEMPLATE: &str = "files/MnSlChr.usd";
pub const JOINT_ROOT: &str = "MnSlChr_icon_joint";
pub const ANIM_ROOT: &str = "MnSlChr_icon_matanim_joint";
pub const TABLE_ROOT: &str = "MnSlChr_icon_table";

pub const ICON_HEADER: usize = 0x04;
pub const ICON_ROW: usize = 0x10;
/// Icon table value for an icon with no fighter.
pub const NO_FIGHTER: u16 = 0xFFFF;

pub const ICON_FORMAT: TextureFormat = TextureFormat::Ci8;
pub const ICON_PALETTE: PaletteFormat = PaletteFormat::Rgb5a3;

/// Writes the icon table shared by both select screens: a count followed
/// by one row per icon.
pub(crate) fn write_icon_table(dat: &mut DatFile, root: &str, rows: &[(u16, bool, f32, f32)]) -> Result<()> {
    let table = dat.alloc(ICON_HEADER + rows.len() * ICON_ROW);
    dat.write::<u32>(table, 0, rows.len() as u32, "IconTable")?;
    for (i, &(id, locked, x, y)) in rows.iter().enumerate() {
        let at = ICON_HEADER + i * ICON_ROW;
        dat.write::<u16>(table, at, id, "IconRow")?;
        dat.write::<u16>(table, at + 0x02, i as u16, "IconRow")?;
        dat.write::<u8>(table, at + 0x04, locked as u8, "IconRow")?;
        dat.write::<f32>(table, at + 0x08, x, "IconRow")?;
        dat.write::<f32>(table, at + 0x0C, y, "IconRow")?;
    }
    dat.set_root(root, table);
    Ok(())
}

pub struct CssPass;

impl Generator for CssPass {
    fn name(&self) -> &'static str {
        "css"
    }

    fn run(&self, ctx: &mut PassContext) -> Result<bool> {
        let Some(mut dat) = ctx.load_template(TEMPLATE)? else {
            return Ok(false);
        };

        let fighter_count = ctx.project.fighters.len();
        let positions: Vec<(f32, f32)> = ctx.project.css_icons.iter().map(|i| (i.x, i.y)).collect();
        rebuild_icon_joints(&mut dat, JOINT_ROOT, &positions)?;

        let mut rows = Vec::with_capacity(ctx.project.css_icons.len());
        let mut bad = Vec::new();
        for (i, icon) in ctx.project.css_icons.iter().enumerate() {
            let id = match icon.fighter {
                Some(f) if f < fighter_count => ids::fighter_to_external(f, fighter_count) as u16,
                Some(f) => {
                    bad.push(format!("icon {i}: fighter {f} does not exist"));
                    NO_FIGHTER
                }
                None => NO_FIGHTER,
            };
            rows.push((id, icon.locked, icon.x, icon.y));
        }
        write_icon_table(&mut dat, TABLE_ROOT, &rows)?;
        for message in bad {
            ctx.warn(message);
        }

        let anim = find_tex_anim(&dat, ANIM_ROOT)?;
        let stride = fighter_count;
        let costume_rows = ctx
            .project
            .fighters
            .iter()
            .map(|f| f.costumes.len())
            .max()
            .unwrap_or(0)
            .max(1);

        let mut track = TrackBuilder::new();
        for internal in 0..fighter_count {
            let external = ids::fighter_to_external(internal, fighter_count);
            for costume in 0..costume_rows {
                let frame = strided_frame(external, stride, costume);
                let icon = ctx.project.fighters[internal]
                    .costumes
                    .get(costume)
                    .and_then(|c| c.css_icon.clone());
                let owner = format!(
                    "fighter {internal} ({}) costume {costume}",
                    ctx.project.fighters[internal].name
                );
                let value = match ctx.load_texture(&owner, icon.as_deref(), ICON_FORMAT, ICON_PALETTE) {
                    Some(texture) => track.add_image(ImageSource::Encoded(texture)),
                    None => 0,
                };
                track.key(frame, value);
            }
        }
        let keys = track.keys().len();
        track.write(&mut dat, anim)?;

        ctx.save_dat(TEMPLATE, &dat)?;
        info!(
            "Wrote {} select icons and {} costume icon keys (stride {})",
            rows.len(),
            keys,
            stride
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gen::lookup::fixtures::{menu_template, track_values};
    use crate::gen::testutil::{png, run_pass, store};
    use crate::project::{Costume, CssIcon, Fighter, Project};

    fn costume(icon: Option<&str>) -> Costume {
        Costume {
            css_icon: icon.map(str::to_string),
            ..Costume::default()
        }
    }

    #[test]
    fn costume_icons_use_strided_frames() {
        let (_dir, mut store) = store();
        store
            .set(TEMPLATE, menu_template("MnSlChr.usd", JOINT_ROOT, ANIM_ROOT, 2).to_bytes())
            .unwrap();
        store.set("assets/a0.png", png([255, 0, 0, 255])).unwrap();
        store.set("assets/a1.png", png([0, 255, 0, 255])).unwrap();
        store.set("assets/b0.png", png([0, 0, 255, 255])).unwrap();

        let mut project = Project {
            fighters: vec![
                Fighter {
                    name: "a".into(),
                    costumes: vec![costume(Some("assets/a0.png")), costume(Some("assets/a1.png"))],
                    ..Fighter::default()
                },
                Fighter {
                    name: "b".into(),
                    costumes: vec![costume(Some("assets/b0.png")), costume(Some("assets/gone.png"))],
                    ..Fighter::default()
                },
                Fighter { name: "c".into(), ..Fighter::default() },
            ],
            css_icons: vec![
                CssIcon { fighter: Some(1), x: 4.0, y: 2.0, locked: false },
                CssIcon { fighter: Some(9), ..CssIcon::default() },
            ],
            ..Project::default()
        };

        let (ran, warnings) = run_pass(&CssPass, &mut project, &mut store);
        assert!(ran);
        assert_eq!(warnings.len(), 2, "{warnings:?}");

        let dat = DatFile::parse("MnSlChr.usd", &store.get(TEMPLATE).unwrap()).unwrap();
        // Three fighters, two costume rows: frame = fighter + 3 * costume.
        assert_eq!(
            track_values(&dat, ANIM_ROOT),
            vec![(0.0, 1.0), (1.0, 3.0), (2.0, 0.0), (3.0, 2.0), (4.0, 0.0), (5.0, 0.0)]
        );

        let table = dat.require_root(TABLE_ROOT).unwrap();
        assert_eq!(dat.read::<u32>(table, 0, "IconTable").unwrap(), 2);
        assert_eq!(dat.read::<u16>(table, ICON_HEADER, "IconRow").unwrap(), 1);
        assert_eq!(dat.read::<f32>(table, ICON_HEADER + 0x08, "IconRow").unwrap(), 4.0);
        assert_eq!(dat.read::<u16>(table, ICON_HEADER + ICON_ROW, "IconRow").unwrap(), NO_FIGHTER);
    }
}
