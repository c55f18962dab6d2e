//! Results screen banners. Each fighter's banner is keyed by its external
//! ID; four reserved team/no-contest banners follow the roster and are
//! carried over from the template.

use log::info;

use super::lookup::{find_tex_anim, ImageSource, TrackBuilder};
use super::{Generator, PassContext};
use crate::dat::texture::{PaletteFormat, TextureFormat};
use crate::ids;
use crate::Result;

pub const TEMPLATE: &str = "files/GmRst.usd";
pub const ANIM_ROOT: &str = "GmRst_banner_matanim_joint";

/// Banners kept after the roster: red, blue and green team, no contest.
pub const RESERVED_BANNERS: usize = 4;

pub const BANNER_FORMAT: TextureFormat = TextureFormat::IA8;

pub struct ResultPass;

impl Generator for ResultPass {
    fn name(&self) -> &'static str {
        "result"
    }

    fn run(&self, ctx: &mut PassContext) -> Result<bool> {
        let Some(mut dat) = ctx.load_template(TEMPLATE)? else {
            return Ok(false);
        };
        let anim = find_tex_anim(&dat, ANIM_ROOT)?;
        let existing = anim.images(&dat)?;
        let existing_tluts = anim.tluts(&dat)?;

        let fighter_count = ctx.project.fighters.len();
        let mut track = TrackBuilder::new();
        for internal in 0..fighter_count {
            let fighter = &ctx.project.fighters[internal];
            let owner = format!("fighter {internal} ({}) banner", fighter.name);
            let path = fighter.result_banner.clone();
            let value = match ctx.load_texture(&owner, path.as_deref(), BANNER_FORMAT, PaletteFormat::Rgb5a3) {
                Some(texture) => track.add_image(ImageSource::Encoded(texture)),
                None => 0,
            };
            track.key(ids::fighter_to_external(internal, fighter_count), value);
        }

        // The reserved banners are the last images of the template table.
        let first_reserved = existing.len().saturating_sub(RESERVED_BANNERS);
        let mut carried = 0;
        for slot in 0..RESERVED_BANNERS {
            let source = existing.get(first_reserved + slot).copied().flatten();
            let value = match source {
                Some(desc) if existing.len() >= RESERVED_BANNERS => {
                    carried += 1;
                    let tlut = existing_tluts.get(first_reserved + slot).copied().flatten();
                    track.add_image(ImageSource::Existing(desc, tlut))
                }
                _ => 0,
            };
            track.key(fighter_count + slot, value);
        }
        if carried < RESERVED_BANNERS {
            ctx.warn(format!(
                "template has {} banner images, {} reserved banners left blank",
                existing.len(),
                RESERVED_BANNERS - carried
            ));
        }

        track.write(&mut dat, anim)?;
        ctx.save_dat(TEMPLATE, &dat)?;
        info!("Wrote {} result banners", fighter_count + RESERVED_BANNERS);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dat::DatFile;
    use crate::gen::lookup::fixtures::{menu_template, track_values};
    use crate::gen::testutil::{png, run_pass, store};
    use crate::project::{Fighter, Project};

    fn roster(count: usize) -> Project {
        Project {
            fighters: (0..count)
                .map(|i| Fighter {
                    name: format!("f{i}"),
                    result_banner: (i == 0).then(|| "assets/banner.png".to_string()),
                    ..Fighter::default()
                })
                .collect(),
            ..Project::default()
        }
    }

    #[test]
    fn keys_are_sorted_and_reserved_slots_follow_roster() {
        let (_dir, mut store) = store();
        store
            .set(TEMPLATE, menu_template("GmRst.usd", "joint", ANIM_ROOT, 6).to_bytes())
            .unwrap();
        store.set("assets/banner.png", png([200, 200, 200, 255])).unwrap();
        let mut project = roster(ids::VANILLA_FIGHTER_COUNT);

        let (ran, warnings) = run_pass(&ResultPass, &mut project, &mut store);
        assert!(ran);
        assert!(warnings.is_empty(), "{warnings:?}");

        let dat = DatFile::parse("GmRst.usd", &store.get(TEMPLATE).unwrap()).unwrap();
        let keys = track_values(&dat, ANIM_ROOT);
        assert_eq!(keys.len(), ids::VANILLA_FIGHTER_COUNT + RESERVED_BANNERS);
        assert!(keys.windows(2).all(|w| w[0].0 < w[1].0));

        // Fighter 0 sits on external ID 8 and owns image 1.
        assert_eq!(keys[8], (8.0, 1.0));
        let n = ids::VANILLA_FIGHTER_COUNT as f32;
        assert_eq!(&keys[keys.len() - 4..], &[(n, 2.0), (n + 1.0, 3.0), (n + 2.0, 4.0), (n + 3.0, 5.0)]);
    }

    #[test]
    fn short_template_leaves_reserved_slots_blank() {
        let (_dir, mut store) = store();
        store
            .set(TEMPLATE, menu_template("GmRst.usd", "joint", ANIM_ROOT, 2).to_bytes())
            .unwrap();
        let mut project = roster(2);
        project.fighters[0].result_banner = None;

        let (_, warnings) = run_pass(&ResultPass, &mut project, &mut store);
        assert_eq!(warnings.len(), 1);
        let dat = DatFile::parse("GmRst.usd", &store.get(TEMPLATE).unwrap()).unwrap();
        assert!(track_values(&dat, ANIM_ROOT).iter().all(|&(_, v)| v == 0.0));
    }
}
