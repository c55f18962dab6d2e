//! Stage select screen: icon placement and the strided icon/name-tag
//! track (`external_id + stride * variant`).

use log::info;

use super::css::write_icon_table;
use super::lookup::{find_tex_anim, rebuild_icon_joints, strided_frame, ImageSource, TrackBuilder};
use super::{Generator, PassContext};
use crate::dat::texture::{PaletteFormat, TextureFormat};
use crate::ids;
use crate::Result;

pub const TEMPLATE: &str = "files/MnSlMap.usd";
pub const JOINT_ROOT: &str = "MnSlMap_icon_joint";
pub const ANIM_ROOT: &str = "MnSlMap_icon_matanim_joint";
pub const TABLE_ROOT: &str = "MnSlMap_icon_table";

pub const VARIANT_ICON: usize = 0;
pub const VARIANT_NAME_TAG: usize = 1;
const VARIANTS: usize = 2;

pub const NO_STAGE: u16 = 0xFFFF;

/// Row length of the stage track: the largest external ID in use plus one,
/// not the stage count. Stage external IDs are a permutation that can
/// exceed the stage count, and a stride of the count would let the last
/// stages of one row collide with the first of the next.
pub fn stage_stride(stage_count: usize) -> usize {
    (0..stage_count)
        .map(ids::stage_to_external)
        .max()
        .map_or(0, |max| max + 1)
}

pub struct SssPass;

impl Generator for SssPass {
    fn name(&self) -> &'static str {
        "sss"
    }

    fn run(&self, ctx: &mut PassContext) -> Result<bool> {
        let Some(mut dat) = ctx.load_template(TEMPLATE)? else {
            return Ok(false);
        };

        let stage_count = ctx.project.stages.len();
        let positions: Vec<(f32, f32)> = ctx.project.sss_icons.iter().map(|i| (i.x, i.y)).collect();
        rebuild_icon_joints(&mut dat, JOINT_ROOT, &positions)?;

        let mut rows = Vec::with_capacity(ctx.project.sss_icons.len());
        let mut bad = Vec::new();
        for (i, icon) in ctx.project.sss_icons.iter().enumerate() {
            let id = match icon.stage {
                Some(s) if s < stage_count => ids::stage_to_external(s) as u16,
                Some(s) => {
                    bad.push(format!("icon {i}: stage {s} does not exist"));
                    NO_STAGE
                }
                None => NO_STAGE,
            };
            rows.push((id, icon.locked, icon.x, icon.y));
        }
        write_icon_table(&mut dat, TABLE_ROOT, &rows)?;
        for message in bad {
            ctx.warn(message);
        }

        let anim = find_tex_anim(&dat, ANIM_ROOT)?;
        let stride = stage_stride(stage_count);
        let mut track = TrackBuilder::new();
        for internal in 0..stage_count {
            let external = ids::stage_to_external(internal);
            let stage = &ctx.project.stages[internal];
            let owner = format!("stage {internal} ({})", stage.name);
            let sources = [
                (VARIANT_ICON, stage.icon.clone(), "icon", TextureFormat::Ci8),
                (VARIANT_NAME_TAG, stage.name_tag.clone(), "name tag", TextureFormat::IA4),
            ];
            for (variant, path, what, format) in sources {
                let frame = strided_frame(external, stride, variant);
                let value = match ctx.load_texture(&format!("{owner} {what}"), path.as_deref(), format, PaletteFormat::Rgb5a3) {
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
            "Wrote {} stage icons and {} icon keys ({} variants, stride {})",
            rows.len(),
            keys,
            VARIANTS,
            stride
        );
        Ok(true)
    }
}
