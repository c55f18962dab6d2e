//! Helpers shared by the menu passes: strided texture tracks and icon
//! joint chains.

use crate::dat::fobj::{FObjKey, NumberFormat};
use crate::dat::kinds::{
    AnimObj, FObjDesc, ImageDesc, Joint, MatAnimJoint, TexAnim, TlutDesc, TRACK_TEXTURE_IMAGE,
    TRACK_TEXTURE_PALETTE,
};
use crate::dat::texture::Texture;
use crate::dat::{ChainRecord, DatFile, DatRecord, TreeRecord};
use crate::Result;

/// Frame of variant `variant` of the entity with ID `id` in a track whose
/// rows are `stride` frames long.
pub fn strided_frame(id: usize, stride: usize, variant: usize) -> usize {
    id + stride * variant
}

pub enum ImageSource {
    Encoded(Texture),
    /// An image already present in the archive.
    Existing(ImageDesc, Option<TlutDesc>),
}

/// Collects images and keys for one texture animation. Image 0 is always a
/// blank placeholder, so a key value of zero means "no image".
#[derive(Default)]
pub struct TrackBuilder {
    images: Vec<ImageSource>,
    keys: Vec<(usize, u32)>,
}

impl TrackBuilder {
    pub fn new() -> Self {
        TrackBuilder::default()
    }

    /// Adds an image and returns the key value that selects it.
    pub fn add_image(&mut self, image: ImageSource) -> u32 {
        self.images.push(image);
        self.images.len() as u32
    }

    pub fn key(&mut self, frame: usize, image: u32) {
        self.keys.push((frame, image));
    }

    pub fn keys(&self) -> &[(usize, u32)] {
        &self.keys
    }

    /// Replaces the image tables and the image/palette tracks of `anim`.
    /// Keys are written in ascending frame order.
    pub fn write(mut self, dat: &mut DatFile, anim: TexAnim) -> Result<()> {
        let (width, height) = match anim.images(dat)?.first().copied().flatten() {
            Some(first) => (first.width(dat)?.max(1), first.height(dat)?.max(1)),
            None => (8, 8),
        };

        let placeholder = Texture::blank(width, height)?;
        let (desc, tlut) = placeholder.write(dat)?;
        let mut images = vec![desc];
        let mut tluts = vec![tlut];
        for source in self.images {
            let (desc, tlut) = match source {
                ImageSource::Encoded(texture) => texture.write(dat)?,
                ImageSource::Existing(desc, tlut) => (desc, tlut),
            };
            images.push(desc);
            tluts.push(tlut);
        }
        anim.set_images(dat, &images, &tluts)?;

        self.keys.sort_by_key(|&(frame, _)| frame);
        let keys: Vec<FObjKey> = self
            .keys
            .iter()
            .map(|&(frame, image)| FObjKey::constant(frame as f32, image as f32))
            .collect();
        let format = NumberFormat::for_indices(images.len() as u32);
        let end_frame = self.keys.last().map_or(0, |&(frame, _)| frame + 1) as f32;

        let anim_obj = match anim.anim_obj(dat) {
            Some(obj) => obj,
            None => {
                let obj = AnimObj::create(dat);
                anim.set_anim_obj(dat, Some(obj));
                obj
            }
        };
        anim_obj.set_end_frame(dat, end_frame)?;

        let tracks: Vec<FObjDesc> = anim_obj.fobj(dat).map(|f| f.siblings(dat)).unwrap_or_default();
        let mut image_track = None;
        let mut palette_track = None;
        for track in tracks {
            match track.track_type(dat)? {
                TRACK_TEXTURE_IMAGE => image_track = image_track.or(Some(track)),
                TRACK_TEXTURE_PALETTE => palette_track = palette_track.or(Some(track)),
                _ => {}
            }
        }
        let image_track = match image_track {
            Some(track) => track,
            None => {
                let track = FObjDesc::create(dat);
                track.set_track_type(dat, TRACK_TEXTURE_IMAGE)?;
                track.set_next(dat, anim_obj.fobj(dat));
                anim_obj.set_fobj(dat, Some(track));
                track
            }
        };
        image_track.set_keys(dat, &keys, format)?;

        let has_palettes = tluts.iter().any(Option::is_some);
        match (palette_track, has_palettes) {
            (Some(track), _) => track.set_keys(dat, &keys, format)?,
            (None, true) => {
                let track = FObjDesc::create(dat);
                track.set_track_type(dat, TRACK_TEXTURE_PALETTE)?;
                track.set_next(dat, image_track.next(dat));
                image_track.set_next(dat, Some(track));
                track.set_keys(dat, &keys, format)?;
            }
            (None, false) => {}
        }
        Ok(())
    }
}

/// First texture animation under the material animation tree at `root`.
pub fn find_tex_anim(dat: &DatFile, root: &str) -> Result<TexAnim> {
    let root = MatAnimJoint::wrap(dat, dat.require_root(root)?)?;
    for joint in root.descendants(dat) {
        let Some(first) = joint.mat_anim(dat) else { continue };
        for mat_anim in first.siblings(dat) {
            if let Some(tex_anim) = mat_anim.tex_anim(dat) {
                return Ok(tex_anim);
            }
        }
    }
    Err(dat.missing_reference(MatAnimJoint::NAME, 0x08).into())
}

/// Rebuilds the children of the joint at `root` so there is one icon joint
/// per position. New joints are copies of the first existing child.
pub fn rebuild_icon_joints(dat: &mut DatFile, root: &str, positions: &[(f32, f32)]) -> Result<Vec<Joint>> {
    let root = Joint::wrap(dat, dat.require_root(root)?)?;
    let template = root.child(dat);

    let mut joints = Vec::with_capacity(positions.len());
    for &(x, y) in positions {
        let joint = match template {
            Some(template) => Joint(dat.clone_node(template.node())),
            None => {
                let joint = Joint::create(dat);
                joint.set_scale(dat, 1.0, 1.0, 1.0)?;
                joint
            }
        };
        joint.set_translation_x(dat, x)?;
        joint.set_translation_y(dat, y)?;
        joints.push(joint);
    }
    Joint::link_chain(dat, &joints);
    root.set_child(dat, joints.first().copied());
    Ok(joints)
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn strided_frames_do_not_collide() {
        let stride = 5;
        let mut frames: Vec<usize> = (0..stride)
            .flat_map(|id| (0..3).map(move |v| strided_frame(id, stride, v)))
            .collect();
        frames.sort_unstable();
        frames.dedup();
        assert_eq!(frames, (0..15).collect::<Vec<_>>());
    }

    #[test]
    fn track_builder_sorts_keys_and_prepends_placeholder() {
        let mut dat = menu_template("t.usd", "joint", "anim", 2);
        let anim = find_tex_anim(&dat, "anim").unwrap();
        let existing = anim.images(&dat).unwrap();

        let mut track = TrackBuilder::new();
        let a = track.add_image(ImageSource::Existing(existing[1].unwrap(), None));
        let b = track.add_image(ImageSource::Existing(existing[0].unwrap(), None));
        track.key(7, a);
        track.key(2, b);
        track.key(4, 0);
        track.write(&mut dat, anim).unwrap();

        let parsed = DatFile::parse("t.usd", &dat.to_bytes()).unwrap();
        assert_eq!(track_values(&parsed, "anim"), vec![(2.0, 2.0), (4.0, 0.0), (7.0, 1.0)]);
        let anim = find_tex_anim(&parsed, "anim").unwrap();
        assert_eq!(anim.image_count(&parsed).unwrap(), 3);
        assert_eq!(anim.anim_obj(&parsed).unwrap().end_frame(&parsed).unwrap(), 8.0);
    }

    #[test]
    fn icon_joints_follow_positions() {
        let mut dat = menu_template("t.usd", "joint", "anim", 1);
        let joints = rebuild_icon_joints(&mut dat, "joint", &[(1.0, 2.0), (3.0, 4.0), (5.0, 6.0)]).unwrap();
        assert_eq!(joints.len(), 3);

        let parsed = DatFile::parse("t.usd", &dat.to_bytes()).unwrap();
        let root = Joint(parsed.root("joint").unwrap());
        let children = root.children(&parsed);
        assert_eq!(children.len(), 3);
        assert_eq!(children[1].translation_y(&parsed).unwrap(), 4.0);
        assert_eq!(children[2].scale_x(&parsed).unwrap(), 1.0);
    }

    #[test]
    fn missing_animation_root_is_an_error() {
        let dat = menu_template("t.usd", "joint", "anim", 1);
        assert!(find_tex_anim(&dat, "other").is_err());
    }
}
