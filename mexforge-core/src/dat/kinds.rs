//! Scene, material animation and texture records.

use super::record::{dat_record, reference_fields, scalar_fields, Buffer};
use super::{ChainRecord, DatFile, DatResult, NodeId, TreeRecord};

dat_record!(
    /// Scene joint: transform plus child/sibling links.
    Joint,
    0x40
);

scalar_fields!(Joint {
    flags, set_flags: u32 = 0x04;
    rotation_x, set_rotation_x: f32 = 0x14;
    rotation_y, set_rotation_y: f32 = 0x18;
    rotation_z, set_rotation_z: f32 = 0x1C;
    scale_x, set_scale_x: f32 = 0x20;
    scale_y, set_scale_y: f32 = 0x24;
    scale_z, set_scale_z: f32 = 0x28;
    translation_x, set_translation_x: f32 = 0x2C;
    translation_y, set_translation_y: f32 = 0x30;
    translation_z, set_translation_z: f32 = 0x34;
});

reference_fields!(Joint {
    class_name, set_class_name: Buffer = 0x00;
    display_object, set_display_object: Buffer = 0x10;
    inverse_world, set_inverse_world: Buffer = 0x38;
});

impl ChainRecord for Joint {
    const NEXT: usize = 0x0C;
}

impl TreeRecord for Joint {
    const CHILD: usize = 0x08;
}

impl Joint {
    pub fn set_translation(self, dat: &mut DatFile, x: f32, y: f32, z: f32) -> DatResult<()> {
        self.set_translation_x(dat, x)?;
        self.set_translation_y(dat, y)?;
        self.set_translation_z(dat, z)
    }

    pub fn set_scale(self, dat: &mut DatFile, x: f32, y: f32, z: f32) -> DatResult<()> {
        self.set_scale_x(dat, x)?;
        self.set_scale_y(dat, y)?;
        self.set_scale_z(dat, z)
    }
}

dat_record!(MatAnimJoint, 0x0C);

reference_fields!(MatAnimJoint {
    mat_anim, set_mat_anim: MatAnim = 0x08;
});

impl ChainRecord for MatAnimJoint {
    const NEXT: usize = 0x04;
}

impl TreeRecord for MatAnimJoint {
    const CHILD: usize = 0x00;
}

dat_record!(MatAnim, 0x10);

reference_fields!(MatAnim {
    anim_obj, set_anim_obj: AnimObj = 0x04;
    tex_anim, set_tex_anim: TexAnim = 0x08;
    render_anim, set_render_anim: Buffer = 0x0C;
});

impl ChainRecord for MatAnim {
    const NEXT: usize = 0x00;
}

dat_record!(
    /// Texture animation: an image table, a palette table and the track
    /// that picks entries from them per frame.
    TexAnim,
    0x18
);

scalar_fields!(TexAnim {
    tex_map_id, set_tex_map_id: u32 = 0x04;
    image_count, set_image_count: u16 = 0x14;
    tlut_count, set_tlut_count: u16 = 0x16;
});

reference_fields!(TexAnim {
    anim_obj, set_anim_obj: AnimObj = 0x08;
    image_table, set_image_table: Buffer = 0x0C;
    tlut_table, set_tlut_table: Buffer = 0x10;
});

impl ChainRecord for TexAnim {
    const NEXT: usize = 0x00;
}

impl TexAnim {
    pub fn images(self, dat: &DatFile) -> DatResult<Vec<Option<ImageDesc>>> {
        let count = self.image_count(dat)? as usize;
        Ok(match self.image_table(dat) {
            Some(table) => dat
                .reference_array(table.0, 0, count)
                .into_iter()
                .map(|r| r.map(ImageDesc))
                .collect(),
            None => vec![None; count],
        })
    }

    pub fn tluts(self, dat: &DatFile) -> DatResult<Vec<Option<TlutDesc>>> {
        let count = self.tlut_count(dat)? as usize;
        Ok(match self.tlut_table(dat) {
            Some(table) => dat
                .reference_array(table.0, 0, count)
                .into_iter()
                .map(|r| r.map(TlutDesc))
                .collect(),
            None => vec![None; count],
        })
    }

    /// Replaces both tables. Palette entries line up with images; direct
    /// color images leave their palette slot empty.
    pub fn set_images(
        self,
        dat: &mut DatFile,
        images: &[ImageDesc],
        tluts: &[Option<TlutDesc>],
    ) -> DatResult<()> {
        let image_refs: Vec<Option<NodeId>> = images.iter().map(|i| Some(i.0)).collect();
        let table = dat.alloc_reference_array(&image_refs);
        self.set_image_table(dat, Some(Buffer(table)));
        self.set_image_count(dat, images.len() as u16)?;

        if tluts.iter().any(Option::is_some) {
            let tlut_refs: Vec<Option<NodeId>> = tluts.iter().map(|t| t.map(|t| t.0)).collect();
            let table = dat.alloc_reference_array(&tlut_refs);
            self.set_tlut_table(dat, Some(Buffer(table)));
            self.set_tlut_count(dat, tluts.len() as u16)?;
        } else {
            self.set_tlut_table(dat, None);
            self.set_tlut_count(dat, 0)?;
        }
        Ok(())
    }
}

dat_record!(AnimObj, 0x10);

scalar_fields!(AnimObj {
    flags, set_flags: u32 = 0x00;
    end_frame, set_end_frame: f32 = 0x04;
});

reference_fields!(AnimObj {
    fobj, set_fobj: FObjDesc = 0x08;
});

dat_record!(
    /// One animated track: a packed key stream and its encoding flags.
    FObjDesc,
    0x14
);

scalar_fields!(FObjDesc {
    data_length, set_data_length: u32 = 0x04;
    start_frame, set_start_frame: f32 = 0x08;
    track_type, set_track_type: u8 = 0x0C;
    value_flag, set_value_flag: u8 = 0x0D;
    tangent_flag, set_tangent_flag: u8 = 0x0E;
});

reference_fields!(FObjDesc {
    buffer, set_buffer: Buffer = 0x10;
});

impl ChainRecord for FObjDesc {
    const NEXT: usize = 0x00;
}

/// Texture track types used by material animations.
pub const TRACK_TEXTURE_IMAGE: u8 = 1;
pub const TRACK_TEXTURE_PALETTE: u8 = 10;

dat_record!(ImageDesc, 0x18);

scalar_fields!(ImageDesc {
    width, set_width: u16 = 0x04;
    height, set_height: u16 = 0x06;
    format, set_format: u32 = 0x08;
    mipmap, set_mipmap: u32 = 0x0C;
    min_lod, set_min_lod: f32 = 0x10;
    max_lod, set_max_lod: f32 = 0x14;
});

reference_fields!(ImageDesc {
    buffer, set_buffer: Buffer = 0x00;
});

dat_record!(TlutDesc, 0x1C);

scalar_fields!(TlutDesc {
    format, set_format: u32 = 0x04;
    tlut_name, set_tlut_name: u32 = 0x08;
    color_count, set_color_count: u16 = 0x0C;
});

reference_fields!(TlutDesc {
    buffer, set_buffer: Buffer = 0x00;
});

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dat::DatRecord;

    #[test]
    fn joint_tree_survives_write_and_parse() {
        let mut dat = DatFile::new("MnSlChr.usd");
        let root = Joint::create(&mut dat);
        let icons: Vec<Joint> = (0..3).map(|_| Joint::create(&mut dat)).collect();
        for (i, icon) in icons.iter().enumerate() {
            icon.set_translation(&mut dat, i as f32, 2.0, 0.0).unwrap();
        }
        Joint::link_chain(&mut dat, &icons);
        root.set_child(&mut dat, Some(icons[0]));
        dat.set_root("icon_joint", root.0);

        let parsed = DatFile::parse("MnSlChr.usd", &dat.to_bytes()).unwrap();
        let root = Joint::wrap(&parsed, parsed.require_root("icon_joint").unwrap()).unwrap();
        let children = root.children(&parsed);
        assert_eq!(children.len(), 3);
        assert_eq!(children[2].translation_x(&parsed).unwrap(), 2.0);
        assert_eq!(root.descendants(&parsed).len(), 4);
    }

    #[test]
    fn tex_anim_tables() {
        let mut dat = DatFile::new("t.dat");
        let anim = TexAnim::create(&mut dat);
        let images: Vec<ImageDesc> = (0..2).map(|_| ImageDesc::create(&mut dat)).collect();
        let tlut = TlutDesc::create(&mut dat);
        anim.set_images(&mut dat, &images, &[None, Some(tlut)]).unwrap();

        let read: Vec<ImageDesc> = anim.images(&dat).unwrap().into_iter().flatten().collect();
        assert_eq!(read, images);
        assert_eq!(anim.tluts(&dat).unwrap(), vec![None, Some(tlut)]);

        anim.set_images(&mut dat, &images[..1], &[None]).unwrap();
        assert_eq!(anim.tlut_count(&dat).unwrap(), 0);
        assert!(anim.tlut_table(&dat).is_none());
    }
}
