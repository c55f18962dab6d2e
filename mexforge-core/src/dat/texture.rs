//! GX texture codec.
//!
//! Converts between `image::RgbaImage` and the tiled pixel layouts the
//! console's texture unit reads. Paletted formats quantize, so the first
//! encode of an arbitrary image is lossy; encoding an image that already
//! came out of a decode reproduces it exactly.

use std::collections::HashMap;
use std::io::Cursor;

use image::{ImageFormat, RgbaImage};
use thiserror::Error;

use super::kinds::{ImageDesc, TlutDesc};
use super::record::Buffer;
use super::{DatError, DatFile, DatRecord};

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("texture format {0} is not supported")]
    UnsupportedFormat(u32),
    #[error("palette format {0} is not supported")]
    UnsupportedPalette(u32),
    #[error("paletted image has no palette")]
    MissingPalette,
    #[error("invalid texture size {width}x{height}")]
    BadDimensions { width: u32, height: u32 },
    #[error("pixel data is truncated (needs {needed} bytes, has {available})")]
    Truncated { needed: usize, available: usize },
    #[error("palette index {index} is past the end of a {len}-entry palette")]
    BadIndex { index: usize, len: usize },
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Dat(#[from] DatError),
}

pub type TextureResult<T> = std::result::Result<T, TextureError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    I4,
    I8,
    IA4,
    IA8,
    Rgb565,
    Rgb5a3,
    Rgba8,
    Ci4,
    Ci8,
}

impl TextureFormat {
    pub fn from_id(id: u32) -> TextureResult<Self> {
        Ok(match id {
            0 => TextureFormat::I4,
            1 => TextureFormat::I8,
            2 => TextureFormat::IA4,
            3 => TextureFormat::IA8,
            4 => TextureFormat::Rgb565,
            5 => TextureFormat::Rgb5a3,
            6 => TextureFormat::Rgba8,
            8 => TextureFormat::Ci4,
            9 => TextureFormat::Ci8,
            // CI14X2 (10) and CMPR (14) are not encoded.
            other => return Err(TextureError::UnsupportedFormat(other)),
        })
    }

    pub fn id(self) -> u32 {
        match self {
            TextureFormat::I4 => 0,
            TextureFormat::I8 => 1,
            TextureFormat::IA4 => 2,
            TextureFormat::IA8 => 3,
            TextureFormat::Rgb565 => 4,
            TextureFormat::Rgb5a3 => 5,
            TextureFormat::Rgba8 => 6,
            TextureFormat::Ci4 => 8,
            TextureFormat::Ci8 => 9,
        }
    }

    pub fn is_paletted(self) -> bool {
        matches!(self, TextureFormat::Ci4 | TextureFormat::Ci8)
    }

    fn max_colors(self) -> usize {
        match self {
            TextureFormat::Ci4 => 16,
            _ => 256,
        }
    }

    /// Block width, block height and bits per pixel.
    fn block(self) -> (usize, usize, usize) {
        match self {
            TextureFormat::I4 | TextureFormat::Ci4 => (8, 8, 4),
            TextureFormat::I8 | TextureFormat::IA4 | TextureFormat::Ci8 => (8, 4, 8),
            TextureFormat::IA8 | TextureFormat::Rgb565 | TextureFormat::Rgb5a3 => (4, 4, 16),
            TextureFormat::Rgba8 => (4, 4, 32),
        }
    }

    pub fn encoded_size(self, width: usize, height: usize) -> usize {
        let (bw, bh, bits) = self.block();
        align(width, bw) * align(height, bh) * bits / 8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaletteFormat {
    Ia8,
    Rgb565,
    Rgb5a3,
}

impl PaletteFormat {
    pub fn from_id(id: u32) -> TextureResult<Self> {
        Ok(match id {
            0 => PaletteFormat::Ia8,
            1 => PaletteFormat::Rgb565,
            2 => PaletteFormat::Rgb5a3,
            other => return Err(TextureError::UnsupportedPalette(other)),
        })
    }

    pub fn id(self) -> u32 {
        match self {
            PaletteFormat::Ia8 => 0,
            PaletteFormat::Rgb565 => 1,
            PaletteFormat::Rgb5a3 => 2,
        }
    }

    fn encode(self, c: [u8; 4]) -> u16 {
        match self {
            PaletteFormat::Ia8 => encode_ia8(c),
            PaletteFormat::Rgb565 => encode_rgb565(c),
            PaletteFormat::Rgb5a3 => encode_rgb5a3(c),
        }
    }

    fn decode(self, code: u16) -> [u8; 4] {
        match self {
            PaletteFormat::Ia8 => decode_ia8(code),
            PaletteFormat::Rgb565 => decode_rgb565(code),
            PaletteFormat::Rgb5a3 => decode_rgb5a3(code),
        }
    }

    fn snap(self, c: [u8; 4]) -> [u8; 4] {
        self.decode(self.encode(c))
    }
}

fn align(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) / alignment * alignment
}

fn intensity(c: [u8; 4]) -> u8 {
    ((c[0] as u32 * 299 + c[1] as u32 * 587 + c[2] as u32 * 114 + 500) / 1000) as u8
}

fn expand3(v: u8) -> u8 {
    (v << 5) | (v << 2) | (v >> 1)
}

fn expand4(v: u8) -> u8 {
    v * 17
}

fn expand5(v: u8) -> u8 {
    (v << 3) | (v >> 2)
}

fn expand6(v: u8) -> u8 {
    (v << 2) | (v >> 4)
}

fn encode_ia8(c: [u8; 4]) -> u16 {
    ((c[3] as u16) << 8) | intensity(c) as u16
}

fn decode_ia8(code: u16) -> [u8; 4] {
    let i = code as u8;
    [i, i, i, (code >> 8) as u8]
}

fn encode_rgb565(c: [u8; 4]) -> u16 {
    ((c[0] as u16 >> 3) << 11) | ((c[1] as u16 >> 2) << 5) | (c[2] as u16 >> 3)
}

fn decode_rgb565(code: u16) -> [u8; 4] {
    [
        expand5((code >> 11) as u8 & 0x1F),
        expand6((code >> 5) as u8 & 0x3F),
        expand5(code as u8 & 0x1F),
        0xFF,
    ]
}

fn encode_rgb5a3(c: [u8; 4]) -> u16 {
    if c[3] >= 0xE0 {
        0x8000 | ((c[0] as u16 >> 3) << 10) | ((c[1] as u16 >> 3) << 5) | (c[2] as u16 >> 3)
    } else {
        ((c[3] as u16 >> 5) << 12) | ((c[0] as u16 >> 4) << 8) | ((c[1] as u16 >> 4) << 4) | (c[2] as u16 >> 4)
    }
}

fn decode_rgb5a3(code: u16) -> [u8; 4] {
    if code & 0x8000 != 0 {
        [
            expand5((code >> 10) as u8 & 0x1F),
            expand5((code >> 5) as u8 & 0x1F),
            expand5(code as u8 & 0x1F),
            0xFF,
        ]
    } else {
        [
            expand4((code >> 8) as u8 & 0x0F),
            expand4((code >> 4) as u8 & 0x0F),
            expand4(code as u8 & 0x0F),
            expand3((code >> 12) as u8 & 0x07),
        ]
    }
}

/// Pixel coordinates in the order the texture unit stores them. Padding
/// pixels outside the image are `None`.
fn tile_positions(width: usize, height: usize, bw: usize, bh: usize) -> Vec<Option<(u32, u32)>> {
    let mut out = Vec::with_capacity(align(width, bw) * align(height, bh));
    for by in (0..height).step_by(bh) {
        for bx in (0..width).step_by(bw) {
            for y in by..by + bh {
                for x in bx..bx + bw {
                    out.push((x < width && y < height).then_some((x as u32, y as u32)));
                }
            }
        }
    }
    out
}

fn pack(codes: &[u16], bits: usize) -> Vec<u8> {
    match bits {
        4 => codes
            .chunks(2)
            .map(|pair| ((pair[0] as u8 & 0x0F) << 4) | (pair.get(1).copied().unwrap_or(0) as u8 & 0x0F))
            .collect(),
        8 => codes.iter().map(|&c| c as u8).collect(),
        _ => codes.iter().flat_map(|&c| c.to_be_bytes()).collect(),
    }
}

fn unpack(bytes: &[u8], bits: usize, count: usize) -> Vec<u16> {
    match bits {
        4 => bytes
            .iter()
            .flat_map(|&b| [(b >> 4) as u16, (b & 0x0F) as u16])
            .take(count)
            .collect(),
        8 => bytes.iter().take(count).map(|&b| b as u16).collect(),
        _ => bytes
            .chunks_exact(2)
            .take(count)
            .map(|p| u16::from_be_bytes([p[0], p[1]]))
            .collect(),
    }
}

/// Builds a palette of at most `max` entries for `colors`, which must
/// already be snapped to the palette format.
fn build_palette(colors: &[[u8; 4]], max: usize, format: PaletteFormat) -> Vec<[u8; 4]> {
    let mut counts: Vec<([u8; 4], u64)> = Vec::new();
    let mut index: HashMap<[u8; 4], usize> = HashMap::new();
    for &c in colors {
        match index.get(&c) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(c, counts.len());
                counts.push((c, 1));
            }
        }
    }
    if counts.len() <= max {
        return counts.into_iter().map(|(c, _)| c).collect();
    }

    let mut boxes = vec![counts];
    while boxes.len() < max {
        let mut best: Option<(usize, usize, u8)> = None;
        for (i, b) in boxes.iter().enumerate() {
            if b.len() < 2 {
                continue;
            }
            for channel in 0..4 {
                let lo = b.iter().map(|(c, _)| c[channel]).min().unwrap_or(0);
                let hi = b.iter().map(|(c, _)| c[channel]).max().unwrap_or(0);
                if best.map_or(true, |(_, _, range)| hi - lo > range) {
                    best = Some((i, channel, hi - lo));
                }
            }
        }
        let Some((i, channel, _)) = best else { break };

        let mut b = boxes.remove(i);
        b.sort_by_key(|(c, _)| (c[channel], *c));
        let total: u64 = b.iter().map(|(_, n)| n).sum();
        let mut seen = 0;
        let mut split = 1;
        for (k, (_, n)) in b.iter().enumerate() {
            seen += n;
            if seen * 2 >= total {
                split = k + 1;
                break;
            }
        }
        let split = split.clamp(1, b.len() - 1);
        let upper = b.split_off(split);
        boxes.insert(i, upper);
        boxes.insert(i, b);
    }

    boxes
        .iter()
        .map(|b| {
            let total: u64 = b.iter().map(|(_, n)| n).sum();
            let mut avg = [0u8; 4];
            for (channel, out) in avg.iter_mut().enumerate() {
                let sum: u64 = b.iter().map(|(c, n)| c[channel] as u64 * n).sum();
                *out = ((sum + total / 2) / total.max(1)) as u8;
            }
            format.snap(avg)
        })
        .collect()
}

/// Lowest-index palette entry closest to `c`.
fn nearest(palette: &[[u8; 4]], c: [u8; 4]) -> usize {
    let mut best = 0;
    let mut best_dist = u32::MAX;
    for (i, p) in palette.iter().enumerate() {
        let dist: u32 = (0..4)
            .map(|k| {
                let d = p[k] as i32 - c[k] as i32;
                (d * d) as u32
            })
            .sum();
        if dist < best_dist {
            best = i;
            best_dist = dist;
        }
    }
    best
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture {
    pub width: u16,
    pub height: u16,
    pub format: TextureFormat,
    pub palette_format: PaletteFormat,
    pub pixels: Vec<u8>,
    /// Encoded palette entries; empty for direct color formats.
    pub palette: Vec<u8>,
}

impl Texture {
    pub fn encode(image: &RgbaImage, format: TextureFormat, palette_format: PaletteFormat) -> TextureResult<Texture> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 || width > 1024 || height > 1024 {
            return Err(TextureError::BadDimensions { width, height });
        }
        let (bw, bh, bits) = format.block();
        let positions = tile_positions(width as usize, height as usize, bw, bh);
        let color = |pos: Option<(u32, u32)>| pos.map_or([0; 4], |(x, y)| image.get_pixel(x, y).0);

        let mut palette = Vec::new();
        let pixels = match format {
            TextureFormat::Rgba8 => {
                let mut out = Vec::with_capacity(positions.len() * 4);
                for block in positions.chunks(16) {
                    let colors: Vec<[u8; 4]> = block.iter().map(|&p| color(p)).collect();
                    for c in &colors {
                        out.extend_from_slice(&[c[3], c[0]]);
                    }
                    for c in &colors {
                        out.extend_from_slice(&[c[1], c[2]]);
                    }
                }
                out
            }
            TextureFormat::Ci4 | TextureFormat::Ci8 => {
                let snapped: Vec<[u8; 4]> = image.pixels().map(|p| palette_format.snap(p.0)).collect();
                let entries = build_palette(&snapped, format.max_colors(), palette_format);
                let mut lookup: HashMap<[u8; 4], u16> = HashMap::new();
                let codes: Vec<u16> = positions
                    .iter()
                    .map(|&pos| match pos {
                        Some((x, y)) => {
                            let c = snapped[(y * width + x) as usize];
                            *lookup.entry(c).or_insert_with(|| nearest(&entries, c) as u16)
                        }
                        None => 0,
                    })
                    .collect();
                palette = entries
                    .iter()
                    .flat_map(|&c| palette_format.encode(c).to_be_bytes())
                    .collect();
                pack(&codes, bits)
            }
            _ => {
                let codes: Vec<u16> = positions
                    .iter()
                    .map(|&pos| {
                        let c = color(pos);
                        match format {
                            TextureFormat::I4 => (intensity(c) >> 4) as u16,
                            TextureFormat::I8 => intensity(c) as u16,
                            TextureFormat::IA4 => (((c[3] >> 4) << 4) | (intensity(c) >> 4)) as u16,
                            TextureFormat::IA8 => encode_ia8(c),
                            TextureFormat::Rgb565 => encode_rgb565(c),
                            _ => encode_rgb5a3(c),
                        }
                    })
                    .collect();
                pack(&codes, bits)
            }
        };

        Ok(Texture {
            width: width as u16,
            height: height as u16,
            format,
            palette_format,
            pixels,
            palette,
        })
    }

    pub fn decode(&self) -> TextureResult<RgbaImage> {
        let (width, height) = (self.width as usize, self.height as usize);
        if width == 0 || height == 0 {
            return Err(TextureError::BadDimensions {
                width: width as u32,
                height: height as u32,
            });
        }
        let needed = self.format.encoded_size(width, height);
        if self.pixels.len() < needed {
            return Err(TextureError::Truncated {
                needed,
                available: self.pixels.len(),
            });
        }
        let (bw, bh, bits) = self.format.block();
        let positions = tile_positions(width, height, bw, bh);
        let mut image = RgbaImage::new(width as u32, height as u32);

        if self.format == TextureFormat::Rgba8 {
            for (block, bytes) in positions.chunks(16).zip(self.pixels.chunks_exact(64)) {
                for (i, pos) in block.iter().enumerate() {
                    if let Some((x, y)) = *pos {
                        let ar = &bytes[i * 2..i * 2 + 2];
                        let gb = &bytes[32 + i * 2..32 + i * 2 + 2];
                        image.put_pixel(x, y, image::Rgba([ar[1], gb[0], gb[1], ar[0]]));
                    }
                }
            }
            return Ok(image);
        }

        let codes = unpack(&self.pixels, bits, positions.len());
        let palette: Vec<[u8; 4]> = if self.format.is_paletted() {
            if self.palette.is_empty() {
                return Err(TextureError::MissingPalette);
            }
            self.palette
                .chunks_exact(2)
                .map(|p| self.palette_format.decode(u16::from_be_bytes([p[0], p[1]])))
                .collect()
        } else {
            Vec::new()
        };

        for (pos, &code) in positions.iter().zip(&codes) {
            let Some((x, y)) = *pos else { continue };
            let c = match self.format {
                TextureFormat::I4 => {
                    let i = expand4(code as u8);
                    [i, i, i, i]
                }
                TextureFormat::I8 => {
                    let i = code as u8;
                    [i, i, i, i]
                }
                TextureFormat::IA4 => {
                    let i = expand4(code as u8 & 0x0F);
                    [i, i, i, expand4((code as u8) >> 4)]
                }
                TextureFormat::IA8 => decode_ia8(code),
                TextureFormat::Rgb565 => decode_rgb565(code),
                TextureFormat::Rgb5a3 => decode_rgb5a3(code),
                _ => *palette.get(code as usize).ok_or(TextureError::BadIndex {
                    index: code as usize,
                    len: palette.len(),
                })?,
            };
            image.put_pixel(x, y, image::Rgba(c));
        }
        Ok(image)
    }

    pub fn from_png(bytes: &[u8], format: TextureFormat, palette_format: PaletteFormat) -> TextureResult<Texture> {
        let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)?.to_rgba8();
        Self::encode(&image, format, palette_format)
    }

    pub fn to_png(&self) -> TextureResult<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        self.decode()?.write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }

    /// Loads a texture from an image descriptor and its optional palette.
    pub fn read(dat: &DatFile, image: ImageDesc, tlut: Option<TlutDesc>) -> TextureResult<Texture> {
        let image = ImageDesc::wrap(dat, image.node())?;
        let format = TextureFormat::from_id(image.format(dat)?)?;
        let width = image.width(dat)?;
        let height = image.height(dat)?;
        let needed = format.encoded_size(width as usize, height as usize);
        let pixels = image
            .buffer(dat)
            .map(|b| b.bytes(dat))
            .unwrap_or_default();
        if pixels.len() < needed {
            return Err(TextureError::Truncated {
                needed,
                available: pixels.len(),
            });
        }

        let (palette_format, palette) = match (format.is_paletted(), tlut) {
            (false, _) => (PaletteFormat::Rgb5a3, Vec::new()),
            (true, None) => return Err(TextureError::MissingPalette),
            (true, Some(tlut)) => {
                let tlut = TlutDesc::wrap(dat, tlut.node())?;
                let count = tlut.color_count(dat)? as usize;
                let bytes = tlut.buffer(dat).map(|b| b.bytes(dat)).unwrap_or_default();
                if bytes.len() < count * 2 {
                    return Err(TextureError::Truncated {
                        needed: count * 2,
                        available: bytes.len(),
                    });
                }
                (PaletteFormat::from_id(tlut.format(dat)?)?, bytes[..count * 2].to_vec())
            }
        };

        Ok(Texture {
            width,
            height,
            format,
            palette_format,
            pixels: pixels[..needed].to_vec(),
            palette,
        })
    }

    /// Allocates descriptor and buffer nodes for this texture.
    pub fn write(&self, dat: &mut DatFile) -> TextureResult<(ImageDesc, Option<TlutDesc>)> {
        let image = ImageDesc::create(dat);
        let buffer = dat.alloc_buffer(self.pixels.clone());
        image.set_buffer(dat, Some(Buffer(buffer)));
        image.set_width(dat, self.width)?;
        image.set_height(dat, self.height)?;
        image.set_format(dat, self.format.id())?;
        image.set_mipmap(dat, 0)?;

        if !self.format.is_paletted() {
            return Ok((image, None));
        }
        let tlut = TlutDesc::create(dat);
        let buffer = dat.alloc_buffer(self.palette.clone());
        tlut.set_buffer(dat, Some(Buffer(buffer)));
        tlut.set_format(dat, self.palette_format.id())?;
        tlut.set_color_count(dat, (self.palette.len() / 2) as u16)?;
        Ok((image, Some(tlut)))
    }

    /// A fully transparent texture used for unused animation frames.
    pub fn blank(width: u16, height: u16) -> TextureResult<Texture> {
        let image = RgbaImage::new(width as u32, height as u32);
        Self::encode(&image, TextureFormat::I4, PaletteFormat::Rgb5a3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_image(rng: &mut StdRng, width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |_, _| Rgba(rng.gen()))
    }

    fn round_trip(image: &RgbaImage, format: TextureFormat, palette: PaletteFormat) -> RgbaImage {
        Texture::encode(image, format, palette).unwrap().decode().unwrap()
    }

    #[test]
    fn rgba8_is_lossless_for_odd_sizes() {
        let mut rng = StdRng::seed_from_u64(7);
        for (w, h) in [(1, 1), (5, 3), (16, 16), (33, 9)] {
            let image = random_image(&mut rng, w, h);
            assert_eq!(round_trip(&image, TextureFormat::Rgba8, PaletteFormat::Rgb5a3), image);
        }
    }

    #[test]
    fn direct_formats_stabilize_after_one_pass() {
        let mut rng = StdRng::seed_from_u64(11);
        let image = random_image(&mut rng, 12, 10);
        for format in [
            TextureFormat::I4,
            TextureFormat::I8,
            TextureFormat::IA4,
            TextureFormat::IA8,
            TextureFormat::Rgb565,
            TextureFormat::Rgb5a3,
        ] {
            let once = round_trip(&image, format, PaletteFormat::Rgb5a3);
            let twice = round_trip(&once, format, PaletteFormat::Rgb5a3);
            assert_eq!(once, twice, "{format:?}");
        }
    }

    #[test]
    fn paletted_formats_stabilize_after_one_pass() {
        let mut rng = StdRng::seed_from_u64(23);
        let image = random_image(&mut rng, 24, 16);
        for format in [TextureFormat::Ci4, TextureFormat::Ci8] {
            for palette in [PaletteFormat::Ia8, PaletteFormat::Rgb565, PaletteFormat::Rgb5a3] {
                let first = Texture::encode(&image, format, palette).unwrap();
                assert!(first.palette.len() / 2 <= format.max_colors());
                let once = first.decode().unwrap();
                let second = Texture::encode(&once, format, palette).unwrap();
                assert_eq!(second.decode().unwrap(), once, "{format:?} {palette:?}");
            }
        }
    }

    #[test]
    fn small_color_sets_use_exact_palette() {
        let colors = [[255, 0, 0, 255], [0, 255, 0, 255], [0, 0, 255, 255]];
        let image = RgbaImage::from_fn(8, 8, |x, y| Rgba(colors[((x + y) % 3) as usize]));
        let texture = Texture::encode(&image, TextureFormat::Ci4, PaletteFormat::Rgb565).unwrap();
        assert_eq!(texture.palette.len(), 6);
        assert_eq!(texture.decode().unwrap(), image);
    }

    #[test]
    fn i8_single_tile_is_row_major() {
        let image = RgbaImage::from_fn(8, 4, |x, y| {
            let v = (x + y * 8) as u8;
            Rgba([v, v, v, 255])
        });
        let texture = Texture::encode(&image, TextureFormat::I8, PaletteFormat::Rgb5a3).unwrap();
        assert_eq!(texture.pixels, (0..32).collect::<Vec<u8>>());
    }

    #[test]
    fn compressed_and_unknown_formats_are_rejected() {
        assert!(matches!(TextureFormat::from_id(14), Err(TextureError::UnsupportedFormat(14))));
        assert!(matches!(TextureFormat::from_id(10), Err(TextureError::UnsupportedFormat(10))));
    }

    #[test]
    fn texture_survives_archive_round_trip() {
        let mut rng = StdRng::seed_from_u64(3);
        let image = random_image(&mut rng, 16, 8);
        let texture = Texture::encode(&image, TextureFormat::Ci8, PaletteFormat::Rgb5a3).unwrap();

        let mut dat = DatFile::new("tex.dat");
        let (desc, tlut) = texture.write(&mut dat).unwrap();
        dat.set_root("image", desc.0);
        dat.set_root("tlut", tlut.unwrap().0);

        let parsed = DatFile::parse("tex.dat", &dat.to_bytes()).unwrap();
        let desc = ImageDesc(parsed.root("image").unwrap());
        let tlut = TlutDesc(parsed.root("tlut").unwrap());
        assert_eq!(Texture::read(&parsed, desc, Some(tlut)).unwrap(), texture);
    }

    #[test]
    fn png_round_trip() {
        let mut rng = StdRng::seed_from_u64(5);
        let image = random_image(&mut rng, 8, 8);
        let texture = Texture::encode(&image, TextureFormat::Rgba8, PaletteFormat::Rgb5a3).unwrap();
        let png = texture.to_png().unwrap();
        let back = Texture::from_png(&png, TextureFormat::Rgba8, PaletteFormat::Rgb5a3).unwrap();
        assert_eq!(back, texture);
    }
}
