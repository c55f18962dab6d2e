//! Packed animation key streams stored behind `FObjDesc` buffers.
//!
//! A stream is a sequence of runs. Each run starts with an opcode byte:
//! interpolation in bits 0-3, key count minus one in bits 4-6 and a
//! continuation flag in bit 7 that pulls in further 7-bit count bytes.
//! Every key then carries a value and/or tangent in the format named by
//! the descriptor's value and tangent flags, followed by a 7-bit
//! variable-length wait until the next key. Waits only separate keys, so
//! the frame of the first key lives in the descriptor's start frame.

use byteorder::{BigEndian, ByteOrder};

use super::kinds::FObjDesc;
use super::record::Buffer;
use super::{DatError, DatFile, DatResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Constant = 1,
    Linear = 2,
    Spline0 = 3,
    Spline = 4,
    Slope = 5,
    Key = 6,
}

impl Interpolation {
    fn from_bits(bits: u8) -> Option<Self> {
        Some(match bits {
            1 => Interpolation::Constant,
            2 => Interpolation::Linear,
            3 => Interpolation::Spline0,
            4 => Interpolation::Spline,
            5 => Interpolation::Slope,
            6 => Interpolation::Key,
            _ => return None,
        })
    }

    fn has_value(self) -> bool {
        self != Interpolation::Slope
    }

    fn has_tangent(self) -> bool {
        matches!(self, Interpolation::Spline | Interpolation::Slope)
    }

    fn has_wait(self) -> bool {
        !matches!(self, Interpolation::Slope | Interpolation::Key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FObjKey {
    pub frame: f32,
    pub value: f32,
    pub tangent: f32,
    pub interpolation: Interpolation,
}

impl FObjKey {
    pub fn constant(frame: f32, value: f32) -> Self {
        FObjKey {
            frame,
            value,
            tangent: 0.0,
            interpolation: Interpolation::Constant,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFormat {
    Float = 0,
    S16 = 1,
    U16 = 2,
    S8 = 3,
    U8 = 4,
}

impl ValueFormat {
    fn width(self) -> usize {
        match self {
            ValueFormat::Float => 4,
            ValueFormat::S16 | ValueFormat::U16 => 2,
            ValueFormat::S8 | ValueFormat::U8 => 1,
        }
    }
}

/// Format byte: value format in the top three bits, power-of-two scale in
/// the low five.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberFormat {
    pub format: ValueFormat,
    pub scale: u8,
}

impl NumberFormat {
    pub const FLOAT: NumberFormat = NumberFormat {
        format: ValueFormat::Float,
        scale: 0,
    };

    pub fn from_flag(flag: u8) -> Option<Self> {
        let format = match flag >> 5 {
            0 => ValueFormat::Float,
            1 => ValueFormat::S16,
            2 => ValueFormat::U16,
            3 => ValueFormat::S8,
            4 => ValueFormat::U8,
            _ => return None,
        };
        Some(NumberFormat {
            format,
            scale: flag & 0x1F,
        })
    }

    pub fn flag(self) -> u8 {
        ((self.format as u8) << 5) | (self.scale & 0x1F)
    }

    /// Smallest unscaled integer format holding every value in `0..=max`.
    pub fn for_indices(max: u32) -> Self {
        let format = match max {
            0..=0xFF => ValueFormat::U8,
            0x100..=0xFFFF => ValueFormat::U16,
            _ => ValueFormat::Float,
        };
        NumberFormat { format, scale: 0 }
    }

    fn read(self, bytes: &[u8], pos: &mut usize) -> DatResult<f32> {
        let width = self.format.width();
        let raw = bytes
            .get(*pos..*pos + width)
            .ok_or_else(|| corrupt("key value runs past end of stream", *pos))?;
        *pos += width;
        let divisor = (1u32 << self.scale) as f32;
        Ok(match self.format {
            ValueFormat::Float => BigEndian::read_f32(raw),
            ValueFormat::S16 => BigEndian::read_i16(raw) as f32 / divisor,
            ValueFormat::U16 => BigEndian::read_u16(raw) as f32 / divisor,
            ValueFormat::S8 => raw[0] as i8 as f32 / divisor,
            ValueFormat::U8 => raw[0] as f32 / divisor,
        })
    }

    fn write(self, value: f32, out: &mut Vec<u8>) {
        let scaled = (value * (1u32 << self.scale) as f32).round();
        match self.format {
            ValueFormat::Float => out.extend_from_slice(&value.to_be_bytes()),
            ValueFormat::S16 => out.extend_from_slice(&(scaled as i16).to_be_bytes()),
            ValueFormat::U16 => out.extend_from_slice(&(scaled as u16).to_be_bytes()),
            ValueFormat::S8 => out.push(scaled as i8 as u8),
            ValueFormat::U8 => out.push(scaled as u8),
        }
    }
}

fn corrupt(message: &str, offset: usize) -> DatError {
    DatError::Corrupt {
        archive: String::new(),
        message: message.to_string(),
        offset,
    }
}

fn read_varint(bytes: &[u8], pos: &mut usize) -> DatResult<u32> {
    let mut value = 0u32;
    let mut shift = 0;
    loop {
        let byte = *bytes
            .get(*pos)
            .ok_or_else(|| corrupt("wait time runs past end of stream", *pos))?;
        *pos += 1;
        if shift > 28 {
            return Err(corrupt("wait time is too long", *pos - 1));
        }
        value |= ((byte & 0x7F) as u32) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

fn write_varint(mut value: u32, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Decodes a key stream whose first key sits at `start_frame`.
pub fn decode_keys(
    bytes: &[u8],
    start_frame: f32,
    values: NumberFormat,
    tangents: NumberFormat,
) -> DatResult<Vec<FObjKey>> {
    let mut keys = Vec::new();
    let mut pos = 0;
    let mut frame = start_frame;

    while pos < bytes.len() {
        let opcode = bytes[pos];
        if opcode == 0 {
            // Streams are padded with zeros.
            break;
        }
        let start = pos;
        pos += 1;
        let interpolation = Interpolation::from_bits(opcode & 0x0F)
            .ok_or_else(|| corrupt("unknown key interpolation", start))?;
        let mut count = ((opcode >> 4) & 0x07) as u32 + 1;
        if opcode & 0x80 != 0 {
            count += read_varint(bytes, &mut pos)? << 3;
        }

        for _ in 0..count {
            let value = if interpolation.has_value() {
                values.read(bytes, &mut pos)?
            } else {
                0.0
            };
            let tangent = if interpolation.has_tangent() {
                tangents.read(bytes, &mut pos)?
            } else {
                0.0
            };
            keys.push(FObjKey {
                frame,
                value,
                tangent,
                interpolation,
            });
            if interpolation.has_wait() {
                frame += read_varint(bytes, &mut pos)? as f32;
            }
        }
    }
    Ok(keys)
}

/// Encodes `keys` relative to the first key's frame, which the caller
/// stores as the start frame.
pub fn encode_keys(keys: &[FObjKey], values: NumberFormat, tangents: NumberFormat) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < keys.len() {
        let interpolation = keys[i].interpolation;
        let run = keys[i..]
            .iter()
            .take_while(|k| k.interpolation == interpolation)
            .count();

        let extra = (run as u32 - 1) >> 3;
        let mut opcode = interpolation as u8 | ((((run - 1) & 0x07) as u8) << 4);
        if extra > 0 {
            opcode |= 0x80;
        }
        out.push(opcode);
        if extra > 0 {
            write_varint(extra, &mut out);
        }

        for (j, key) in keys[i..i + run].iter().enumerate() {
            if interpolation.has_value() {
                values.write(key.value, &mut out);
            }
            if interpolation.has_tangent() {
                tangents.write(key.tangent, &mut out);
            }
            if interpolation.has_wait() {
                let wait = keys
                    .get(i + j + 1)
                    .map_or(0.0, |next| (next.frame - key.frame).max(0.0));
                write_varint(wait.round() as u32, &mut out);
            }
        }
        i += run;
    }
    out
}

impl FObjDesc {
    pub fn keys(self, dat: &DatFile) -> DatResult<Vec<FObjKey>> {
        let values = NumberFormat::from_flag(self.value_flag(dat)?)
            .ok_or_else(|| corrupt("unknown value format", 0x0D).in_archive(&dat.name))?;
        let tangents = NumberFormat::from_flag(self.tangent_flag(dat)?)
            .ok_or_else(|| corrupt("unknown tangent format", 0x0E).in_archive(&dat.name))?;
        let length = self.data_length(dat)? as usize;
        let start_frame = self.start_frame(dat)?;
        match self.buffer(dat) {
            Some(buffer) => {
                let bytes = buffer.bytes(dat);
                decode_keys(&bytes[..length.min(bytes.len())], start_frame, values, tangents)
                    .map_err(|e| e.in_archive(&dat.name))
            }
            None => Ok(Vec::new()),
        }
    }

    /// Replaces the key stream with a freshly encoded buffer.
    pub fn set_keys(self, dat: &mut DatFile, keys: &[FObjKey], values: NumberFormat) -> DatResult<()> {
        let tangents = NumberFormat::FLOAT;
        let bytes = encode_keys(keys, values, tangents);
        self.set_data_length(dat, bytes.len() as u32)?;
        self.set_value_flag(dat, values.flag())?;
        self.set_tangent_flag(dat, tangents.flag())?;
        self.set_start_frame(dat, keys.first().map_or(0.0, |k| k.frame))?;
        let buffer = dat.alloc_bytes(bytes);
        self.set_buffer(dat, Some(Buffer(buffer)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dat::DatRecord;
    use pretty_assertions::assert_eq;

    fn frames(keys: &[FObjKey]) -> Vec<(f32, f32)> {
        keys.iter().map(|k| (k.frame, k.value)).collect()
    }

    #[test]
    fn constant_track_with_long_run() {
        // Twenty keys forces the continuation byte.
        let keys: Vec<FObjKey> = (0..20).map(|i| FObjKey::constant(i as f32 * 3.0, i as f32)).collect();
        let bytes = encode_keys(&keys, NumberFormat::for_indices(19), NumberFormat::FLOAT);
        assert_eq!(bytes[0] & 0x80, 0x80);
        assert_eq!(bytes[0] & 0x0F, Interpolation::Constant as u8);

        let decoded = decode_keys(&bytes, 0.0, NumberFormat::for_indices(19), NumberFormat::FLOAT).unwrap();
        assert_eq!(frames(&decoded), frames(&keys));
    }

    #[test]
    fn mixed_interpolations_keep_tangents() {
        let keys = vec![
            FObjKey { frame: 0.0, value: 1.0, tangent: 0.5, interpolation: Interpolation::Spline },
            FObjKey { frame: 10.0, value: -2.25, tangent: 0.0, interpolation: Interpolation::Linear },
            FObjKey { frame: 300.0, value: 4.0, tangent: 0.0, interpolation: Interpolation::Linear },
        ];
        let bytes = encode_keys(&keys, NumberFormat::FLOAT, NumberFormat::FLOAT);
        let decoded = decode_keys(&bytes, 0.0, NumberFormat::FLOAT, NumberFormat::FLOAT).unwrap();
        assert_eq!(decoded, keys);
    }

    #[test]
    fn scaled_integer_values() {
        let format = NumberFormat { format: ValueFormat::S16, scale: 2 };
        assert_eq!(NumberFormat::from_flag(format.flag()), Some(format));
        let keys = vec![FObjKey::constant(0.0, -1.75), FObjKey::constant(1.0, 3.25)];
        let decoded = decode_keys(&encode_keys(&keys, format, format), 0.0, format, format).unwrap();
        assert_eq!(frames(&decoded), frames(&keys));
    }

    #[test]
    fn truncated_stream_is_corrupt() {
        let keys = vec![FObjKey::constant(0.0, 1.0), FObjKey::constant(5.0, 2.0)];
        let bytes = encode_keys(&keys, NumberFormat::FLOAT, NumberFormat::FLOAT);
        let err = decode_keys(&bytes[..3], 0.0, NumberFormat::FLOAT, NumberFormat::FLOAT).unwrap_err();
        assert!(matches!(err, DatError::Corrupt { .. }));
    }

    #[test]
    fn descriptor_round_trip_through_archive() {
        let mut dat = DatFile::new("GmRst.usd");
        let fobj = FObjDesc::create(&mut dat);
        let keys: Vec<FObjKey> = [0.0, 4.0, 9.0].iter().map(|&f| FObjKey::constant(f, f + 1.0)).collect();
        fobj.set_keys(&mut dat, &keys, NumberFormat::for_indices(10)).unwrap();
        dat.set_root("track", fobj.0);

        let parsed = DatFile::parse("GmRst.usd", &dat.to_bytes()).unwrap();
        let fobj = FObjDesc::wrap(&parsed, parsed.require_root("track").unwrap()).unwrap();
        assert_eq!(frames(&fobj.keys(&parsed).unwrap()), frames(&keys));
    }

    #[test]
    fn late_first_key_keeps_its_frame() {
        let keys = vec![FObjKey::constant(2.0, 1.0), FObjKey::constant(5.0, 2.0)];
        let bytes = encode_keys(&keys, NumberFormat::FLOAT, NumberFormat::FLOAT);
        let decoded = decode_keys(&bytes, 2.0, NumberFormat::FLOAT, NumberFormat::FLOAT).unwrap();
        assert_eq!(frames(&decoded), vec![(2.0, 1.0), (5.0, 2.0)]);

        let mut dat = DatFile::new("MnSlMap.usd");
        let fobj = FObjDesc::create(&mut dat);
        fobj.set_keys(&mut dat, &keys, NumberFormat::for_indices(2)).unwrap();
        dat.set_root("track", fobj.0);
        assert_eq!(fobj.start_frame(&dat).unwrap(), 2.0);

        let parsed = DatFile::parse("MnSlMap.usd", &dat.to_bytes()).unwrap();
        let fobj = FObjDesc::wrap(&parsed, parsed.require_root("track").unwrap()).unwrap();
        assert_eq!(frames(&fobj.keys(&parsed).unwrap()), frames(&keys));
    }
}
