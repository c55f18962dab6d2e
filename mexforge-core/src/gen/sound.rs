//! Sound script compile.
//!
//! The script file holds one block of scripts per sound group. The header
//! is a group count followed by `count + 1` block offsets (the last one
//! marks the end of the data); each script is a run of 32-bit commands
//! `opcode << 24 | argument` ending in an end command.

use byteorder::{BigEndian, ByteOrder};
use log::info;

use super::{Generator, PassContext};
use crate::dat::DatError;
use crate::project::SoundScript;
use crate::store::join;
use crate::Result;

pub const SCRIPT_FILE: &str = "files/audio/us/smash2.sem";
pub const BANK_DIR: &str = "files/audio";

const OP_END: u8 = 0x00;
const OP_SOUND: u8 = 0x01;
const OP_PRIORITY: u8 = 0x0C;
const OP_VOLUME: u8 = 0x0D;
const OP_PAN: u8 = 0x10;
const OP_REVERB: u8 = 0x11;
const OP_LOOP: u8 = 0x18;

const ARGUMENT_MASK: u32 = 0x00FF_FFFF;

fn command(op: u8, argument: u32) -> u32 {
    ((op as u32) << 24) | (argument & ARGUMENT_MASK)
}

fn corrupt(message: &str, offset: usize) -> DatError {
    DatError::Corrupt {
        archive: "smash2.sem".to_string(),
        message: message.to_string(),
        offset,
    }
}

/// Decoded script file: groups of scripts of raw commands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScriptFile {
    pub groups: Vec<Vec<Vec<u32>>>,
}

impl ScriptFile {
    pub fn parse(bytes: &[u8]) -> std::result::Result<ScriptFile, DatError> {
        let word = |offset: usize| {
            bytes
                .get(offset..offset + 4)
                .map(BigEndian::read_u32)
                .ok_or_else(|| corrupt("read past end of script file", offset))
        };
        let count = word(0)? as usize;
        let data_start = 4 + (count + 1) * 4;
        if data_start > bytes.len() {
            return Err(corrupt("group table extends past end of file", 0));
        }

        let mut groups = Vec::with_capacity(count);
        for g in 0..count {
            let start = data_start + word(4 + g * 4)? as usize;
            let end = data_start + word(8 + g * 4)? as usize;
            if start > end || end > bytes.len() || (end - start) % 4 != 0 {
                return Err(corrupt("bad group bounds", 4 + g * 4));
            }
            let mut scripts = Vec::new();
            let mut current = Vec::new();
            for pos in (start..end).step_by(4) {
                let cmd = word(pos)?;
                current.push(cmd);
                if (cmd >> 24) as u8 == OP_END {
                    scripts.push(std::mem::take(&mut current));
                }
            }
            if !current.is_empty() {
                return Err(corrupt("script is missing its end command", end));
            }
            groups.push(scripts);
        }
        Ok(ScriptFile { groups })
    }

    /// Serializes the file and returns it with the absolute byte offset of
    /// every group block.
    pub fn to_bytes(&self) -> (Vec<u8>, Vec<u32>) {
        let count = self.groups.len();
        let data_start = 4 + (count + 1) * 4;
        let mut data = Vec::new();
        let mut offsets = Vec::with_capacity(count + 1);
        for group in &self.groups {
            offsets.push(data.len() as u32);
            for cmd in group.iter().flatten() {
                data.extend_from_slice(&cmd.to_be_bytes());
            }
        }
        offsets.push(data.len() as u32);

        let mut out = Vec::with_capacity(data_start + data.len());
        out.extend_from_slice(&(count as u32).to_be_bytes());
        for offset in &offsets {
            out.extend_from_slice(&offset.to_be_bytes());
        }
        out.extend_from_slice(&data);
        let absolute = offsets[..count]
            .iter()
            .map(|o| o + data_start as u32)
            .collect();
        (out, absolute)
    }
}

fn compile_script(script: &SoundScript) -> Vec<u32> {
    let mut out = vec![
        command(OP_SOUND, script.sound_id),
        command(OP_PRIORITY, script.priority as u32),
        command(OP_VOLUME, script.volume as u32),
        command(OP_PAN, script.pan as u32),
    ];
    if script.reverb != 0 {
        out.push(command(OP_REVERB, script.reverb as u32));
    }
    if script.looped {
        out.push(command(OP_LOOP, 0));
    }
    out.push(command(OP_END, 0));
    out
}

pub struct SoundPass;

impl Generator for SoundPass {
    fn name(&self) -> &'static str {
        "sound"
    }

    fn run(&self, ctx: &mut PassContext) -> Result<bool> {
        let Some(template) = ctx.store.try_get(SCRIPT_FILE)? else {
            return Ok(false);
        };
        let vanilla = ScriptFile::parse(&template)?;

        let mut file = ScriptFile::default();
        let mut oversized = Vec::new();
        for group in &ctx.project.sound_groups {
            let mut scripts = Vec::with_capacity(group.scripts.len());
            for script in &group.scripts {
                if script.sound_id > ARGUMENT_MASK {
                    oversized.push(format!(
                        "sound group '{}': script '{}' sound ID {} does not fit in 24 bits",
                        group.name, script.name, script.sound_id
                    ));
                }
                scripts.push(compile_script(script));
            }
            file.groups.push(scripts);
        }
        for message in oversized {
            ctx.warn(message);
        }

        // Template groups past the project's are carried over unchanged.
        let carried = vanilla.groups.len().saturating_sub(file.groups.len());
        if carried > 0 {
            file.groups.extend_from_slice(&vanilla.groups[file.groups.len()..]);
            ctx.warn(format!(
                "{carried} script groups in the template have no project sound group and were kept as is"
            ));
        }

        let (bytes, offsets) = file.to_bytes();
        for (group, offset) in ctx.project.sound_groups.iter_mut().zip(&offsets) {
            group.script_offset = *offset;
        }

        let group_count = ctx.project.sound_groups.len();
        let mut bad_links = Vec::new();
        for (i, fighter) in ctx.project.fighters.iter_mut().enumerate() {
            fighter.sound_offset = match offsets.get(fighter.sound_group) {
                Some(&offset) => offset,
                None => {
                    bad_links.push(format!(
                        "fighter {i} ({}): sound group {} does not exist ({group_count} groups)",
                        fighter.name, fighter.sound_group
                    ));
                    offsets.first().copied().unwrap_or(0)
                }
            };
        }
        for message in bad_links {
            ctx.warn(message);
        }
        ctx.store.set(SCRIPT_FILE, bytes)?;

        let mut copied = 0;
        for i in 0..ctx.project.sound_groups.len() {
            let group = &ctx.project.sound_groups[i];
            let Some(bank) = group.bank.clone() else { continue };
            if group.bank_file.is_empty() {
                let message = format!("sound group '{}': bank has no disc file name", group.name);
                ctx.warn(message);
                continue;
            }
            let target = join(BANK_DIR, &group.bank_file);
            let name = group.name.clone();
            match ctx.store.try_get(&bank)? {
                Some(bytes) => {
                    ctx.store.set(&target, bytes)?;
                    copied += 1;
                }
                None => ctx.warn(format!("sound group '{name}': bank {bank} is missing")),
            }
        }

        info!(
            "Compiled {} sound groups ({} carried from template), copied {} banks",
            ctx.project.sound_groups.len(),
            carried,
            copied
        );
        Ok(true)
    }
}
