use serde::{Deserialize, Serialize};

use crate::dat::patch::{PatchSymbol, Relocation};
use crate::ids::{self, shift_after_insertion, shift_after_removal, SPECIAL_SLOT_COUNT};

/// The editable mod project. Position in each collection is the entity's
/// internal ID; every cross reference stores such a position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub build: Build,
    pub fighters: Vec<Fighter>,
    pub stages: Vec<Stage>,
    pub music: Vec<Music>,
    pub sound_groups: Vec<SoundGroup>,
    pub series: Vec<Series>,
    pub trophies: Vec<Trophy>,
    pub css_icons: Vec<CssIcon>,
    pub sss_icons: Vec<SssIcon>,
    pub playlists: Vec<Playlist>,
    pub patches: Vec<Patch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Build {
    pub name: String,
    pub version: u32,
    /// Six character disc ID written into the boot block when set.
    pub game_id: Option<String>,
    /// Title written into the boot block when set.
    pub game_name: Option<String>,
}

impl Default for Build {
    fn default() -> Self {
        Build {
            name: "untitled".to_string(),
            version: 1,
            game_id: None,
            game_name: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fighter {
    pub name: String,
    /// Disc file holding the fighter's data (e.g. `PlMr.dat`).
    pub data_file: String,
    pub animation_file: String,
    pub series: usize,
    pub sound_group: usize,
    pub victory_theme: usize,
    /// Partner fighter swapped in mid-match (internal ID).
    pub sub_character: Option<usize>,
    pub costumes: Vec<Costume>,
    /// Store path of the results screen banner image.
    pub result_banner: Option<String>,
    /// Common bone lookup entries for this fighter.
    pub bone_lookup: Vec<u8>,

    /// Written by the data table pass.
    pub external_id: usize,
    /// Written by the sound pass: byte offset of the sound group's script
    /// block inside the script file.
    pub sound_offset: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Costume {
    pub name: String,
    pub file: String,
    /// Store path of the select screen icon (PNG).
    pub css_icon: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stage {
    pub name: String,
    pub file: String,
    pub series: usize,
    pub playlist: Vec<PlaylistEntry>,
    pub icon: Option<String>,
    pub name_tag: Option<String>,

    /// Written by the data table pass.
    pub external_id: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Music {
    pub name: String,
    /// Disc file name of the track.
    pub file: String,
    /// Store path of the imported track payload.
    pub asset: Option<String>,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub music: usize,
    pub chance: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Playlist {
    pub name: String,
    pub entries: Vec<PlaylistEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundGroup {
    pub name: String,
    /// Store path of the sound bank payload.
    pub bank: Option<String>,
    /// Disc file name the bank is written to under `files/audio/`.
    pub bank_file: String,
    pub scripts: Vec<SoundScript>,

    /// Written by the sound pass.
    pub script_offset: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundScript {
    pub name: String,
    pub sound_id: u32,
    pub priority: u8,
    pub volume: u8,
    pub pan: u8,
    pub reverb: u8,
    pub looped: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Series {
    pub name: String,
    pub icon: Option<String>,
    pub playlist: Vec<PlaylistEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Trophy {
    pub name: String,
    /// Sort key used for the Japanese alphabetical listing.
    pub name_jp: String,
    pub model_id: u16,
    pub series: usize,
    pub unlock_flags: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CssIcon {
    pub fighter: Option<usize>,
    pub x: f32,
    pub y: f32,
    pub locked: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SssIcon {
    pub stage: Option<usize>,
    pub x: f32,
    pub y: f32,
    pub locked: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Patch {
    pub name: String,
    pub enabled: bool,
    pub description: String,
    /// Store path of the compiled code blob.
    pub code: String,
    pub relocations: Vec<Relocation>,
    pub symbols: Vec<PatchSymbol>,
}

fn shift_optional(reference: &mut Option<usize>, removed: usize) {
    if let Some(id) = *reference {
        *reference = shift_after_removal(id, removed);
    }
}

fn shift_or_default(reference: &mut usize, removed: usize) {
    *reference = shift_after_removal(*reference, removed).unwrap_or(0);
}

fn shift_playlist(entries: &mut Vec<PlaylistEntry>, removed: usize) {
    entries.retain(|e| e.music != removed);
    for entry in entries.iter_mut() {
        if entry.music > removed {
            entry.music -= 1;
        }
    }
}

impl Project {
    /// Index at which newly added fighters are inserted so the special
    /// slots stay at the end of the roster.
    pub fn fighter_insert_index(&self) -> usize {
        self.fighters.len().saturating_sub(SPECIAL_SLOT_COUNT)
    }

    pub fn fighter_external_id(&self, internal_id: usize) -> usize {
        ids::fighter_to_external(internal_id, self.fighters.len())
    }

    /// Adds a fighter in front of the special slots and returns its
    /// internal ID.
    pub fn add_fighter(&mut self, fighter: Fighter) -> usize {
        let index = self.fighter_insert_index();
        self.insert_fighter(index, fighter);
        index
    }

    pub fn insert_fighter(&mut self, index: usize, fighter: Fighter) {
        let index = index.min(self.fighters.len());
        for f in &mut self.fighters {
            if let Some(sub) = f.sub_character.as_mut() {
                *sub = shift_after_insertion(*sub, index);
            }
        }
        for icon in &mut self.css_icons {
            if let Some(id) = icon.fighter.as_mut() {
                *id = shift_after_insertion(*id, index);
            }
        }
        self.fighters.insert(index, fighter);
    }

    /// Removes the fighter at `index`. References to it are cleared and
    /// references past it move down by one.
    pub fn remove_fighter(&mut self, index: usize) -> Option<Fighter> {
        if index >= self.fighters.len() {
            return None;
        }
        let removed = self.fighters.remove(index);
        for f in &mut self.fighters {
            shift_optional(&mut f.sub_character, index);
        }
        for icon in &mut self.css_icons {
            shift_optional(&mut icon.fighter, index);
        }
        Some(removed)
    }

    pub fn remove_stage(&mut self, index: usize) -> Option<Stage> {
        if index >= self.stages.len() {
            return None;
        }
        let removed = self.stages.remove(index);
        for icon in &mut self.sss_icons {
            shift_optional(&mut icon.stage, index);
        }
        Some(removed)
    }

    pub fn remove_music(&mut self, index: usize) -> Option<Music> {
        if index >= self.music.len() {
            return None;
        }
        let removed = self.music.remove(index);
        for f in &mut self.fighters {
            shift_or_default(&mut f.victory_theme, index);
        }
        for s in &mut self.stages {
            shift_playlist(&mut s.playlist, index);
        }
        for s in &mut self.series {
            shift_playlist(&mut s.playlist, index);
        }
        for p in &mut self.playlists {
            shift_playlist(&mut p.entries, index);
        }
        Some(removed)
    }

    pub fn remove_series(&mut self, index: usize) -> Option<Series> {
        if index >= self.series.len() {
            return None;
        }
        let removed = self.series.remove(index);
        for f in &mut self.fighters {
            shift_or_default(&mut f.series, index);
        }
        for s in &mut self.stages {
            shift_or_default(&mut s.series, index);
        }
        for t in &mut self.trophies {
            shift_or_default(&mut t.series, index);
        }
        Some(removed)
    }

    pub fn remove_sound_group(&mut self, index: usize) -> Option<SoundGroup> {
        if index >= self.sound_groups.len() {
            return None;
        }
        let removed = self.sound_groups.remove(index);
        for f in &mut self.fighters {
            shift_or_default(&mut f.sound_group, index);
        }
        Some(removed)
    }
}
