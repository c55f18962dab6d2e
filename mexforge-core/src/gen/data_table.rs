//! Main data table compile: the fighter, stage, music and playlist tables
//! every other system looks IDs up in. Also assigns external IDs.

use log::info;

use super::{Generator, PassContext};
use crate::dat::{DatFile, NodeId};
use crate::ids;
use crate::project::PlaylistEntry;
use crate::Result;

pub const TEMPLATE: &str = "files/MxDt.dat";

pub const META_ROOT: &str = "mexMeta";
pub const FIGHTER_ROOT: &str = "mexFighterTable";
pub const STAGE_ROOT: &str = "mexStageTable";
pub const MUSIC_ROOT: &str = "mexMusicTable";
pub const PLAYLIST_ROOT: &str = "mexPlaylistTable";

pub const META_SIZE: usize = 0x24;
pub const FIGHTER_ROW: usize = 0x18;
pub const STAGE_ROW: usize = 0x14;
pub const MUSIC_ROW: usize = 0x08;
pub const PLAYLIST_ROW: usize = 0x08;
const PLAYLIST_ENTRY: usize = 0x04;

/// Row value for "no sub-character".
pub const NO_FIGHTER: i16 = -1;

/// Resolves a stored ID against a collection size, reporting and
/// defaulting IDs with no target.
fn checked_id(id: usize, count: usize, default: usize, describe: impl FnOnce() -> String, bad: &mut Vec<String>) -> usize {
    if id < count {
        id
    } else {
        bad.push(describe());
        default
    }
}

/// Writes a playlist as `(music, chance)` rows. Entries pointing at missing
/// music, or past what a row can hold, fall back to music 0.
pub(crate) fn write_playlist(dat: &mut DatFile, entries: &[PlaylistEntry], music_count: usize, owner: &str, bad: &mut Vec<String>) -> Result<Option<NodeId>> {
    if entries.is_empty() {
        return Ok(None);
    }
    let node = dat.alloc(entries.len() * PLAYLIST_ENTRY);
    for (i, entry) in entries.iter().enumerate() {
        let music = checked_id(
            entry.music,
            music_count.min(u16::MAX as usize + 1),
            0,
            || format!("{owner}: playlist entry {i} points at missing music {}", entry.music),
            bad,
        );
        dat.write::<u16>(node, i * PLAYLIST_ENTRY, music as u16, "PlaylistEntry")?;
        dat.write::<u16>(node, i * PLAYLIST_ENTRY + 2, entry.chance, "PlaylistEntry")?;
    }
    Ok(Some(node))
}

pub struct DataTablePass;

impl Generator for DataTablePass {
    fn name(&self) -> &'static str {
        "data table"
    }

    fn run(&self, ctx: &mut PassContext) -> Result<bool> {
        let Some(mut dat) = ctx.load_template(TEMPLATE)? else {
            return Ok(false);
        };
        let mut bad = Vec::new();

        let fighter_count = ctx.project.fighters.len();
        let stage_count = ctx.project.stages.len();
        for (i, fighter) in ctx.project.fighters.iter_mut().enumerate() {
            fighter.external_id = ids::fighter_to_external(i, fighter_count);
        }
        for (i, stage) in ctx.project.stages.iter_mut().enumerate() {
            stage.external_id = ids::stage_to_external(i);
        }

        let project = &*ctx.project;
        let series_count = project.series.len();
        let music_count = project.music.len();
        let group_count = project.sound_groups.len();

        let meta = dat.alloc(META_SIZE);
        let counts = [
            fighter_count,
            stage_count,
            music_count,
            series_count,
            project.playlists.len(),
            group_count,
            project.trophies.len(),
        ];
        for (i, count) in counts.iter().enumerate() {
            dat.write::<u32>(meta, i * 4, *count as u32, "MetaTable")?;
        }
        dat.write::<u32>(meta, 0x1C, project.build.version, "MetaTable")?;
        let build_name = dat.alloc_string(&project.build.name);
        dat.set_reference(meta, 0x20, Some(build_name));
        dat.set_root(META_ROOT, meta);

        let fighters = dat.alloc(fighter_count.max(1) * FIGHTER_ROW);
        for (i, f) in project.fighters.iter().enumerate() {
            let row = i * FIGHTER_ROW;
            let owner = format!("fighter {i} ({})", f.name);
            let series = checked_id(f.series, series_count, 0, || format!("{owner}: series {} does not exist", f.series), &mut bad);
            let group = checked_id(f.sound_group, group_count, 0, || format!("{owner}: sound group {} does not exist", f.sound_group), &mut bad);
            let theme = checked_id(f.victory_theme, music_count, 0, || format!("{owner}: victory theme {} does not exist", f.victory_theme), &mut bad);
            let sub = match f.sub_character {
                Some(sub) if sub < fighter_count => sub as i16,
                Some(sub) => {
                    bad.push(format!("{owner}: sub-character {sub} does not exist"));
                    NO_FIGHTER
                }
                None => NO_FIGHTER,
            };

            dat.write::<u16>(fighters, row, f.external_id as u16, "FighterRow")?;
            dat.write::<u16>(fighters, row + 0x02, series as u16, "FighterRow")?;
            dat.write::<u16>(fighters, row + 0x04, group as u16, "FighterRow")?;
            dat.write::<u16>(fighters, row + 0x06, theme as u16, "FighterRow")?;
            dat.write::<i16>(fighters, row + 0x08, sub, "FighterRow")?;
            dat.write::<u16>(fighters, row + 0x0A, f.costumes.len() as u16, "FighterRow")?;
            dat.write::<u32>(fighters, row + 0x0C, f.sound_offset, "FighterRow")?;
            let name = dat.alloc_string(&f.name);
            dat.set_reference(fighters, row + 0x10, Some(name));
            let file = dat.alloc_string(&f.data_file);
            dat.set_reference(fighters, row + 0x14, Some(file));
        }
        dat.set_root(FIGHTER_ROOT, fighters);

        let stages = dat.alloc(stage_count.max(1) * STAGE_ROW);
        for (i, s) in project.stages.iter().enumerate() {
            let row = i * STAGE_ROW;
            let owner = format!("stage {i} ({})", s.name);
            let series = checked_id(s.series, series_count, 0, || format!("{owner}: series {} does not exist", s.series), &mut bad);
            dat.write::<u16>(stages, row, s.external_id as u16, "StageRow")?;
            dat.write::<u16>(stages, row + 0x02, series as u16, "StageRow")?;
            let file = dat.alloc_string(&s.file);
            dat.set_reference(stages, row + 0x04, Some(file));
            let name = dat.alloc_string(&s.name);
            dat.set_reference(stages, row + 0x08, Some(name));
            let playlist = write_playlist(&mut dat, &s.playlist, music_count, &owner, &mut bad)?;
            dat.set_reference(stages, row + 0x0C, playlist);
            dat.write::<u16>(stages, row + 0x10, s.playlist.len() as u16, "StageRow")?;
        }
        dat.set_root(STAGE_ROOT, stages);

        let music = dat.alloc(music_count.max(1) * MUSIC_ROW);
        for (i, m) in project.music.iter().enumerate() {
            let file = dat.alloc_string(&m.file);
            dat.set_reference(music, i * MUSIC_ROW, Some(file));
            let label = dat.alloc_string(&m.label);
            dat.set_reference(music, i * MUSIC_ROW + 4, Some(label));
        }
        dat.set_root(MUSIC_ROOT, music);

        let playlists = dat.alloc(project.playlists.len().max(1) * PLAYLIST_ROW);
        for (i, p) in project.playlists.iter().enumerate() {
            let owner = format!("playlist {i} ({})", p.name);
            let entries = write_playlist(&mut dat, &p.entries, music_count, &owner, &mut bad)?;
            dat.set_reference(playlists, i * PLAYLIST_ROW, entries);
            dat.write::<u32>(playlists, i * PLAYLIST_ROW + 4, p.entries.len() as u32, "PlaylistRow")?;
        }
        dat.set_root(PLAYLIST_ROOT, playlists);

        for message in bad {
            ctx.warn(message);
        }
        ctx.save_dat(TEMPLATE, &dat)?;
        info!(
            "Wrote data tables for {} fighters, {} stages, {} tracks",
            fighter_count, stage_count, music_count
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gen::testutil::{run_pass, store};
    use crate::project::{Fighter, Music, Project, Series, SoundGroup, Stage};

    fn template() -> Vec<u8> {
        let mut dat = DatFile::new("MxDt.dat");
        let stale = dat.alloc(16);
        dat.set_root(FIGHTER_ROOT, stale);
        dat.to_bytes()
    }

    fn project() -> Project {
        let mut project = Project {
            music: vec![Music { name: "theme".into(), ..Music::default() }],
            series: vec![Series::default()],
            sound_groups: vec![SoundGroup::default()],
            stages: (0..3)
                .map(|i| Stage {
                    name: format!("stage{i}"),
                    playlist: vec![PlaylistEntry { music: 0, chance: 50 }],
                    ..Stage::default()
                })
                .collect(),
            ..Project::default()
        };
        for i in 0..ids::VANILLA_FIGHTER_COUNT {
            project.fighters.push(Fighter { name: format!("f{i}"), ..Fighter::default() });
        }
        project
    }

    #[test]
    fn external_ids_are_assigned_and_written() {
        let (_dir, mut store) = store();
        store.set(TEMPLATE, template()).unwrap();
        let mut project = project();
        project.add_fighter(Fighter { name: "added".into(), ..Fighter::default() });

        let (ran, warnings) = run_pass(&DataTablePass, &mut project, &mut store);
        assert!(ran);
        assert!(warnings.is_empty(), "{warnings:?}");

        let added = project.fighters.iter().find(|f| f.name == "added").unwrap();
        assert_eq!(added.external_id, ids::FIRST_ADDED_EXTERNAL);
        assert_eq!(project.stages[1].external_id, 2);

        let dat = DatFile::parse("MxDt.dat", &store.get(TEMPLATE).unwrap()).unwrap();
        let table = dat.require_root(FIGHTER_ROOT).unwrap();
        let index = project.fighters.iter().position(|f| f.name == "added").unwrap();
        let ext: u16 = dat.read(table, index * FIGHTER_ROW, "FighterRow").unwrap();
        assert_eq!(ext as usize, ids::FIRST_ADDED_EXTERNAL);
        let name = dat.reference(table, index * FIGHTER_ROW + 0x10).unwrap();
        assert_eq!(dat.string(name), "added");

        let meta = dat.require_root(META_ROOT).unwrap();
        assert_eq!(dat.read::<u32>(meta, 0, "MetaTable").unwrap(), 34);
    }

    #[test]
    fn dangling_references_fall_back_with_warnings() {
        let (_dir, mut store) = store();
        store.set(TEMPLATE, template()).unwrap();
        let mut project = project();
        project.fighters[0].series = 9;
        project.fighters[1].sub_character = Some(99);
        project.stages[0].playlist.push(PlaylistEntry { music: 4, chance: 10 });

        let (_, warnings) = run_pass(&DataTablePass, &mut project, &mut store);
        assert_eq!(warnings.len(), 3);

        let dat = DatFile::parse("MxDt.dat", &store.get(TEMPLATE).unwrap()).unwrap();
        let table = dat.require_root(FIGHTER_ROOT).unwrap();
        assert_eq!(dat.read::<u16>(table, 0x02, "FighterRow").unwrap(), 0);
        assert_eq!(dat.read::<i16>(table, FIGHTER_ROW + 0x08, "FighterRow").unwrap(), NO_FIGHTER);
    }
}
