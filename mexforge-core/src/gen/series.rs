//! Series metadata: the stage to series lookup and the per-series
//! playlist table.

use log::info;

use super::data_table::write_playlist;
use super::{Generator, PassContext};
use crate::dat::DatFile;
use crate::Result;

pub const TEMPLATE: &str = "files/MxSr.dat";
pub const STAGE_SERIES_ROOT: &str = "mexStageSeries";
pub const SERIES_TABLE_ROOT: &str = "mexSeriesTable";

/// Terminates the stage to series lookup.
pub const END_OF_TABLE: u16 = 0xFFFF;
pub const SERIES_HEADER: usize = 0x04;
pub const SERIES_ROW: usize = 0x0C;

pub struct SeriesPass;

impl Generator for SeriesPass {
    fn name(&self) -> &'static str {
        "series"
    }

    fn run(&self, ctx: &mut PassContext) -> Result<bool> {
        let Some(mut dat) = ctx.load_template(TEMPLATE)? else {
            return Ok(false);
        };
        let project = &*ctx.project;
        let series_count = project.series.len();
        let mut bad = Vec::new();

        let lookup = dat.alloc((project.stages.len() + 1) * 2);
        for (i, stage) in project.stages.iter().enumerate() {
            let series = if stage.series < series_count {
                stage.series
            } else {
                bad.push(format!(
                    "stage {i} ({}): series {} does not exist",
                    stage.name, stage.series
                ));
                0
            };
            dat.write::<u16>(lookup, i * 2, series as u16, "StageSeries")?;
        }
        dat.write::<u16>(lookup, project.stages.len() * 2, END_OF_TABLE, "StageSeries")?;
        dat.set_root(STAGE_SERIES_ROOT, lookup);

        // Series without music have nothing to play and are left out.
        let listed: Vec<usize> = (0..series_count)
            .filter(|&i| !project.series[i].playlist.is_empty())
            .collect();
        let table = dat.alloc(SERIES_HEADER + listed.len() * SERIES_ROW);
        dat.write::<u32>(table, 0, listed.len() as u32, "SeriesTable")?;
        for (row, &index) in listed.iter().enumerate() {
            let series = &project.series[index];
            let at = SERIES_HEADER + row * SERIES_ROW;
            dat.write::<u16>(table, at, index as u16, "SeriesRow")?;
            dat.write::<u16>(table, at + 2, series.playlist.len() as u16, "SeriesRow")?;

            let owner = format!("series {index} ({})", series.name);
            let playlist = write_playlist(&mut dat, &series.playlist, project.music.len(), &owner, &mut bad)?;
            dat.set_reference(table, at + 4, playlist);
            let name = dat.alloc_string(&series.name);
            dat.set_reference(table, at + 8, Some(name));
        }
        dat.set_root(SERIES_TABLE_ROOT, table);

        let skipped = series_count - listed.len();
        for message in bad {
            ctx.warn(message);
        }
        ctx.save_dat(TEMPLATE, &dat)?;
        info!(
            "Wrote series tables: {} series listed, {} without playlist skipped",
            listed.len(),
            skipped
        );
        Ok(true)
    }
}

/// Reads the stage to series lookup back, stopping at the terminator.
pub fn read_stage_series(dat: &DatFile) -> Result<Vec<u16>> {
    let node = dat.require_root(STAGE_SERIES_ROOT)?;
    let mut out = Vec::new();
    for i in 0.. {
        let value: u16 = dat.read(node, i * 2, "StageSeries")?;
        if value == END_OF_TABLE {
            break;
        }
        out.push(value);
    }
    Ok(out)
}
