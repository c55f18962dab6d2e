//! Project persistence under `project/`: one JSON document per collection
//! plus one file per fighter, stage and trophy.

use std::collections::HashSet;

use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::project::Project;
use crate::store::{FileStore, PROJECT_ROOT};
use crate::{ForgeError, Result};

pub const FORMAT_VERSION: u32 = 1;

const MANIFEST: &str = "project.json";
const FIGHTERS_DIR: &str = "fighters";
const STAGES_DIR: &str = "stages";
const TROPHIES_DIR: &str = "trophies";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    fighters: usize,
    stages: usize,
    trophies: usize,
}

fn path(name: &str) -> String {
    format!("{PROJECT_ROOT}/{name}")
}

fn entity_path(dir: &str, index: usize) -> String {
    format!("{PROJECT_ROOT}/{dir}/{index:03}.json")
}

fn write_json<T: Serialize + ?Sized>(store: &mut FileStore, path: &str, value: &T) -> Result<()> {
    store.set(path, serde_json::to_vec_pretty(value)?)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(store: &FileStore, path: &str) -> Result<T> {
    let bytes = store.get(path)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ForgeError::Config(format!("{path} is not a valid project file: {e}")))
}

fn write_entities<T: Serialize>(store: &mut FileStore, dir: &str, items: &[T]) -> Result<()> {
    let mut written = HashSet::new();
    for (i, item) in items.iter().enumerate() {
        let path = entity_path(dir, i);
        write_json(store, &path, item)?;
        written.insert(path);
    }
    for stale in store.list(&path(dir))? {
        if !written.contains(&stale) {
            debug!("removing stale {stale}");
            store.remove(&stale)?;
        }
    }
    Ok(())
}

fn read_entities<T: DeserializeOwned>(store: &FileStore, dir: &str, count: usize) -> Result<Vec<T>> {
    (0..count).map(|i| read_json(store, &entity_path(dir, i))).collect()
}

/// Stages the project's JSON files in the store.
pub fn save_project(store: &mut FileStore, project: &Project) -> Result<()> {
    let manifest = Manifest {
        format_version: FORMAT_VERSION,
        fighters: project.fighters.len(),
        stages: project.stages.len(),
        trophies: project.trophies.len(),
    };
    write_json(store, &path(MANIFEST), &manifest)?;
    write_json(store, &path("build.json"), &project.build)?;
    write_json(store, &path("music.json"), &project.music)?;
    write_json(store, &path("sound_groups.json"), &project.sound_groups)?;
    write_json(store, &path("series.json"), &project.series)?;
    write_json(store, &path("playlists.json"), &project.playlists)?;
    write_json(store, &path("css.json"), &project.css_icons)?;
    write_json(store, &path("sss.json"), &project.sss_icons)?;
    write_json(store, &path("patches.json"), &project.patches)?;

    write_entities(store, FIGHTERS_DIR, &project.fighters)?;
    write_entities(store, STAGES_DIR, &project.stages)?;
    write_entities(store, TROPHIES_DIR, &project.trophies)?;
    info!(
        "Staged project '{}': {} fighters, {} stages, {} trophies",
        project.build.name, manifest.fighters, manifest.stages, manifest.trophies
    );
    Ok(())
}

/// Loads the project, or `None` when the store holds no project yet.
pub fn load_project(store: &FileStore) -> Result<Option<Project>> {
    if !store.exists(&path(MANIFEST)) {
        return Ok(None);
    }
    let manifest: Manifest = read_json(store, &path(MANIFEST))?;
    if manifest.format_version > FORMAT_VERSION {
        return Err(ForgeError::Config(format!(
            "project format {} is newer than supported version {FORMAT_VERSION}",
            manifest.format_version
        )));
    }

    let project = Project {
        build: read_json(store, &path("build.json"))?,
        fighters: read_entities(store, FIGHTERS_DIR, manifest.fighters)?,
        stages: read_entities(store, STAGES_DIR, manifest.stages)?,
        music: read_json(store, &path("music.json"))?,
        sound_groups: read_json(store, &path("sound_groups.json"))?,
        series: read_json(store, &path("series.json"))?,
        trophies: read_entities(store, TROPHIES_DIR, manifest.trophies)?,
        css_icons: read_json(store, &path("css.json"))?,
        sss_icons: read_json(store, &path("sss.json"))?,
        playlists: read_json(store, &path("playlists.json"))?,
        patches: read_json(store, &path("patches.json"))?,
    };
    Ok(Some(project))
}
