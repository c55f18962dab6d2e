//! Trophy tables: parameters, names and six parallel tables of model IDs.
//! The collection table and the three order tables list model IDs in
//! collection, US name, JP name and series order. The two rank tables are
//! indexed by model ID and give its position in the matching name order.

use std::collections::HashSet;

use log::info;

use super::{Generator, PassContext};
use crate::dat::{DatFile, NodeId};
use crate::project::Trophy;
use crate::Result;

pub const TEMPLATE: &str = "files/TyDataf.dat";
pub const PARAM_ROOT: &str = "tyParamTable";
pub const NAME_ROOT: &str = "tyNameTable";
pub const COLLECTION_ROOT: &str = "tyOrderCollection";
pub const ORDER_US_ROOT: &str = "tyOrderAlphaUs";
pub const RANK_US_ROOT: &str = "tyRankAlphaUs";
pub const ORDER_JP_ROOT: &str = "tyOrderAlphaJp";
pub const RANK_JP_ROOT: &str = "tyRankAlphaJp";
pub const ORDER_SERIES_ROOT: &str = "tyOrderSeries";

pub const PARAM_ROW: usize = 0x08;
/// Rank of a model ID no trophy uses.
pub const NO_RANK: u16 = 0xFFFF;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortTables {
    pub collection: Vec<u16>,
    pub order_us: Vec<u16>,
    pub order_jp: Vec<u16>,
    pub order_series: Vec<u16>,
    pub rank_us: Vec<u16>,
    pub rank_jp: Vec<u16>,
}

/// Model IDs sorted by `key`. The sort is stable, so equal keys keep
/// collection order.
fn order_by<K: Ord>(trophies: &[Trophy], key: impl Fn(&Trophy) -> K) -> Vec<u16> {
    let mut order: Vec<&Trophy> = trophies.iter().collect();
    order.sort_by_key(|t| key(t));
    order.into_iter().map(|t| t.model_id).collect()
}

/// Inverse of an order table, indexed by model ID. A model ID listed twice
/// keeps its first position.
fn ranks(order: &[u16]) -> Vec<u16> {
    let len = order.iter().max().map_or(0, |&max| max as usize + 1);
    let mut rank = vec![NO_RANK; len];
    for (position, &model) in order.iter().enumerate() {
        let slot = &mut rank[model as usize];
        if *slot == NO_RANK {
            *slot = position as u16;
        }
    }
    rank
}

pub fn sort_tables(trophies: &[Trophy]) -> SortTables {
    let order_us = order_by(trophies, |t| t.name.to_lowercase());
    let order_jp = order_by(trophies, |t| t.name_jp.clone());
    SortTables {
        collection: trophies.iter().map(|t| t.model_id).collect(),
        order_series: order_by(trophies, |t| t.series),
        rank_us: ranks(&order_us),
        rank_jp: ranks(&order_jp),
        order_us,
        order_jp,
    }
}

fn write_u16_table(dat: &mut DatFile, values: &[u16]) -> Result<NodeId> {
    let node = dat.alloc(values.len().max(1) * 2);
    for (i, &value) in values.iter().enumerate() {
        dat.write::<u16>(node, i * 2, value, "TrophyOrder")?;
    }
    Ok(node)
}

pub fn read_u16_table(dat: &DatFile, root: &str, count: usize) -> Result<Vec<u16>> {
    let node = dat.require_root(root)?;
    (0..count)
        .map(|i| Ok(dat.read::<u16>(node, i * 2, "TrophyOrder")?))
        .collect()
}

pub struct TrophyPass;

impl Generator for TrophyPass {
    fn name(&self) -> &'static str {
        "trophy"
    }

    fn run(&self, ctx: &mut PassContext) -> Result<bool> {
        let Some(mut dat) = ctx.load_template(TEMPLATE)? else {
            return Ok(false);
        };

        let series_count = ctx.project.series.len();
        let mut bad = Vec::new();
        let mut seen = HashSet::new();
        let mut trophies = ctx.project.trophies.clone();
        for (i, trophy) in trophies.iter_mut().enumerate() {
            if trophy.series >= series_count {
                bad.push(format!(
                    "trophy {i} ({}): series {} does not exist",
                    trophy.name, trophy.series
                ));
                trophy.series = 0;
            }
            if !seen.insert(trophy.model_id) {
                bad.push(format!(
                    "trophy {i} ({}): model ID {} is used by more than one trophy",
                    trophy.name, trophy.model_id
                ));
            }
        }

        let params = dat.alloc(trophies.len().max(1) * PARAM_ROW);
        let mut names = Vec::with_capacity(trophies.len());
        for (i, trophy) in trophies.iter().enumerate() {
            let row = i * PARAM_ROW;
            dat.write::<u16>(params, row, trophy.model_id, "TrophyParam")?;
            dat.write::<u16>(params, row + 2, trophy.series as u16, "TrophyParam")?;
            dat.write::<u16>(params, row + 4, trophy.unlock_flags, "TrophyParam")?;
            names.push(Some(dat.alloc_string(&trophy.name)));
        }
        dat.set_root(PARAM_ROOT, params);
        let name_table = dat.alloc_reference_array(&names);
        dat.set_root(NAME_ROOT, name_table);

        let tables = sort_tables(&trophies);
        for (root, values) in [
            (COLLECTION_ROOT, &tables.collection),
            (ORDER_US_ROOT, &tables.order_us),
            (RANK_US_ROOT, &tables.rank_us),
            (ORDER_JP_ROOT, &tables.order_jp),
            (RANK_JP_ROOT, &tables.rank_jp),
            (ORDER_SERIES_ROOT, &tables.order_series),
        ] {
            let node = write_u16_table(&mut dat, values)?;
            dat.set_root(root, node);
        }

        for message in bad {
            ctx.warn(message);
        }
        ctx.save_dat(TEMPLATE, &dat)?;
        info!("Wrote trophy tables for {} trophies", trophies.len());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gen::testutil::{run_pass, store};
    use crate::project::{Project, Series};
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

    fn trophy(name: &str, model_id: u16, series: usize) -> Trophy {
        Trophy {
            name: name.to_string(),
            name_jp: name.chars().rev().collect(),
            model_id,
            series,
            ..Trophy::default()
        }
    }

    fn sorted(values: &[u16]) -> Vec<u16> {
        let mut values = values.to_vec();
        values.sort_unstable();
        values
    }

    #[test]
    fn ties_keep_collection_order() {
        let trophies = vec![
            trophy("Mario", 10, 1),
            trophy("fox", 3, 0),
            trophy("mario", 7, 0),
            trophy("Fox", 12, 1),
        ];
        let tables = sort_tables(&trophies);
        assert_eq!(tables.collection, vec![10, 3, 7, 12]);
        assert_eq!(tables.order_us, vec![3, 12, 10, 7]);
        assert_eq!(tables.order_series, vec![3, 7, 10, 12]);
        assert_eq!(tables.rank_us.len(), 13);
        assert_eq!(
            [tables.rank_us[3], tables.rank_us[12], tables.rank_us[10], tables.rank_us[7]],
            [0, 1, 2, 3]
        );
        assert_eq!(tables.rank_us[0], NO_RANK);
    }

    #[test]
    fn random_sets_give_consistent_cross_references() {
        let mut rng = StdRng::seed_from_u64(0x7E0);
        for _ in 0..50 {
            let n = rng.gen_range(0..60);
            let mut models: Vec<u16> = (0..n as u16).map(|m| m * 3 + 5).collect();
            models.shuffle(&mut rng);
            let trophies: Vec<Trophy> = models
                .iter()
                .map(|&model| {
                    let name: String = (0..3).map(|_| rng.gen_range(b'a'..=b'd') as char).collect();
                    trophy(&name, model, rng.gen_range(0..4))
                })
                .collect();
            let tables = sort_tables(&trophies);
            assert_eq!(tables.collection, models);
            for order in [&tables.order_us, &tables.order_jp, &tables.order_series] {
                assert_eq!(sorted(order), sorted(&models));
            }
            for (order, rank) in [
                (&tables.order_us, &tables.rank_us),
                (&tables.order_jp, &tables.rank_jp),
            ] {
                for i in 0..n {
                    assert_eq!(rank[order[i] as usize] as usize, i);
                }
            }
        }
    }

    #[test]
    fn pass_writes_all_tables() {
        let (_dir, mut store) = store();
        store.set(TEMPLATE, DatFile::new("TyDataf.dat").to_bytes()).unwrap();
        let mut project = Project {
            series: vec![Series::default(), Series::default()],
            trophies: vec![trophy("b", 5, 1), trophy("a", 2, 3), trophy("c", 9, 0)],
            ..Project::default()
        };

        let (ran, warnings) = run_pass(&TrophyPass, &mut project, &mut store);
        assert!(ran);
        assert_eq!(warnings.len(), 1);

        let dat = DatFile::parse("TyDataf.dat", &store.get(TEMPLATE).unwrap()).unwrap();
        assert_eq!(read_u16_table(&dat, COLLECTION_ROOT, 3).unwrap(), vec![5, 2, 9]);
        assert_eq!(read_u16_table(&dat, ORDER_US_ROOT, 3).unwrap(), vec![2, 5, 9]);
        let rank_us = read_u16_table(&dat, RANK_US_ROOT, 10).unwrap();
        assert_eq!([rank_us[2], rank_us[5], rank_us[9]], [0, 1, 2]);
        assert_eq!(rank_us[0], NO_RANK);
        // The dangling series falls back to 0 and sorts with trophy 2.
        assert_eq!(read_u16_table(&dat, ORDER_SERIES_ROOT, 3).unwrap(), vec![2, 9, 5]);
        let names = dat.require_root(NAME_ROOT).unwrap();
        let second = dat.reference(names, 4).unwrap();
        assert_eq!(dat.string(second), "a");
    }

    #[test]
    fn shared_model_ids_are_reported() {
        let (_dir, mut store) = store();
        store.set(TEMPLATE, DatFile::new("TyDataf.dat").to_bytes()).unwrap();
        let mut project = Project {
            series: vec![Series::default()],
            trophies: vec![trophy("b", 4, 0), trophy("a", 4, 0)],
            ..Project::default()
        };

        let (_, warnings) = run_pass(&TrophyPass, &mut project, &mut store);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("model ID 4"));

        let dat = DatFile::parse("TyDataf.dat", &store.get(TEMPLATE).unwrap()).unwrap();
        assert_eq!(read_u16_table(&dat, RANK_US_ROOT, 5).unwrap()[4], 0);
    }
}
