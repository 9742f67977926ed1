use std::collections::{BTreeMap, HashMap};

use log::*;

use crate::graph::{FrozenPair, HogPair};

/// What happened at one ancestral level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelStat {
    pub taxon: String,
    pub components: usize,
    /// Child HOGs that were merged into new ones
    pub merged_inputs: usize,
    /// Child HOGs carried forward unmerged
    pub solos: usize,
    pub output_hogs: usize,
    /// Newly frozen HOG pairs, when freezing is enabled
    pub frozen_pairs: Option<usize>,
}

pub trait StatsSink {
    fn add_level_stat(&mut self, stat: LevelStat);
    fn add_frozen_pairs(&mut self, taxon: &str, pairs: BTreeMap<HogPair, FrozenPair>);
}

#[derive(Debug, Default)]
pub struct StatisticTracker {
    levels: Vec<LevelStat>,
    frozen_per_level: HashMap<String, BTreeMap<HogPair, FrozenPair>>,
}

impl StatisticTracker {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn level(&self, taxon: &str) -> Option<&LevelStat> {
        self.levels.iter().find(|l| l.taxon == taxon)
    }

    #[cfg(test)]
    pub fn frozen(&self, taxon: &str) -> Option<&BTreeMap<HogPair, FrozenPair>> {
        self.frozen_per_level.get(taxon)
    }

    pub fn summary(&self) {
        info!(
            "{:<30} {:>8} {:>8} {:>8} {:>8} {:>8}",
            "taxon", "CCs", "merged", "solos", "HOGs", "frozen"
        );
        for l in self.levels.iter() {
            info!(
                "{:<30} {:>8} {:>8} {:>8} {:>8} {:>8}",
                l.taxon,
                l.components,
                l.merged_inputs,
                l.solos,
                l.output_hogs,
                l.frozen_pairs.map(|f| f.to_string()).unwrap_or_else(|| "-".into())
            );
        }
        if !self.frozen_per_level.is_empty() {
            let total = self.frozen_per_level.values().map(|ps| ps.len()).sum::<usize>();
            info!("{} HOG pairs frozen over {} levels", total, self.frozen_per_level.len());
        }
    }
}

impl StatsSink for StatisticTracker {
    fn add_level_stat(&mut self, stat: LevelStat) {
        self.levels.push(stat);
    }

    fn add_frozen_pairs(&mut self, taxon: &str, pairs: BTreeMap<HogPair, FrozenPair>) {
        for p in pairs.values() {
            trace!("Frozen at {}: {:?} ({:?} / {:?})", taxon, p.pair, p.left, p.right);
        }
        self.frozen_per_level.entry(taxon.to_owned()).or_default().extend(pairs);
    }
}
