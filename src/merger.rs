use std::collections::{BTreeMap, HashSet};

use anyhow::*;
use log::*;
use logging_timer::time;

use crate::entity::{GenomeID, HogID, Registry};
use crate::errors::{DataError, RuntimeError};
use crate::graph::{self, FrozenPair, GraphBuilder, HogPair, RelationGraph, RelationType};
use crate::io::PairwiseSource;
use crate::settings::{MergeMethod, Settings};
use crate::stats::{LevelStat, StatsSink};
use crate::temporary::TemporaryConnectedComponent;
use crate::unionfind::UnionFind;
use crate::xml::{GroupsXml, GROUP_TAG};

/// The collaborators of a run, shared by all the levels of the traversal.
pub struct Context<'a> {
    pub settings: &'a Settings,
    pub source: &'a dyn PairwiseSource,
    pub xml: &'a mut dyn GroupsXml,
    pub stats: &'a mut dyn StatsSink,
}

/// Create the ancestral genome parent of `children` and fill it with the
/// HOGs resulting from the merge of its children's.
pub fn build_ancestral_genome(
    registry: &mut Registry,
    ctx: &mut Context,
    name: Option<String>,
    children: Vec<GenomeID>,
    threshold: Option<f64>,
) -> Result<GenomeID> {
    let genome = registry.new_ancestral_genome(name, children, threshold);
    let taxon = registry.genome(genome).taxon.clone();
    info!(
        "===== {} -- {} children, {} species =====",
        taxon,
        registry.genome(genome).children.len(),
        registry.genome(genome).leaf_species().len()
    );

    let hogs = MergeAncestral::new(genome)
        .do_the_merge(registry, ctx)
        .map_err(|source| RuntimeError::MergeFailed { source, taxon })?;
    registry.set_hogs(genome, hogs);
    Ok(genome)
}

/// The state of the merge of the children of one ancestral genome.
struct MergeAncestral {
    genome: GenomeID,
    orthology: RelationGraph,
    paralogy: RelationGraph,
    components: Vec<Vec<HogID>>,
    /// Child HOGs absorbed in a new HOG
    computed: HashSet<HogID>,
    new_hogs: Vec<HogID>,
    frozen: BTreeMap<HogPair, FrozenPair>,
}

impl MergeAncestral {
    fn new(genome: GenomeID) -> Self {
        MergeAncestral {
            genome,
            orthology: RelationGraph::new(),
            paralogy: RelationGraph::new(),
            components: Vec::new(),
            computed: HashSet::new(),
            new_hogs: Vec::new(),
            frozen: BTreeMap::new(),
        }
    }

    fn do_the_merge(mut self, registry: &mut Registry, ctx: &mut Context) -> Result<Vec<HogID>> {
        let settings = ctx.settings;
        self.build_graphs(registry, ctx.source, settings)?;
        if self.orthology.is_empty() && self.paralogy.is_empty() {
            info!("No relations between the children HOGs");
        } else {
            debug!("Orthology graph: {} edges", self.orthology.len());
        }

        let threshold = registry.genome(self.genome).merge_threshold(settings);
        if settings.dynamic_threshold.is_some() {
            info!("Dynamic merging threshold: {:.2}", threshold);
        }
        match settings.method {
            MergeMethod::Pair => {
                self.clean_graph_pair(registry, threshold)?;
                self.search_cc();
            }
            MergeMethod::Update => {
                self.search_cc();
                // Only the HOGs actually merged by the agglomeration count
                self.computed.clear();
                self.clean_graph_update(registry, threshold, settings.use_paralogs)?;
            }
        }
        info!("{} connected components found", self.components.len());

        self.cc_to_hog(registry, ctx.xml)?;
        info!("{} HOGs merged into {} HOGs", self.computed.len(), self.new_hogs.len());

        let solos = self.solo_hogs(registry);
        self.update_solo_hogs(registry, &solos);
        info!("{} solo HOGs updated", solos.len());

        let frozen_pairs = settings.unmerged_threshold.map(|freeze| {
            let (mut frozen, mut just_frozen) = (0, 0);
            for &c in registry.genome(self.genome).children.iter() {
                for &h in registry.genome(c).hogs.iter() {
                    let unmerged = registry.hog(h).unmerged_count;
                    if unmerged >= freeze {
                        frozen += 1;
                    }
                    if unmerged == freeze {
                        just_frozen += 1;
                    }
                }
            }
            info!("HOGs frozen: {} ({})", frozen, just_frozen);
            self.frozen.len()
        });

        let taxon = registry.genome(self.genome).taxon.clone();
        ctx.stats.add_level_stat(LevelStat {
            taxon: taxon.clone(),
            components: self.components.len(),
            merged_inputs: self.computed.len(),
            solos: solos.len(),
            output_hogs: self.new_hogs.len(),
            frozen_pairs,
        });
        if settings.unmerged_threshold.is_some() {
            ctx.stats.add_frozen_pairs(&taxon, std::mem::take(&mut self.frozen));
        }

        Ok(self.new_hogs)
    }

    /// With the `pair` method, paralogy is subtracted from the orthology
    /// graph; with `update`, it lives in its own graph.
    #[time]
    fn build_graphs(
        &mut self,
        registry: &Registry,
        source: &dyn PairwiseSource,
        settings: &Settings,
    ) -> Result<()> {
        let builder =
            GraphBuilder::new(registry, source, self.genome, settings.unmerged_threshold);
        builder.update_graph(&mut self.orthology, RelationType::Orthology, &mut self.frozen)?;
        if settings.use_paralogs {
            let target = match settings.method {
                MergeMethod::Pair => &mut self.orthology,
                MergeMethod::Update => &mut self.paralogy,
            };
            builder.update_graph(target, RelationType::Paralogy, &mut self.frozen)?;
        }
        Ok(())
    }

    /// Reduce every edge to 1 if its percentage reaches `threshold`, 0 otherwise.
    #[time]
    fn clean_graph_pair(&mut self, registry: &Registry, threshold: f64) -> Result<()> {
        let cleaned = self
            .orthology
            .iter()
            .map(|(pair, relations)| {
                graph::percentage(registry, pair.left(), pair.right(), relations)
                    .map(|score| (pair, if score >= threshold { 1 } else { 0 }))
            })
            .collect::<Result<Vec<_>>>()?;
        for (pair, weight) in cleaned {
            self.orthology.set(pair, weight);
        }
        Ok(())
    }

    /// Connected components over the positive edges of the orthology graph.
    fn search_cc(&mut self) {
        let mut uf = UnionFind::new();
        for (pair, weight) in self.orthology.iter() {
            if weight <= 0 {
                continue;
            }
            uf.union(pair.left(), pair.right());
            self.computed.insert(pair.left());
            self.computed.insert(pair.right());
        }
        self.components = uf.get_components();
    }

    /// Agglomerate each connected component; only the merged groups remain
    /// as components.
    #[time]
    fn clean_graph_update(
        &mut self,
        registry: &Registry,
        threshold: f64,
        use_paralogs: bool,
    ) -> Result<()> {
        let orthology = &self.orthology;
        let paralogy = &self.paralogy;
        let scorer = |xs: &[HogID], ys: &[HogID]| -> Result<f64> {
            let mut score = graph::set_percentage(registry, xs, ys, orthology)?;
            if use_paralogs {
                score += graph::set_percentage(registry, xs, ys, paralogy)?;
            }
            Ok(score)
        };

        let mut merged = Vec::new();
        for component in self.components.iter() {
            let mut cc = TemporaryConnectedComponent::new(component, &scorer)?;
            let merges = cc.agglomerate(threshold, &scorer)?;
            trace!("{} HOGs, {} merges", component.len(), merges);
            let (composed, _) = cc.into_groups();
            for hogs in composed {
                self.computed.extend(hogs.iter().copied());
                merged.push(hogs);
            }
        }
        self.components = merged;
        Ok(())
    }

    /// Create one new HOG per connected component.
    #[time]
    fn cc_to_hog(&mut self, registry: &mut Registry, xml: &mut dyn GroupsXml) -> Result<()> {
        let children = registry.genome(self.genome).children.clone();
        let taxon = registry.genome(self.genome).taxon.clone();

        for component in self.components.iter() {
            let group = xml.create_element(None, GROUP_TAG);
            xml.set_attribute(group, "taxonId", &self.genome.to_string());
            let property = xml.create_element(Some(group), "property");
            xml.set_attribute(property, "name", "TaxRange");
            xml.set_attribute(property, "value", &taxon);
            let new_hog = registry.new_hog(self.genome, group);

            // Cluster the HOGs by the child they come from
            let mut by_child = children.iter().map(|&c| (c, Vec::new())).collect::<Vec<_>>();
            for &h in component.iter() {
                let top = registry.hog(h).top_genome;
                by_child
                    .iter_mut()
                    .find(|(c, _)| *c == top)
                    .ok_or(DataError::ForeignHog { hog: h, genome: self.genome })?
                    .1
                    .push(h);
            }

            for (_, mut hogs) in by_child.into_iter() {
                hogs.sort_unstable();
                // Several HOGs from a single child are in-paralogs
                let target = if hogs.len() > 1 {
                    xml.create_element(Some(group), "paralogGroup")
                } else {
                    group
                };
                for h in hogs {
                    registry.absorb(new_hog, h);
                    xml.append_child(target, registry.hog(h).xml);
                }
            }
            registry.promote(new_hog, self.genome);
            self.new_hogs.push(new_hog);
        }
        Ok(())
    }

    /// The children HOGs that were not absorbed in a new HOG.
    fn solo_hogs(&self, registry: &Registry) -> Vec<HogID> {
        registry
            .genome(self.genome)
            .children
            .iter()
            .flat_map(|&c| registry.genome(c).hogs.iter().copied())
            .filter(|h| !self.computed.contains(h))
            .collect()
    }

    fn update_solo_hogs(&mut self, registry: &mut Registry, solos: &[HogID]) {
        for &h in solos {
            registry.increment_unmerged(h);
            registry.promote(h, self.genome);
            self.new_hogs.push(h);
        }
    }
}
