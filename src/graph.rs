use std::collections::BTreeMap;
use std::str::FromStr;

use anyhow::*;
use itertools::Itertools;
use log::*;
use rayon::prelude::*;

use crate::entity::{GenomeID, HogID, Registry};
use crate::errors::{ConfigError, DataError};
use crate::io::PairwiseSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RelationType {
    Orthology,
    Paralogy,
}
impl RelationType {
    pub fn code(&self) -> &'static str {
        match self {
            RelationType::Orthology => "O",
            RelationType::Paralogy => "P",
        }
    }

    /// How much a single relation of this type weighs in a graph.
    pub fn weight(&self) -> i64 {
        match self {
            RelationType::Orthology => 1,
            RelationType::Paralogy => -1,
        }
    }
}
impl FromStr for RelationType {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "O" => std::result::Result::Ok(RelationType::Orthology),
            "P" => std::result::Result::Ok(RelationType::Paralogy),
            _ => Err(ConfigError::UnknownRelationType(s.to_owned())),
        }
    }
}

/// An unordered pair of HOGs, stored smallest ID first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HogPair(HogID, HogID);
impl HogPair {
    pub fn new(a: HogID, b: HogID) -> Self {
        if a <= b {
            HogPair(a, b)
        } else {
            HogPair(b, a)
        }
    }

    pub fn left(&self) -> HogID {
        self.0
    }

    pub fn right(&self) -> HogID {
        self.1
    }
}

/// A sparse weighted graph between HOGs; absent edges weigh 0.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelationGraph {
    edges: BTreeMap<HogPair, i64>,
}
impl RelationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, a: HogID, b: HogID, weight: i64) {
        *self.edges.entry(HogPair::new(a, b)).or_insert(0) += weight;
    }

    pub fn set(&mut self, pair: HogPair, weight: i64) {
        self.edges.insert(pair, weight);
    }

    pub fn get(&self, a: HogID, b: HogID) -> i64 {
        self.edges.get(&HogPair::new(a, b)).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (HogPair, i64)> + '_ {
        self.edges.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// A pair of HOGs left out of the graph because one of them is frozen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrozenPair {
    pub pair: HogPair,
    /// Genes of the left HOG, as `<species><external id>`
    pub left: Vec<String>,
    pub right: Vec<String>,
}

fn hog_labels(registry: &Registry, hog: HogID) -> Vec<String> {
    registry.hog(hog).gene_ids().map(|g| registry.gene_label(g)).collect()
}

/// `100 × relations / (|a| × |b|)`, the share of all possible relations
/// between two HOGs that are actually observed.
pub fn percentage(registry: &Registry, a: HogID, b: HogID, relations: i64) -> Result<f64> {
    let (la, lb) = (registry.hog(a).len(), registry.hog(b).len());
    if la == 0 || lb == 0 {
        bail!(DataError::EmptyHog(if la == 0 { a } else { b }));
    }
    Ok(100. * relations as f64 / (la * lb) as f64)
}

/// As [`percentage`], between the union of two sets of HOGs.
pub fn set_percentage(
    registry: &Registry,
    xs: &[HogID],
    ys: &[HogID],
    graph: &RelationGraph,
) -> Result<f64> {
    let mut relations = 0;
    let (mut lx, mut ly) = (0, 0);
    for &x in xs {
        let l = registry.hog(x).len();
        if l == 0 {
            bail!(DataError::EmptyHog(x));
        }
        lx += l;
    }
    for &y in ys {
        let l = registry.hog(y).len();
        if l == 0 {
            bail!(DataError::EmptyHog(y));
        }
        ly += l;
        relations += xs.iter().map(|&x| graph.get(x, y)).sum::<i64>();
    }
    if lx == 0 || ly == 0 {
        bail!("cannot compute a relation percentage on an empty set of HOGs");
    }
    Ok(100. * relations as f64 / (lx * ly) as f64)
}

/// Accumulates the pairwise relations between the children of an ancestral
/// genome into HOG-level graphs.
pub struct GraphBuilder<'a> {
    registry: &'a Registry,
    source: &'a dyn PairwiseSource,
    genome: GenomeID,
    freeze: Option<u32>,
    /// How many species pairs are fetched at once
    batch: usize,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        registry: &'a Registry,
        source: &'a dyn PairwiseSource,
        genome: GenomeID,
        freeze: Option<u32>,
    ) -> Self {
        let batch = 2 * rayon::current_num_threads().max(1);
        GraphBuilder { registry, source, genome, freeze, batch }
    }

    #[cfg(test)]
    pub fn with_batch(mut self, batch: usize) -> Self {
        self.batch = batch.max(1);
        self
    }

    /// Add the `relation` links between every pair of children to `graph`.
    /// Pairs involving a frozen HOG are skipped; the newly frozen ones are
    /// recorded in `frozen`.
    ///
    /// Species pairs are fetched in parallel a batch at a time, and each batch
    /// is folded into the graph before the next one is read.
    pub fn update_graph(
        &self,
        graph: &mut RelationGraph,
        relation: RelationType,
        frozen: &mut BTreeMap<HogPair, FrozenPair>,
    ) -> Result<()> {
        let children = &self.registry.genome(self.genome).children;

        // All the pairs of extant species split by this node
        let jobs = children
            .iter()
            .copied()
            .tuple_combinations::<(_, _)>()
            .filter(|(g1, g2)| g1 != g2)
            .flat_map(|(g1, g2)| {
                let s1s = self.registry.genome(g1).leaf_species();
                let s2s = self.registry.genome(g2).leaf_species();
                s1s.iter()
                    .cartesian_product(s2s.iter())
                    .map(move |(s1, s2)| (g1, g2, s1.as_str(), s2.as_str()))
            })
            .collect::<Vec<_>>();

        let source = self.source;
        for chunk in jobs.chunks(self.batch) {
            let relations = chunk
                .par_iter()
                .map(|&(g1, g2, s1, s2)| {
                    source
                        .pairwise_relations(s1, s2, relation)
                        .with_context(|| anyhow!("while reading {}/{} relations", s1, s2))
                        .map(|pairs| (g1, g2, s1, s2, pairs))
                })
                .collect::<Result<Vec<_>>>()?;

            for (g1, g2, s1, s2, pairs) in relations.into_iter() {
                trace!("{} {}/{} relations: {}", relation.code(), s1, s2, pairs.len());
                self.fold_relations(graph, relation, frozen, (g1, s1), (g2, s2), pairs)?;
            }
        }

        Ok(())
    }

    fn fold_relations(
        &self,
        graph: &mut RelationGraph,
        relation: RelationType,
        frozen: &mut BTreeMap<HogPair, FrozenPair>,
        (g1, s1): (GenomeID, &str),
        (g2, s2): (GenomeID, &str),
        pairs: Vec<(u64, u64)>,
    ) -> Result<()> {
        let extant_1 = self.registry.extant(s1)?;
        let extant_2 = self.registry.extant(s2)?;

        for (gene_1, gene_2) in pairs {
            let h1 = self.registry.gene_hog(extant_1.gene_by_ext_id(gene_1)?, g1)?;
            let h2 = self.registry.gene_hog(extant_2.gene_by_ext_id(gene_2)?, g2)?;

            if let Some(freeze) = self.freeze {
                let u1 = self.registry.hog(h1).unmerged_count;
                let u2 = self.registry.hog(h2).unmerged_count;
                if u1 >= freeze || u2 >= freeze {
                    if u1 == freeze || u2 == freeze {
                        let pair = HogPair::new(h1, h2);
                        frozen.entry(pair).or_insert_with(|| FrozenPair {
                            pair,
                            left: hog_labels(self.registry, pair.left()),
                            right: hog_labels(self.registry, pair.right()),
                        });
                    }
                    continue;
                }
            }

            graph.add(h1, h2, relation.weight());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::InMemoryRelations;
    use crate::xml::OrthoXml;
    use approx::assert_relative_eq;

    #[test]
    fn pairs_are_canonical() {
        assert_eq!(HogPair::new(3, 1), HogPair::new(1, 3));
        assert_eq!(HogPair::new(3, 1).left(), 1);

        let mut g = RelationGraph::new();
        g.add(1, 2, 1);
        g.add(2, 1, 1);
        g.add(2, 1, -1);
        assert_eq!(g.len(), 1);
        assert_eq!(g.get(1, 2), 1);
        assert_eq!(g.get(2, 1), 1);
        assert_eq!(g.get(5, 7), 0);
    }

    #[test]
    fn relation_types() {
        assert_eq!("O".parse::<RelationType>().unwrap(), RelationType::Orthology);
        assert_eq!("P".parse::<RelationType>().unwrap().weight(), -1);
        assert!("X".parse::<RelationType>().is_err());
    }

    fn two_genomes() -> (Registry, InMemoryRelations, GenomeID) {
        let mut xml = OrthoXml::new();
        let mut r = Registry::new();
        let a = r.new_extant_genome("A", 2, &mut xml).unwrap();
        let b = r.new_extant_genome("B", 3, &mut xml).unwrap();
        let anc = r.new_ancestral_genome(Some("AB".into()), vec![a, b], None);

        let mut source = InMemoryRelations::new();
        source.add_genome("A", 2);
        source.add_genome("B", 3);
        source.add_relations("A", "B", RelationType::Orthology, &[(1, 1), (1, 2), (2, 3)]);
        source.add_relations("B", "A", RelationType::Paralogy, &[(1, 1)]);
        (r, source, anc)
    }

    #[test]
    fn builds_weighted_graphs() {
        let (r, source, anc) = two_genomes();
        let builder = GraphBuilder::new(&r, &source, anc, None);
        let mut graph = RelationGraph::new();
        let mut frozen = BTreeMap::new();
        builder.update_graph(&mut graph, RelationType::Orthology, &mut frozen).unwrap();
        builder.update_graph(&mut graph, RelationType::Paralogy, &mut frozen).unwrap();

        let a = r.extant("A").unwrap();
        let b = r.extant("B").unwrap();
        // Extant genes are numbered from 1, each in its own HOG
        let hog = |g: &crate::entity::Genome, ext: usize| g.hogs[ext - 1];
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.get(hog(a, 1), hog(b, 1)), 0);
        assert_eq!(graph.get(hog(a, 1), hog(b, 2)), 1);
        assert_eq!(graph.get(hog(b, 3), hog(a, 2)), 1);
        assert!(frozen.is_empty());
    }

    #[test]
    fn percentages() {
        let (r, _, _) = two_genomes();
        let a = r.extant("A").unwrap().hogs.clone();
        let b = r.extant("B").unwrap().hogs.clone();
        let mut graph = RelationGraph::new();
        graph.add(a[0], b[0], 1);
        graph.add(a[0], b[1], 1);
        graph.add(a[1], b[2], 1);

        assert_relative_eq!(percentage(&r, a[0], b[0], 1).unwrap(), 100.);
        assert_relative_eq!(set_percentage(&r, &a, &b, &graph).unwrap(), 50.);
        assert_relative_eq!(set_percentage(&r, &a[..1], &b[..2], &graph).unwrap(), 100.);
        assert_relative_eq!(set_percentage(&r, &a[1..], &b[..2], &graph).unwrap(), 0.);
        assert!(set_percentage(&r, &[], &b, &graph).is_err());
    }

    #[test]
    fn batches_fold_into_the_same_graph() {
        let mut xml = OrthoXml::new();
        let mut r = Registry::new();
        let mut source = InMemoryRelations::new();
        let mut children = Vec::new();
        for s in ["A", "B", "C", "D"] {
            children.push(r.new_extant_genome(s, 3, &mut xml).unwrap());
            source.add_genome(s, 3);
        }
        let anc = r.new_ancestral_genome(None, children, None);
        source.add_relations("A", "B", RelationType::Orthology, &[(1, 1), (2, 2), (3, 1)]);
        source.add_relations("A", "C", RelationType::Orthology, &[(1, 3)]);
        source.add_relations("D", "B", RelationType::Orthology, &[(2, 2), (3, 3)]);
        source.add_relations("C", "D", RelationType::Orthology, &[(1, 1), (1, 2)]);

        let graph_with = |batch| {
            let builder = GraphBuilder::new(&r, &source, anc, None).with_batch(batch);
            let mut graph = RelationGraph::new();
            let mut frozen = BTreeMap::new();
            builder.update_graph(&mut graph, RelationType::Orthology, &mut frozen).unwrap();
            graph
        };
        let one_by_one = graph_with(1);
        assert_eq!(one_by_one.len(), 8);
        assert_eq!(one_by_one, graph_with(4));
        assert_eq!(one_by_one, graph_with(64));
    }

    #[test]
    fn unknown_gene_aborts() {
        let (r, mut source, anc) = two_genomes();
        source.add_relations("A", "B", RelationType::Orthology, &[(1, 4)]);
        let builder = GraphBuilder::new(&r, &source, anc, None);
        let mut graph = RelationGraph::new();
        let err = builder
            .update_graph(&mut graph, RelationType::Orthology, &mut BTreeMap::new())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DataError>(),
            Some(DataError::UnknownGene { ext_id: 4, .. })
        ));
    }
}
