use std::collections::{BTreeMap, HashMap};

use anyhow::*;
use identity_hash::IntMap;
use log::*;
use smallvec::SmallVec;

use crate::errors::DataError;
use crate::settings::Settings;
use crate::xml::{GroupsXml, XmlHandle};

pub type GeneID = usize;
pub type HogID = usize;
pub type GenomeID = usize;
/// The genes of a single genome inside a HOG; rarely more than a couple.
pub type GeneList = SmallVec<[GeneID; 2]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenomeKind {
    Extant,
    Ancestral,
}

#[derive(Debug)]
pub struct Gene {
    pub id: GeneID,
    /// The ID used for this gene in the pairwise relation files
    pub ext_id: u64,
    /// The extant genome this gene belongs to
    pub genome: GenomeID,
    /// The HOG containing this gene at every level it went through
    hogs: IntMap<GenomeID, HogID>,
}
impl Gene {
    pub fn hog_at(&self, genome: GenomeID) -> Option<HogID> {
        self.hogs.get(&genome).copied()
    }
}

/// A Hierarchical Orthologous Group.
#[derive(Debug)]
pub struct Hog {
    /// Extant genome to the genes it contributes to this HOG
    pub genes: BTreeMap<GenomeID, GeneList>,
    /// The oldest genome this HOG currently stands for
    pub top_genome: GenomeID,
    /// How many ancestral levels this HOG went through without merging
    pub unmerged_count: u32,
    pub xml: XmlHandle,
}
impl Hog {
    /// Total number of genes, all genomes included.
    pub fn len(&self) -> usize {
        self.genes.values().map(|gs| gs.len()).sum()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn gene_ids(&self) -> impl Iterator<Item = GeneID> + '_ {
        self.genes.values().flat_map(|gs| gs.iter().copied())
    }

    fn merge_with(&mut self, incoming: &BTreeMap<GenomeID, GeneList>) {
        for (genome, genes) in incoming {
            let mine = self.genes.entry(*genome).or_default();
            for g in genes {
                if !mine.contains(g) {
                    mine.push(*g);
                }
            }
        }
    }
}

#[derive(Debug)]
pub struct Genome {
    pub kind: GenomeKind,
    pub taxon: String,
    /// All the extant species below (or at) this genome
    species: Vec<String>,
    /// Immediate children; empty for extant genomes
    pub children: Vec<GenomeID>,
    /// The HOGs this genome currently holds
    pub hogs: Vec<HogID>,
    /// External ID to gene; empty for ancestral genomes
    genes: HashMap<u64, GeneID>,
    /// Merge threshold annotated by the dynamic threshold pre-pass
    pub threshold: Option<f64>,
}
impl Genome {
    pub fn leaf_species(&self) -> &[String] {
        &self.species
    }

    pub fn is_extant(&self) -> bool {
        self.kind == GenomeKind::Extant
    }

    pub fn gene_by_ext_id(&self, ext_id: u64) -> Result<GeneID> {
        self.genes
            .get(&ext_id)
            .copied()
            .ok_or_else(|| DataError::UnknownGene { species: self.taxon.clone(), ext_id }.into())
    }

    /// The genes of an extant genome, by increasing ID.
    pub fn gene_ids(&self) -> Vec<GeneID> {
        let mut ids = self.genes.values().copied().collect::<Vec<_>>();
        ids.sort_unstable();
        ids
    }

    pub fn merge_threshold(&self, settings: &Settings) -> f64 {
        if settings.dynamic_threshold.is_some() {
            self.threshold.unwrap_or(settings.parameter_1)
        } else {
            settings.parameter_1
        }
    }
}

/// Owns every gene, HOG and genome created during a run. IDs are indices in
/// the arenas, hence unique and never reused.
#[derive(Debug, Default)]
pub struct Registry {
    genes: Vec<Gene>,
    hogs: Vec<Hog>,
    genomes: Vec<Genome>,
    /// Extant genomes, by species name
    zoo: HashMap<String, GenomeID>,
    /// Ancestral genomes, by taxon name
    retirement_house: HashMap<String, GenomeID>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gene(&self, id: GeneID) -> &Gene {
        &self.genes[id]
    }

    pub fn hog(&self, id: HogID) -> &Hog {
        &self.hogs[id]
    }

    pub fn genome(&self, id: GenomeID) -> &Genome {
        &self.genomes[id]
    }

    #[cfg(test)]
    pub fn genes(&self) -> impl Iterator<Item = &Gene> {
        self.genes.iter()
    }

    #[cfg(test)]
    pub fn hogs(&self) -> impl Iterator<Item = (HogID, &Hog)> {
        self.hogs.iter().enumerate()
    }

    pub fn genomes(&self) -> impl Iterator<Item = (GenomeID, &Genome)> {
        self.genomes.iter().enumerate()
    }

    pub fn extant(&self, species: &str) -> Result<&Genome> {
        self.zoo
            .get(species)
            .map(|&id| &self.genomes[id])
            .ok_or_else(|| DataError::UnknownSpecies(species.to_owned()).into())
    }

    #[cfg(test)]
    pub fn ancestral(&self, taxon: &str) -> Option<GenomeID> {
        self.retirement_house.get(taxon).copied()
    }

    /// The HOG holding `gene` at the level of `genome`.
    pub fn gene_hog(&self, gene: GeneID, genome: GenomeID) -> Result<HogID> {
        self.genes[gene]
            .hog_at(genome)
            .ok_or_else(|| DataError::MissingHog { gene, genome }.into())
    }

    pub fn gene_label(&self, gene: GeneID) -> String {
        let g = &self.genes[gene];
        format!("{}{}", self.genomes[g.genome].taxon, g.ext_id)
    }

    /// Create an extant genome of `n_proteins` genes, numbered from 1, each
    /// in its own HOG.
    pub fn new_extant_genome(
        &mut self,
        species: &str,
        n_proteins: usize,
        xml: &mut dyn GroupsXml,
    ) -> Result<GenomeID> {
        if self.zoo.contains_key(species) {
            bail!(DataError::DuplicateSpecies(species.to_owned()));
        }

        let id = self.genomes.len();
        let mut genes = HashMap::with_capacity(n_proteins);
        let mut hogs = Vec::with_capacity(n_proteins);
        for ext_id in 1..=n_proteins as u64 {
            let gene_id = self.genes.len();
            let xml_gene = xml.create_element(None, "geneRef");
            xml.set_attribute(xml_gene, "id", &gene_id.to_string());

            let hog_id = self.new_hog(id, xml_gene);
            self.hogs[hog_id].genes.insert(id, GeneList::from_slice(&[gene_id]));
            let mut gene_hogs = IntMap::default();
            gene_hogs.insert(id, hog_id);
            self.genes.push(Gene { id: gene_id, ext_id, genome: id, hogs: gene_hogs });

            genes.insert(ext_id, gene_id);
            hogs.push(hog_id);
        }

        self.genomes.push(Genome {
            kind: GenomeKind::Extant,
            taxon: species.to_owned(),
            species: vec![species.to_owned()],
            children: Vec::new(),
            hogs,
            genes,
            threshold: None,
        });
        self.zoo.insert(species.to_owned(), id);
        debug!("Extant genome {} (#{}) -- {} genes", species, id, n_proteins);
        Ok(id)
    }

    /// Register an ancestral genome; its HOGs are filled in by the merger.
    pub(crate) fn new_ancestral_genome(
        &mut self,
        name: Option<String>,
        children: Vec<GenomeID>,
        threshold: Option<f64>,
    ) -> GenomeID {
        let id = self.genomes.len();
        let mut species = Vec::new();
        for &c in children.iter() {
            for s in self.genomes[c].leaf_species() {
                if !species.contains(s) {
                    species.push(s.clone());
                }
            }
        }
        let taxon = name.filter(|n| !n.is_empty()).unwrap_or_else(|| species.join("/"));
        if self.retirement_house.insert(taxon.clone(), id).is_some() {
            warn!("Taxon {} appears more than once in the species tree", taxon);
        }

        self.genomes.push(Genome {
            kind: GenomeKind::Ancestral,
            taxon,
            species,
            children,
            hogs: Vec::new(),
            genes: HashMap::new(),
            threshold,
        });
        id
    }

    pub(crate) fn set_hogs(&mut self, genome: GenomeID, hogs: Vec<HogID>) {
        self.genomes[genome].hogs = hogs;
    }

    pub(crate) fn new_hog(&mut self, top_genome: GenomeID, xml: XmlHandle) -> HogID {
        let id = self.hogs.len();
        self.hogs.push(Hog { genes: BTreeMap::new(), top_genome, unmerged_count: 0, xml });
        id
    }

    /// Copy the genes of `source` into `target`.
    pub(crate) fn absorb(&mut self, target: HogID, source: HogID) {
        let incoming = self.hogs[source].genes.clone();
        self.hogs[target].merge_with(&incoming);
    }

    /// Make `hog` the representative of its genes at the level of `genome`.
    pub(crate) fn promote(&mut self, hog: HogID, genome: GenomeID) {
        self.hogs[hog].top_genome = genome;
        let genes = self.hogs[hog].gene_ids().collect::<Vec<_>>();
        for g in genes {
            self.genes[g].hogs.insert(genome, hog);
        }
    }

    pub(crate) fn increment_unmerged(&mut self, hog: HogID) {
        self.hogs[hog].unmerged_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::OrthoXml;

    #[test]
    fn extant_genome_has_one_hog_per_gene() {
        let mut xml = OrthoXml::new();
        let mut r = Registry::new();
        let a = r.new_extant_genome("HUMAN", 3, &mut xml).unwrap();

        let genome = r.genome(a);
        assert!(genome.is_extant());
        assert_eq!(genome.gene_ids().len(), 3);
        assert_eq!(genome.hogs.len(), 3);
        assert_eq!(genome.leaf_species(), &["HUMAN".to_string()]);
        for &h in genome.hogs.iter() {
            let hog = r.hog(h);
            assert_eq!(hog.len(), 1);
            assert_eq!(hog.top_genome, a);
            assert_eq!(hog.unmerged_count, 0);
            let g = hog.gene_ids().next().unwrap();
            assert_eq!(r.gene_hog(g, a).unwrap(), h);
        }
        let g2 = genome.gene_by_ext_id(2).unwrap();
        assert_eq!(r.gene(g2).ext_id, 2);
        assert_eq!(r.gene_label(g2), "HUMAN2");
    }

    #[test]
    fn unknown_gene_is_an_error() {
        let mut xml = OrthoXml::new();
        let mut r = Registry::new();
        let a = r.new_extant_genome("HUMAN", 2, &mut xml).unwrap();
        let err = r.genome(a).gene_by_ext_id(3).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DataError>(),
            Some(DataError::UnknownGene { ext_id: 3, .. })
        ));
        assert!(r.extant("MOUSE").is_err());
        assert!(r.new_extant_genome("HUMAN", 2, &mut xml).is_err());
    }

    #[test]
    fn absorb_skips_known_genes() {
        let mut xml = OrthoXml::new();
        let mut r = Registry::new();
        let a = r.new_extant_genome("A", 2, &mut xml).unwrap();
        let b = r.new_extant_genome("B", 1, &mut xml).unwrap();
        let anc = r.new_ancestral_genome(None, vec![a, b], None);
        assert_eq!(r.genome(anc).taxon, "A/B");
        assert_eq!(r.genome(anc).leaf_species(), &["A".to_string(), "B".to_string()]);
        assert!(r.ancestral("A/B").is_some());

        let handle = xml.create_element(None, crate::xml::GROUP_TAG);
        let merged = r.new_hog(anc, handle);
        let (a1, a2, b1) = (r.genome(a).hogs[0], r.genome(a).hogs[1], r.genome(b).hogs[0]);
        r.absorb(merged, a1);
        r.absorb(merged, a2);
        r.absorb(merged, b1);
        r.absorb(merged, a1);
        assert_eq!(r.hog(merged).len(), 3);
        assert_eq!(r.hog(merged).genes[&a].len(), 2);

        r.promote(merged, anc);
        for g in r.hog(merged).gene_ids().collect::<Vec<_>>() {
            assert_eq!(r.gene_hog(g, anc).unwrap(), merged);
        }
        // The extant level still points to the solo HOGs
        let g = r.hog(a1).gene_ids().next().unwrap();
        assert_eq!(r.gene_hog(g, a).unwrap(), a1);
    }
}
