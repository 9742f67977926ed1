use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::*;
use log::*;

use crate::errors::{DataError, FileError};
use crate::graph::RelationType;

/// Where the merger gets genome sizes and pairwise relations from.
pub trait PairwiseSource: Sync {
    fn number_of_proteins(&self, species: &str) -> Result<usize>;
    /// The `relation` pairs between `a` and `b`, as `(id in a, id in b)`.
    fn pairwise_relations(
        &self,
        a: &str,
        b: &str,
        relation: RelationType,
    ) -> Result<Vec<(u64, u64)>>;
}

fn swapped(pairs: &[(u64, u64)]) -> Vec<(u64, u64)> {
    pairs.iter().map(|&(x, y)| (y, x)).collect()
}

/// Relations held in memory, for hand-built scenarios.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct InMemoryRelations {
    proteins: HashMap<String, usize>,
    relations: HashMap<(String, String, RelationType), Vec<(u64, u64)>>,
}

#[cfg(test)]
impl InMemoryRelations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_genome(&mut self, species: &str, n_proteins: usize) {
        self.proteins.insert(species.to_owned(), n_proteins);
    }

    pub fn add_relations(
        &mut self,
        a: &str,
        b: &str,
        relation: RelationType,
        pairs: &[(u64, u64)],
    ) {
        if let Some(known) = self.relations.get_mut(&(b.to_owned(), a.to_owned(), relation)) {
            known.extend(swapped(pairs));
        } else {
            self.relations
                .entry((a.to_owned(), b.to_owned(), relation))
                .or_default()
                .extend_from_slice(pairs);
        }
    }
}

#[cfg(test)]
impl PairwiseSource for InMemoryRelations {
    fn number_of_proteins(&self, species: &str) -> Result<usize> {
        self.proteins
            .get(species)
            .copied()
            .ok_or_else(|| DataError::UnknownSpecies(species.to_owned()).into())
    }

    fn pairwise_relations(
        &self,
        a: &str,
        b: &str,
        relation: RelationType,
    ) -> Result<Vec<(u64, u64)>> {
        if let Some(pairs) = self.relations.get(&(a.to_owned(), b.to_owned(), relation)) {
            Ok(pairs.clone())
        } else if let Some(pairs) = self.relations.get(&(b.to_owned(), a.to_owned(), relation)) {
            Ok(swapped(pairs))
        } else {
            Ok(Vec::new())
        }
    }
}

/// Pairwise relations stored as `<dir>/<A>-<B>.txt` files, one tab-separated
/// pair of external IDs per line; genome sizes in a `species<TAB>count` file.
#[derive(Debug)]
pub struct PairwiseDir {
    orthologs: PathBuf,
    paralogs: Option<PathBuf>,
    proteins: HashMap<String, usize>,
}

fn open(filename: &Path) -> Result<BufReader<File>> {
    File::open(filename).map(BufReader::new).map_err(|source| {
        FileError::CannotOpen { source, filename: filename.display().to_string() }.into()
    })
}

fn read_pairs(filename: &Path) -> Result<Vec<(u64, u64)>> {
    let mut r = Vec::new();
    for (i, l) in open(filename)?.lines().enumerate() {
        let l = l?;
        let l = l.trim();
        if l.is_empty() || l.starts_with('#') {
            continue;
        }
        let erroneous =
            || FileError::ErroneousLine { filename: filename.display().to_string(), line: i + 1 };
        let mut s = l.split('\t');
        let x = s.next().and_then(|x| x.trim().parse::<u64>().ok()).ok_or_else(erroneous)?;
        let y = s.next().and_then(|y| y.trim().parse::<u64>().ok()).ok_or_else(erroneous)?;
        r.push((x, y));
    }
    Ok(r)
}

fn read_genome_sizes(filename: &Path) -> Result<HashMap<String, usize>> {
    let mut r = HashMap::new();
    for (i, l) in open(filename)?.lines().enumerate() {
        let l = l?;
        if l.trim().is_empty() || l.starts_with('#') {
            continue;
        }
        let mut s = l.split('\t');
        let species = s.next().map(str::trim).filter(|s| !s.is_empty());
        let count = s.next().and_then(|c| c.trim().parse::<usize>().ok());
        match (species, count) {
            (Some(species), Some(count)) => {
                r.insert(species.to_owned(), count);
            }
            _ => bail!(FileError::ErroneousLine {
                filename: filename.display().to_string(),
                line: i + 1
            }),
        }
    }
    Ok(r)
}

impl PairwiseDir {
    pub fn new(orthologs: &str, paralogs: Option<&str>, genomes: &str) -> Result<Self> {
        let proteins = read_genome_sizes(Path::new(genomes))
            .with_context(|| anyhow!("while reading genome sizes from {}", genomes))?;
        info!("{} genome sizes read from {}", proteins.len(), genomes);
        Ok(PairwiseDir {
            orthologs: PathBuf::from(orthologs),
            paralogs: paralogs.map(PathBuf::from),
            proteins,
        })
    }
}

impl PairwiseSource for PairwiseDir {
    fn number_of_proteins(&self, species: &str) -> Result<usize> {
        self.proteins
            .get(species)
            .copied()
            .ok_or_else(|| DataError::UnknownSpecies(species.to_owned()).into())
    }

    fn pairwise_relations(
        &self,
        a: &str,
        b: &str,
        relation: RelationType,
    ) -> Result<Vec<(u64, u64)>> {
        let dir = match relation {
            RelationType::Orthology => &self.orthologs,
            RelationType::Paralogy => match self.paralogs {
                Some(ref p) => p,
                None => return Ok(Vec::new()),
            },
        };

        let direct = dir.join(format!("{}-{}.txt", a, b));
        let reverse = dir.join(format!("{}-{}.txt", b, a));
        if direct.is_file() {
            read_pairs(&direct)
        } else if reverse.is_file() {
            read_pairs(&reverse).map(|pairs| swapped(&pairs))
        } else {
            warn!("No {} relations found between {} and {}", relation.code(), a, b);
            Ok(Vec::new())
        }
    }
}
