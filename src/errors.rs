use colored::Colorize;
use thiserror::Error;

use crate::entity::{GeneID, GenomeID, HogID};

#[derive(Error, Debug)]
pub enum FileError {
    #[error("failed to open {}", .filename.bright_yellow().bold())]
    CannotOpen { source: std::io::Error, filename: String },

    #[error("while creating {filename}")]
    WhileCreating { source: std::io::Error, filename: String },

    #[error("erroneous line {} in {}", .line, .filename.yellow().bold())]
    ErroneousLine { filename: String, line: usize },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown merge method {}; expected `pair` or `update`", .0.yellow().bold())]
    UnknownMergeMethod(String),

    #[error("unknown relation type {}; expected `O` or `P`", .0.yellow().bold())]
    UnknownRelationType(String),

    #[error(
        "unknown threshold scheme {}; expected `first-leaf` or `per-leaf`",
        .0.yellow().bold()
    )]
    UnknownThresholdScheme(String),

    #[error("a dynamic threshold needs both a leaf score and a root score")]
    IncompleteDynamicThreshold,

    #[error("invalid threshold {}", .0.to_string().yellow().bold())]
    InvalidThreshold(f64),
}

#[derive(Error, Debug)]
pub enum DataError {
    #[error(
        "gene {} not found in {}",
        .ext_id.to_string().yellow().bold(),
        .species.yellow().bold()
    )]
    UnknownGene { species: String, ext_id: u64 },

    #[error("species {} not found among the extant genomes", .0.yellow().bold())]
    UnknownSpecies(String),

    #[error("species {} appears twice in the species tree", .0.yellow().bold())]
    DuplicateSpecies(String),

    #[error("found nameless leaf in species tree")]
    NamelessLeaf,

    #[error("HOG #{0} holds no gene; cannot compute a relation percentage")]
    EmptyHog(HogID),

    #[error("gene #{gene} has no HOG at genome #{genome}")]
    MissingHog { gene: GeneID, genome: GenomeID },

    #[error("HOG #{hog} does not belong to any child of genome #{genome}")]
    ForeignHog { hog: HogID, genome: GenomeID },
}

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("failed to build ancestral genome {}", .taxon.yellow().bold())]
    MergeFailed { source: anyhow::Error, taxon: String },
}
