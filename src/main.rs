use std::fs::File;
use std::io::{BufWriter, Write};

use anyhow::*;
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use colored::Colorize;
use log::*;

mod entity;
mod errors;
mod graph;
mod io;
mod merger;
mod settings;
mod stats;
mod temporary;
mod threshold;
mod traversal;
mod unionfind;
mod xml;


use entity::Registry;
use errors::FileError;
use io::PairwiseDir;
use merger::Context as MergeContext;
use settings::{Interpolation, MergeMethod, Settings};
use stats::StatisticTracker;
use threshold::ThresholdMap;
use traversal::SpeciesNode;
use xml::OrthoXml;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
pub(crate) struct Args {
    #[clap(flatten)]
    verbose: Verbosity<InfoLevel>,

    /// the species tree, in Newick format
    #[clap(short = 's', long)]
    species_tree: String,

    /// directory of <A>-<B>.txt pairwise orthology files
    #[clap(short = 'O', long)]
    orthologs: String,

    /// directory of <A>-<B>.txt pairwise paralogy files; enables paralogy
    #[clap(short = 'P', long)]
    paralogs: Option<String>,

    /// a species<TAB>protein count file
    #[clap(short = 'g', long)]
    genomes: String,

    /// how to merge HOGs at each level: pair or update
    #[clap(short, long, default_value = "pair")]
    method: String,

    /// merge threshold, as a percentage of all possible relations
    #[clap(short = 'T', long, default_value_t = 50.)]
    threshold: f64,

    /// dynamic threshold at the leaves
    #[clap(long)]
    dynamic_leaf: Option<f64>,

    /// dynamic threshold at the root
    #[clap(long)]
    dynamic_root: Option<f64>,

    /// how the dynamic threshold tapers from the leaves: first-leaf or per-leaf
    #[clap(long, default_value = "first-leaf")]
    threshold_scheme: String,

    /// stop merging HOGs left unmerged this many times
    #[clap(long)]
    freeze: Option<u32>,

    /// where to write the orthoXML; stdout if unset
    #[clap(short, long)]
    out: Option<String>,

    #[clap(short, long, default_value_t = 0)]
    threads: usize,
}

impl Args {
    pub(crate) fn settings(&self) -> Result<Settings> {
        let settings = Settings {
            method: self.method.parse::<MergeMethod>()?,
            parameter_1: self.threshold,
            use_paralogs: self.paralogs.is_some(),
            dynamic_threshold: Settings::dynamic_from(
                self.dynamic_leaf,
                self.dynamic_root,
                self.threshold_scheme.parse::<Interpolation>()?,
            )?,
            unmerged_threshold: self.freeze,
        };
        settings.validate()?;
        Ok(settings)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    buche::new()
        .verbosity((args.verbose.log_level_filter() as usize).saturating_sub(1))
        .init()?;
    rayon::ThreadPoolBuilder::new().num_threads(args.threads).build_global()?;
    info!("Using {} threads", rayon::current_num_threads());

    let settings = args.settings()?;
    let source = PairwiseDir::new(&args.orthologs, args.paralogs.as_deref(), &args.genomes)?;
    let species_tree = newick::one_from_filename(&args.species_tree)
        .with_context(|| anyhow!("while opening {}", args.species_tree.yellow().bold()))?;
    let root = SpeciesNode::root(&species_tree);

    let thresholds = if let Some(d) = settings.dynamic_threshold {
        threshold::propagate_dynamic_threshold(&root, d, d.interpolation.scheme())
    } else {
        ThresholdMap::default()
    };

    let mut registry = Registry::new();
    let mut xml = OrthoXml::new();
    let mut stats = StatisticTracker::new();
    let mut ctx =
        MergeContext { settings: &settings, source: &source, xml: &mut xml, stats: &mut stats };
    let top = traversal::recursive_traversal(&root, &mut registry, &mut ctx, &thresholds)?;
    info!(
        "{} HOGs at {} spanning {} species",
        registry.genome(top).hogs.len(),
        registry.genome(top).taxon,
        registry.genome(top).leaf_species().len()
    );

    let out: Box<dyn Write> = if let Some(ref filename) = args.out {
        Box::new(File::create(filename).map_err(|source| FileError::WhileCreating {
            source,
            filename: filename.to_owned(),
        })?)
    } else {
        Box::new(std::io::stdout())
    };
    xml.write_orthoxml(&registry, BufWriter::new(out))?;
    if let Some(ref filename) = args.out {
        info!("orthoXML written to {}", filename.bright_white().bold());
    }

    stats.summary();
    Ok(())
}
