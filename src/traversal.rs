use anyhow::*;
use log::*;
use newick::{Newick, NewickTree, NodeID};

use crate::entity::{GenomeID, Registry};
use crate::errors::DataError;
use crate::merger::{self, Context};
use crate::threshold::ThresholdMap;

/// The view of a species tree node the traversal works on.
pub trait TreeNode: Sized {
    /// Unique among the nodes of a tree.
    fn key(&self) -> usize;
    fn name(&self) -> Option<String>;
    fn children(&self) -> Vec<Self>;
    fn is_terminal(&self) -> bool;
}

/// A node of a parsed Newick species tree.
#[derive(Clone, Copy)]
pub struct SpeciesNode<'a> {
    tree: &'a NewickTree,
    id: NodeID,
}

impl<'a> SpeciesNode<'a> {
    pub fn root(tree: &'a NewickTree) -> Self {
        SpeciesNode { tree, id: tree.root() }
    }
}

impl<'a> TreeNode for SpeciesNode<'a> {
    fn key(&self) -> usize {
        self.id
    }

    fn name(&self) -> Option<String> {
        self.tree.name(self.id).map(|n| n.to_string()).filter(|n| !n.is_empty())
    }

    fn children(&self) -> Vec<Self> {
        self.tree
            .children(self.id)
            .map(|cs| cs.iter().map(|&id| SpeciesNode { tree: self.tree, id }).collect())
            .unwrap_or_default()
    }

    fn is_terminal(&self) -> bool {
        self.tree[self.id].is_leaf()
    }
}

/// Post-order walk of the species tree: leaves become extant genomes, and
/// every internal node the ancestral genome merged from its children.
pub fn recursive_traversal<N: TreeNode>(
    node: &N,
    registry: &mut Registry,
    ctx: &mut Context,
    thresholds: &ThresholdMap,
) -> Result<GenomeID> {
    if node.is_terminal() {
        let species = node.name().ok_or(DataError::NamelessLeaf)?;
        let n_proteins = ctx.source.number_of_proteins(&species)?;
        registry.new_extant_genome(&species, n_proteins, &mut *ctx.xml)
    } else {
        let children = node
            .children()
            .iter()
            .map(|c| recursive_traversal(c, registry, ctx, thresholds))
            .collect::<Result<Vec<_>>>()?;
        if children.len() == 1 {
            debug!("Unifurcating node {}", node.name().unwrap_or_default());
        }
        merger::build_ancestral_genome(
            registry,
            ctx,
            node.name(),
            children,
            thresholds.get(&node.key()).copied(),
        )
    }
}
