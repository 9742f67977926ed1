use identity_hash::IntMap;
use log::*;

use crate::settings::{DynamicThreshold, Interpolation};
use crate::traversal::TreeNode;

/// Per-node merge thresholds, indexed by [`TreeNode::key`].
pub type ThresholdMap = IntMap<usize, f64>;

/// Turns the depths of the leaves below a node into the merge threshold of
/// this node.
pub trait ThresholdScheme {
    /// `node_depth` is the depth of the node, `leaf_depths` the depths of all
    /// its descendant leaves in tree order; depths are counted in edges from
    /// the root.
    fn score(&self, d: &DynamicThreshold, node_depth: usize, leaf_depths: &[usize]) -> f64;
}

impl Interpolation {
    pub fn scheme(&self) -> &'static dyn ThresholdScheme {
        match self {
            Interpolation::FirstLeaf => &FirstLeafAnchored,
            Interpolation::PerLeaf => &PerLeafAnchored,
        }
    }
}

fn interpolated(d: &DynamicThreshold, step: f64, leaf_depth: usize, node_depth: usize) -> f64 {
    d.leaf_score - step * (leaf_depth - node_depth) as f64
}

/// The step between two levels is computed from the depth of the first
/// descendant leaf only, then applied to every leaf.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstLeafAnchored;
impl ThresholdScheme for FirstLeafAnchored {
    fn score(&self, d: &DynamicThreshold, node_depth: usize, leaf_depths: &[usize]) -> f64 {
        match leaf_depths.first() {
            None | Some(0) => d.leaf_score,
            Some(&first) => {
                let step = (d.leaf_score - d.root_score) / first as f64;
                leaf_depths.iter().map(|&l| interpolated(d, step, l, node_depth)).sum::<f64>()
                    / leaf_depths.len() as f64
            }
        }
    }
}

/// Every leaf tapers from the leaf score to the root score along its own path.
#[derive(Debug, Default, Clone, Copy)]
pub struct PerLeafAnchored;
impl ThresholdScheme for PerLeafAnchored {
    fn score(&self, d: &DynamicThreshold, node_depth: usize, leaf_depths: &[usize]) -> f64 {
        if leaf_depths.is_empty() {
            return d.leaf_score;
        }
        leaf_depths
            .iter()
            .map(|&l| {
                if l == 0 {
                    d.leaf_score
                } else {
                    interpolated(d, (d.leaf_score - d.root_score) / l as f64, l, node_depth)
                }
            })
            .sum::<f64>()
            / leaf_depths.len() as f64
    }
}

fn leaf_depths<N: TreeNode>(
    node: &N,
    depth: usize,
    d: &DynamicThreshold,
    scheme: &dyn ThresholdScheme,
    thresholds: &mut ThresholdMap,
) -> Vec<usize> {
    let depths = if node.is_terminal() {
        vec![depth]
    } else {
        node.children()
            .iter()
            .flat_map(|c| leaf_depths(c, depth + 1, d, scheme, thresholds))
            .collect()
    };
    thresholds.insert(node.key(), scheme.score(d, depth, &depths));
    depths
}

/// Annotate every node below `root` with its merge threshold.
pub fn propagate_dynamic_threshold<N: TreeNode>(
    root: &N,
    d: DynamicThreshold,
    scheme: &dyn ThresholdScheme,
) -> ThresholdMap {
    let mut thresholds = ThresholdMap::default();
    leaf_depths(root, 0, &d, scheme, &mut thresholds);
    debug!("Dynamic thresholds computed for {} nodes", thresholds.len());
    thresholds
}
