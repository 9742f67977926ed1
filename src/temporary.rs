use std::cmp::Reverse;
use std::collections::BTreeMap;

use anyhow::*;
use ordered_float::OrderedFloat;

use crate::entity::HogID;

/// Scores two sets of HOGs against each other.
pub type Scorer<'a> = dyn Fn(&[HogID], &[HogID]) -> Result<f64> + 'a;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporaryKind {
    /// Wraps a single, untouched HOG
    Simple,
    /// Stands for several HOGs that will be merged together
    Composed,
}

/// A speculative HOG, used while exploring merges without touching the
/// real ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporaryHog {
    pub kind: TemporaryKind,
    pub hogs: Vec<HogID>,
}
impl TemporaryHog {
    pub fn simple(hog: HogID) -> Self {
        TemporaryHog { kind: TemporaryKind::Simple, hogs: vec![hog] }
    }

    pub fn composed(a: &TemporaryHog, b: &TemporaryHog) -> Self {
        let mut hogs = a.hogs.iter().chain(b.hogs.iter()).copied().collect::<Vec<_>>();
        hogs.sort_unstable();
        TemporaryHog { kind: TemporaryKind::Composed, hogs }
    }

    /// The smallest HOG ID inside; unique among the nodes of a component.
    pub fn key(&self) -> HogID {
        self.hogs[0]
    }
}

/// A connected component of the orthology graph, agglomerated greedily.
///
/// Nodes are indexed by their key and edges by the pair of node keys, so that
/// iterating over them always follows HOG IDs; ties between equal scores are
/// broken in favor of the lexicographically smallest pair.
#[derive(Debug)]
pub struct TemporaryConnectedComponent {
    nodes: BTreeMap<HogID, TemporaryHog>,
    edges: BTreeMap<(HogID, HogID), f64>,
}

impl TemporaryConnectedComponent {
    pub fn new(component: &[HogID], scorer: &Scorer) -> Result<Self> {
        let nodes = component
            .iter()
            .map(|&h| (h, TemporaryHog::simple(h)))
            .collect::<BTreeMap<_, _>>();

        let mut edges = BTreeMap::new();
        let keys = nodes.keys().copied().collect::<Vec<_>>();
        for (i, &k1) in keys.iter().enumerate() {
            for &k2 in keys[i + 1..].iter() {
                let score = scorer(&nodes[&k1].hogs, &nodes[&k2].hogs)?;
                if score > 0. {
                    edges.insert((k1, k2), score);
                }
            }
        }

        Ok(TemporaryConnectedComponent { nodes, edges })
    }

    #[cfg(test)]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// The best scoring edge, if any.
    pub fn find_max_score(&self) -> Option<((HogID, HogID), f64)> {
        self.edges
            .iter()
            .min_by_key(|(k, s)| (Reverse(OrderedFloat(**s)), **k))
            .map(|(k, s)| (*k, *s))
    }

    /// Replace the two nodes of `pair` by their union, and score the new node
    /// against all the remaining ones. Returns the key of the new node.
    pub fn merge_nodes(&mut self, pair: (HogID, HogID), scorer: &Scorer) -> Result<HogID> {
        let (a, b) = pair;
        let node_a = self.nodes.remove(&a).context("merging an unknown node")?;
        let node_b = self.nodes.remove(&b).context("merging an unknown node")?;
        self.edges.retain(|&(x, y), _| x != a && x != b && y != a && y != b);

        let merged = TemporaryHog::composed(&node_a, &node_b);
        let key = merged.key();
        for (&other_key, other) in self.nodes.iter() {
            let score = scorer(&merged.hogs, &other.hogs)?;
            if score > 0. {
                let edge = if key < other_key { (key, other_key) } else { (other_key, key) };
                self.edges.insert(edge, score);
            }
        }
        self.nodes.insert(key, merged);

        Ok(key)
    }

    /// Merge the best pair until none reaches `threshold`; returns the number
    /// of merges performed.
    pub fn agglomerate(&mut self, threshold: f64, scorer: &Scorer) -> Result<usize> {
        let mut merges = 0;
        while let Some((pair, score)) = self.find_max_score() {
            if score < threshold {
                break;
            }
            self.merge_nodes(pair, scorer)?;
            merges += 1;
        }
        Ok(merges)
    }

    /// The HOG sets to merge, and the HOGs left alone.
    pub fn into_groups(self) -> (Vec<Vec<HogID>>, Vec<HogID>) {
        let mut composed = Vec::new();
        let mut simple = Vec::new();
        for node in self.nodes.into_values() {
            match node.kind {
                TemporaryKind::Composed => composed.push(node.hogs),
                TemporaryKind::Simple => simple.push(node.key()),
            }
        }
        (composed, simple)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Percentages computed from raw relation counts and HOG sizes.
    struct Table {
        sizes: HashMap<HogID, usize>,
        relations: HashMap<(HogID, HogID), i64>,
    }
    impl Table {
        fn new(sizes: &[(HogID, usize)], relations: &[((HogID, HogID), i64)]) -> Self {
            Table {
                sizes: sizes.iter().copied().collect(),
                relations: relations.iter().copied().collect(),
            }
        }

        fn score(&self, xs: &[HogID], ys: &[HogID]) -> Result<f64> {
            let lx = xs.iter().map(|x| self.sizes[x]).sum::<usize>();
            let ly = ys.iter().map(|y| self.sizes[y]).sum::<usize>();
            let mut r = 0i64;
            for x in xs {
                for y in ys {
                    r += self
                        .relations
                        .get(&(*x, *y))
                        .or_else(|| self.relations.get(&(*y, *x)))
                        .copied()
                        .unwrap_or(0);
                }
            }
            Ok(100. * r as f64 / (lx * ly) as f64)
        }
    }

    #[test]
    fn best_pair_merges_first() {
        // 1-2: 4 / (1×5) = 80%; 2-3: 3 / (5×2) = 30%
        let t = Table::new(&[(1, 1), (2, 5), (3, 2)], &[((1, 2), 4), ((2, 3), 3)]);
        let scorer = |xs: &[HogID], ys: &[HogID]| t.score(xs, ys);
        let mut cc = TemporaryConnectedComponent::new(&[1, 2, 3], &scorer).unwrap();
        assert_eq!(cc.edge_count(), 2);
        assert_eq!(cc.find_max_score(), Some(((1, 2), 80.)));

        assert_eq!(cc.agglomerate(50., &scorer).unwrap(), 1);
        // {1, 2} against 3: 3 / (6×2) = 25%
        assert_eq!(cc.find_max_score(), Some(((1, 3), 25.)));

        let (composed, simple) = cc.into_groups();
        assert_eq!(composed, vec![vec![1, 2]]);
        assert_eq!(simple, vec![3]);
    }

    #[test]
    fn merges_cascade_while_above_threshold() {
        let t = Table::new(&[(1, 1), (2, 1), (3, 1)], &[((1, 2), 1), ((2, 3), 1), ((1, 3), 1)]);
        let scorer = |xs: &[HogID], ys: &[HogID]| t.score(xs, ys);
        let mut cc = TemporaryConnectedComponent::new(&[3, 2, 1], &scorer).unwrap();
        assert_eq!(cc.agglomerate(100., &scorer).unwrap(), 2);
        let (composed, simple) = cc.into_groups();
        assert_eq!(composed, vec![vec![1, 2, 3]]);
        assert!(simple.is_empty());
    }

    #[test]
    fn ties_go_to_the_smallest_pair() {
        let t = Table::new(&[(4, 1), (7, 1), (9, 1)], &[((7, 9), 1), ((4, 9), 1)]);
        let scorer = |xs: &[HogID], ys: &[HogID]| t.score(xs, ys);
        let mut cc = TemporaryConnectedComponent::new(&[9, 7, 4], &scorer).unwrap();
        assert_eq!(cc.find_max_score(), Some(((4, 9), 100.)));
        assert_eq!(cc.merge_nodes((4, 9), &scorer).unwrap(), 4);
        // {4, 9} against 7: 1 / 2
        assert_eq!(cc.find_max_score(), Some(((4, 7), 50.)));
    }

    #[test]
    fn nothing_merges_under_an_impossible_threshold() {
        let t = Table::new(&[(1, 1), (2, 1)], &[((1, 2), 1)]);
        let scorer = |xs: &[HogID], ys: &[HogID]| t.score(xs, ys);
        let mut cc = TemporaryConnectedComponent::new(&[1, 2], &scorer).unwrap();
        assert_eq!(cc.agglomerate(101., &scorer).unwrap(), 0);
        let (composed, simple) = cc.into_groups();
        assert!(composed.is_empty());
        assert_eq!(simple, vec![1, 2]);
    }
}
