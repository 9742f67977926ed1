use std::collections::HashMap;
use std::hash::Hash;

/// A disjoint-set forest over arbitrary hashable items, with path halving and
/// union by rank.
///
/// Items are registered the first time they are seen by [`UnionFind::union`]
/// or [`UnionFind::insert`]; components come back in the order of their first
/// registered member, and members in their registration order.
#[derive(Debug, Clone)]
pub struct UnionFind<T> {
    items: Vec<T>,
    index: HashMap<T, usize>,
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl<T: Hash + Eq + Clone> Default for UnionFind<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Hash + Eq + Clone> UnionFind<T> {
    pub fn new() -> Self {
        UnionFind { items: Vec::new(), index: HashMap::new(), parent: Vec::new(), rank: Vec::new() }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Register `x` as a singleton if it is not known yet; returns its ordinal.
    pub fn insert(&mut self, x: T) -> usize {
        if let Some(&i) = self.index.get(&x) {
            return i;
        }
        let i = self.items.len();
        self.items.push(x.clone());
        self.index.insert(x, i);
        self.parent.push(i);
        self.rank.push(0);
        i
    }

    fn find_root(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            let grandparent = self.parent[self.parent[i]];
            self.parent[i] = grandparent;
            i = grandparent;
        }
        i
    }

    /// The ordinal of the representative of `x`'s set, if `x` is known.
    #[cfg(test)]
    pub fn find(&mut self, x: &T) -> Option<usize> {
        let i = *self.index.get(x)?;
        Some(self.find_root(i))
    }

    #[cfg(test)]
    pub fn connected(&mut self, a: &T, b: &T) -> bool {
        match (self.find(a), self.find(b)) {
            (Some(ra), Some(rb)) => ra == rb,
            _ => false,
        }
    }

    pub fn union(&mut self, a: T, b: T) {
        let a = self.insert(a);
        let b = self.insert(b);
        let ra = self.find_root(a);
        let rb = self.find_root(b);
        if ra == rb {
            return;
        }

        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
                self.parent[child] = root;
                self.rank[root] = self.rank[root].saturating_add(1);
            }
        }
    }

    pub fn get_components(&mut self) -> Vec<Vec<T>> {
        let mut slot_of_root = HashMap::<usize, usize>::new();
        let mut components: Vec<Vec<T>> = Vec::new();
        for i in 0..self.items.len() {
            let root = self.find_root(i);
            let slot = *slot_of_root.entry(root).or_insert_with(|| {
                components.push(Vec::new());
                components.len() - 1
            });
            components[slot].push(self.items[i].clone());
        }
        components
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;

    #[test]
    fn transitive_membership() {
        let mut uf = UnionFind::new();
        uf.union(1, 2);
        uf.union(2, 3);
        uf.union(10, 11);
        uf.union(3, 1);
        assert!(uf.connected(&1, &3));
        assert!(!uf.connected(&1, &10));
        assert!(!uf.connected(&1, &42));
        assert_eq!(uf.get_components(), vec![vec![1, 2, 3], vec![10, 11]]);
    }

    #[test]
    fn idempotent_union() {
        let mut uf = UnionFind::new();
        uf.union("a", "b");
        uf.union("a", "b");
        uf.union("b", "a");
        assert_eq!(uf.len(), 2);
        assert_eq!(uf.get_components(), vec![vec!["a", "b"]]);
    }

    #[test]
    fn singletons_are_kept() {
        let mut uf = UnionFind::new();
        uf.insert(5);
        uf.union(1, 2);
        uf.insert(1);
        assert_eq!(uf.get_components(), vec![vec![5], vec![1, 2]]);
    }

    #[test]
    fn random_graphs_are_partitioned_by_connectivity() {
        let mut rng = StdRng::seed_from_u64(0xC0FFEE);
        for _ in 0..20 {
            let n = rng.gen_range(1..200usize);
            let m = rng.gen_range(0..300usize);
            let edges =
                (0..m).map(|_| (rng.gen_range(0..n), rng.gen_range(0..n))).collect::<Vec<_>>();

            let mut uf = UnionFind::new();
            for i in 0..n {
                uf.insert(i);
            }
            for &(a, b) in edges.iter() {
                uf.union(a, b);
            }
            let components = uf.get_components();

            // A partition of all the nodes...
            let mut seen = HashSet::new();
            for c in components.iter() {
                assert!(!c.is_empty());
                for x in c {
                    assert!(seen.insert(*x));
                }
            }
            assert_eq!(seen.len(), n);

            // ...matching graph reachability
            let mut adjacency = vec![Vec::new(); n];
            for &(a, b) in edges.iter() {
                adjacency[a].push(b);
                adjacency[b].push(a);
            }
            for c in components.iter() {
                let mut reached = HashSet::from([c[0]]);
                let mut todo = vec![c[0]];
                while let Some(x) = todo.pop() {
                    for &y in adjacency[x].iter() {
                        if reached.insert(y) {
                            todo.push(y);
                        }
                    }
                }
                assert_eq!(reached, c.iter().copied().collect::<HashSet<_>>());
            }
        }
    }
}
