// Dependency partitioning of contract transactions.
//
// Two transactions depend on each other when their dirty-address sets
// share at least one contract. Connected components of that relation are
// the dependency clusters: members of a cluster must execute serially,
// clusters (and singletons) are free to run in parallel.

use std::collections::{BTreeMap, HashMap};

use crest_common::{
    crypto::{Address, Hash},
    transaction::Transaction,
};

struct DispatchItem {
    hash: Hash,
    dirty: Vec<Address>,
    tx: Transaction,
}

/// Output of a partitioning pass. Cluster ids are deterministic for a given
/// input set: clusters are numbered from 1 by ascending smallest member
/// hash. Singletons carry no id and no ordering constraint.
pub struct DependencyGroups {
    pub dependent: BTreeMap<u32, BTreeMap<Hash, Transaction>>,
    pub independent: BTreeMap<Hash, Transaction>,
}

impl DependencyGroups {
    /// Every group as an execution unit: each dependent cluster, then each
    /// singleton as its own unit.
    pub fn execution_units(&self) -> Vec<BTreeMap<Hash, Transaction>> {
        let mut units: Vec<BTreeMap<Hash, Transaction>> =
            self.dependent.values().cloned().collect();
        for (hash, tx) in &self.independent {
            let mut single = BTreeMap::new();
            single.insert(hash.clone(), tx.clone());
            units.push(single);
        }
        units
    }
}

#[derive(Default)]
pub struct PackDispatch {
    items: Vec<DispatchItem>,
}

impl PackDispatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, hash: Hash, dirty: Vec<Address>, tx: Transaction) {
        self.items.push(DispatchItem { hash, dirty, tx });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Partition into dependency clusters and independent singletons.
    pub fn into_groups(self) -> DependencyGroups {
        let mut parent: Vec<usize> = (0..self.items.len()).collect();

        fn find(parent: &mut [usize], i: usize) -> usize {
            let mut root = i;
            while parent[root] != root {
                root = parent[root];
            }
            // path compression
            let mut current = i;
            while parent[current] != root {
                let next = parent[current];
                parent[current] = root;
                current = next;
            }
            root
        }

        fn union(parent: &mut [usize], a: usize, b: usize) {
            let ra = find(parent, a);
            let rb = find(parent, b);
            if ra != rb {
                parent[rb.max(ra)] = rb.min(ra);
            }
        }

        // first item seen per dirty address anchors its component
        let mut address_owner: HashMap<&Address, usize> = HashMap::new();
        for (index, item) in self.items.iter().enumerate() {
            for addr in &item.dirty {
                match address_owner.get(addr) {
                    Some(&owner) => union(&mut parent, owner, index),
                    None => {
                        address_owner.insert(addr, index);
                    }
                }
            }
        }

        let mut components: HashMap<usize, Vec<&DispatchItem>> = HashMap::new();
        for (index, item) in self.items.iter().enumerate() {
            components
                .entry(find(&mut parent, index))
                .or_default()
                .push(item);
        }

        // stable ids: order components by their smallest member hash
        let mut ordered: Vec<Vec<&DispatchItem>> = components.into_values().collect();
        ordered.sort_by_key(|members| {
            members
                .iter()
                .map(|item| &item.hash)
                .min()
                .expect("non-empty component")
                .clone()
        });

        let mut dependent = BTreeMap::new();
        let mut independent = BTreeMap::new();
        let mut next_cluster_id: u32 = 1;
        for members in ordered {
            if members.len() == 1 {
                let item = members[0];
                independent.insert(item.hash.clone(), item.tx.clone());
            } else {
                let group: BTreeMap<Hash, Transaction> = members
                    .into_iter()
                    .map(|item| (item.hash.clone(), item.tx.clone()))
                    .collect();
                dependent.insert(next_cluster_id, group);
                next_cluster_id += 1;
            }
        }

        DependencyGroups {
            dependent,
            independent,
        }
    }
}
