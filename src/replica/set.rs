//! Live replica set of one cluster.

use crate::replica::{Replica, ReplicaId};

/// Ordered, duplicate-free set of live replicas.
///
/// Values are never mutated in place: the owning cluster swaps in the result of
/// [`ReplicaSet::without`], so a snapshot stays valid for as long as it is held.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicaSet {
    replicas: Vec<Replica>,
}

impl ReplicaSet {
    /// Build a set, keeping the first occurrence of each id.
    pub fn new(replicas: impl IntoIterator<Item = Replica>) -> Self {
        let mut unique: Vec<Replica> = Vec::new();
        for replica in replicas {
            if !unique.contains(&replica) {
                unique.push(replica);
            }
        }
        Self { replicas: unique }
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    pub fn contains(&self, replica: &Replica) -> bool {
        self.replicas.contains(replica)
    }

    pub fn find(&self, id: &ReplicaId) -> Option<&Replica> {
        self.replicas.iter().find(|r| r.id() == id)
    }

    /// The first live replica in configuration order.
    pub fn primary(&self) -> Option<&Replica> {
        self.replicas.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Replica> {
        self.replicas.iter()
    }

    pub fn as_slice(&self) -> &[Replica] {
        &self.replicas
    }

    pub fn ids(&self) -> Vec<ReplicaId> {
        self.replicas.iter().map(|r| r.id().clone()).collect()
    }

    /// A copy of this set without `replica`.
    pub fn without(&self, replica: &Replica) -> Self {
        Self {
            replicas: self
                .replicas
                .iter()
                .filter(|r| *r != replica)
                .cloned()
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ReplicaSet {
    type Item = &'a Replica;
    type IntoIter = std::slice::Iter<'a, Replica>;

    fn into_iter(self) -> Self::IntoIter {
        self.replicas.iter()
    }
}
