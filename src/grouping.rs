//! Device grouping engine.
//!
//! Infers communicator membership from point-to-point connection edges. The
//! communicator-init records are walked in log order; a change in rank count
//! between consecutive records starts a new epoch with a fresh
//! [`DisjointSet`]. Within an epoch every device is unioned with the targets
//! of its outgoing edges in the same communicator.
//!
//! Two distinct communicators of equal size that are logged back to back end
//! up in the same epoch. That is accepted behavior; the log gives no stronger
//! ordering guarantee to split on.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use serde::Serialize;

use crate::topology::TopologyTables;

/// Disjoint-set union over an owned index space, with union by size and
/// path halving.
#[derive(Debug, Clone)]
pub struct DisjointSet<T> {
    index: HashMap<T, usize>,
    items: Vec<T>,
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl<T: Hash + Eq + Clone> Default for DisjointSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Hash + Eq + Clone> DisjointSet<T> {
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
            items: Vec::new(),
            parent: Vec::new(),
            size: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add `item` as a singleton if unseen and return its index.
    pub fn insert(&mut self, item: T) -> usize {
        if let Some(&i) = self.index.get(&item) {
            return i;
        }
        let i = self.items.len();
        self.index.insert(item.clone(), i);
        self.items.push(item);
        self.parent.push(i);
        self.size.push(1);
        i
    }

    fn root(&self, mut i: usize) -> usize {
        while self.parent[i] != i {
            i = self.parent[i];
        }
        i
    }

    fn find_index(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    /// Representative index of the set containing `item`.
    pub fn find(&mut self, item: &T) -> Option<usize> {
        let i = *self.index.get(item)?;
        Some(self.find_index(i))
    }

    /// Merge the sets of `a` and `b`, inserting either if unseen. Returns
    /// false if they were already in the same set.
    pub fn union(&mut self, a: T, b: T) -> bool {
        let ia = self.insert(a);
        let ib = self.insert(b);
        let (mut ra, mut rb) = (self.find_index(ia), self.find_index(ib));
        if ra == rb {
            return false;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
        true
    }

    pub fn same_set(&mut self, a: &T, b: &T) -> bool {
        match (self.find(a), self.find(b)) {
            (Some(ra), Some(rb)) => ra == rb,
            _ => false,
        }
    }

    /// All sets. Sets are ordered by their earliest-inserted member and
    /// members by insertion order.
    pub fn sets(&self) -> Vec<Vec<T>> {
        let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
        let mut sets: Vec<Vec<T>> = Vec::new();
        for (i, item) in self.items.iter().enumerate() {
            let root = self.root(i);
            let slot = *slot_of_root.entry(root).or_insert_with(|| {
                sets.push(Vec::new());
                sets.len() - 1
            });
            sets[slot].push(item.clone());
        }
        sets
    }
}

/// Bus ids of the devices inferred to share one communicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DeviceGroup {
    members: Vec<String>,
}

impl DeviceGroup {
    /// Build a group, dropping repeated members.
    pub fn from_members<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for m in members {
            let m = m.into();
            if !out.contains(&m) {
                out.push(m);
            }
        }
        Self { members: out }
    }

    /// Group of device indices `0..count`, used for traces without topology.
    pub fn indexed(count: usize) -> Self {
        Self::from_members((0..count).map(|i| i.to_string()))
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, bus_id: &str) -> bool {
        self.members.iter().any(|m| m == bus_id)
    }

    /// Set equality, ignoring member order.
    pub fn same_members(&self, other: &DeviceGroup) -> bool {
        self.len() == other.len() && self.members.iter().all(|m| other.contains(m))
    }
}

impl fmt::Display for DeviceGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.members.join(", "))
    }
}

fn flush_epoch(dsu: &DisjointSet<String>, out: &mut Vec<DeviceGroup>) {
    for set in dsu.sets() {
        let group = DeviceGroup::from_members(set);
        if !out.iter().any(|g| g.same_members(&group)) {
            out.push(group);
        }
    }
}

/// Derive device groups from communicator-init records and connection edges.
pub fn group_devices(tables: &TopologyTables) -> Vec<DeviceGroup> {
    let mut groups = Vec::new();
    let mut epoch_size: Option<u32> = None;
    let mut dsu: DisjointSet<String> = DisjointSet::new();

    for record in &tables.communicators {
        if epoch_size.is_some_and(|size| size != record.group_size) {
            flush_epoch(&dsu, &mut groups);
            dsu = DisjointSet::new();
        }
        epoch_size = Some(record.group_size);

        for edge in tables.edges_from(&record.comm, &record.bus_id) {
            dsu.union(record.bus_id.clone(), edge.target_bus_id.clone());
        }
    }
    flush_epoch(&dsu, &mut groups);

    tracing::info!(groups = groups.len(), "derived device groups");
    for (i, g) in groups.iter().enumerate() {
        tracing::debug!(group = i, members = %g, "device group");
    }
    groups
}
