use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};

use quire_core::normalize_path;

use crate::semantic::{SemanticUnit, UnitId};

/// The semantic workspace's units and their reference edges, indexed both ways.
///
/// Reference cycles are tolerated.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    units: HashMap<UnitId, SemanticUnit>,
    referenced_by: HashMap<UnitId, BTreeSet<UnitId>>,
    by_output_path: HashMap<PathBuf, UnitId>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_units(units: impl IntoIterator<Item = SemanticUnit>) -> Self {
        let mut graph = Self::new();
        for unit in units {
            graph.upsert(unit);
        }
        graph
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn unit(&self, id: UnitId) -> Option<&SemanticUnit> {
        self.units.get(&id)
    }

    pub fn unit_for_output_path(&self, path: &Path) -> Option<&SemanticUnit> {
        let id = self.by_output_path.get(&normalize_path(path))?;
        self.units.get(id)
    }

    /// Inserts or replaces `unit`, rewiring its outgoing edges.
    pub fn upsert(&mut self, unit: SemanticUnit) {
        self.remove(unit.id);

        for reference in &unit.references {
            self.referenced_by
                .entry(*reference)
                .or_default()
                .insert(unit.id);
        }
        if let Some(path) = &unit.intermediate_output_path {
            self.by_output_path.insert(normalize_path(path), unit.id);
        }
        self.units.insert(unit.id, unit);
    }

    /// Removes `id` and its outgoing edges. Edges from other units to `id` stay, so a unit
    /// that comes back is wired up again.
    pub fn remove(&mut self, id: UnitId) -> Option<SemanticUnit> {
        let unit = self.units.remove(&id)?;
        for reference in &unit.references {
            if let Some(dependents) = self.referenced_by.get_mut(reference) {
                dependents.remove(&id);
                if dependents.is_empty() {
                    self.referenced_by.remove(reference);
                }
            }
        }
        if let Some(path) = &unit.intermediate_output_path {
            let path = normalize_path(path);
            if self.by_output_path.get(&path) == Some(&id) {
                self.by_output_path.remove(&path);
            }
        }
        Some(unit)
    }

    pub fn direct_dependents(&self, id: UnitId) -> impl Iterator<Item = UnitId> + '_ {
        self.referenced_by
            .get(&id)
            .into_iter()
            .flat_map(|dependents| dependents.iter().copied())
    }

    /// Every unit that references `id` directly or indirectly, in breadth-first order. `id`
    /// itself is never included, even when it sits on a cycle.
    pub fn transitive_dependents(&self, id: UnitId) -> Vec<UnitId> {
        let mut visited = BTreeSet::from([id]);
        let mut queue = VecDeque::from([id]);
        let mut out = Vec::new();

        while let Some(current) = queue.pop_front() {
            for dependent in self.direct_dependents(current) {
                if visited.insert(dependent) {
                    out.push(dependent);
                    queue.push_back(dependent);
                }
            }
        }
        out
    }
}
