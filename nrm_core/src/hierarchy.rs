//! Hierarchy - populations nested into MetaPopulations to arbitrary depth.
//!
//! The tree only stores structure (`PopulationId` leaves); the populations
//! themselves live in one flat arena indexed by id, so every cycle step can
//! iterate them in a fixed order regardless of nesting.

use crate::agent::Agent;
use crate::cluster::{self, Cluster, ClusterId};
use crate::config::{HierarchyShape, MigrationScope, Topology};
use crate::error::ConfigError;
use crate::population::{Population, PopulationId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetaId(pub usize);

/// A node of the population tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HierarchyNode {
    Population(PopulationId),
    Meta {
        id: MetaId,
        children: Vec<HierarchyNode>,
    },
}

impl HierarchyNode {
    /// All populations below this node, in tree order.
    pub fn populations(&self) -> Vec<PopulationId> {
        let mut out = Vec::new();
        self.collect_populations(&mut out);
        out
    }

    fn collect_populations(&self, out: &mut Vec<PopulationId>) {
        match self {
            HierarchyNode::Population(id) => out.push(*id),
            HierarchyNode::Meta { children, .. } => {
                for child in children {
                    child.collect_populations(out);
                }
            }
        }
    }

    /// Population sets of MetaPopulations whose children are populations.
    fn collect_sibling_groups(&self, out: &mut Vec<Vec<PopulationId>>) {
        if let HierarchyNode::Meta { children, .. } = self {
            let leaves: Vec<PopulationId> = children
                .iter()
                .filter_map(|c| match c {
                    HierarchyNode::Population(id) => Some(*id),
                    HierarchyNode::Meta { .. } => None,
                })
                .collect();
            if !leaves.is_empty() {
                out.push(leaves);
            }
            for child in children {
                child.collect_sibling_groups(out);
            }
        }
    }

    fn collect_metas<'a>(&'a self, out: &mut Vec<&'a HierarchyNode>) {
        if let HierarchyNode::Meta { children, .. } = self {
            out.push(self);
            for child in children {
                child.collect_metas(out);
            }
        }
    }
}

/// Aggregate size of one MetaPopulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetaSummary {
    pub id: MetaId,
    pub populations: usize,
    pub agents: usize,
}

#[derive(Debug, Clone)]
pub struct Hierarchy {
    populations: Vec<Population>,
    root: HierarchyNode,
    clusters: Vec<Cluster>,
    sibling_groups: Vec<Vec<PopulationId>>,
}

impl Hierarchy {
    /// Builds empty populations arranged by `shape` and partitioned into
    /// clusters by `topology`.
    pub fn new(shape: &HierarchyShape, topology: &Topology) -> Result<Self, ConfigError> {
        if shape.branching.is_empty() || shape.branching.contains(&0) {
            return Err(ConfigError::shape(format!("{:?}", shape.branching)));
        }

        let mut next_pop = 0;
        let mut next_meta = 0;
        let root = build_node(&shape.branching, &mut next_pop, &mut next_meta);

        let mut sibling_groups = Vec::new();
        root.collect_sibling_groups(&mut sibling_groups);

        let clusters = cluster::partition(topology, next_pop, &sibling_groups)?;
        let mut populations: Vec<Population> =
            (0..next_pop).map(|i| Population::new(PopulationId(i))).collect();
        for c in &clusters {
            for pop in &c.members {
                populations[pop.0].cluster_id = c.id;
            }
        }

        Ok(Self {
            populations,
            root,
            clusters,
            sibling_groups,
        })
    }

    pub fn root(&self) -> &HierarchyNode {
        &self.root
    }

    pub fn populations(&self) -> &[Population] {
        &self.populations
    }

    pub fn populations_mut(&mut self) -> &mut [Population] {
        &mut self.populations
    }

    pub fn population(&self, id: PopulationId) -> &Population {
        &self.populations[id.0]
    }

    pub fn population_mut(&mut self, id: PopulationId) -> &mut Population {
        &mut self.populations[id.0]
    }

    pub fn population_count(&self) -> usize {
        self.populations.len()
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn cluster(&self, id: ClusterId) -> &Cluster {
        &self.clusters[id.0]
    }

    /// Population sets of the lowest MetaPopulations.
    pub fn sibling_groups(&self) -> &[Vec<PopulationId>] {
        &self.sibling_groups
    }

    pub fn total_agents(&self) -> usize {
        self.populations.iter().map(Population::len).sum()
    }

    pub fn total_energy(&self) -> f64 {
        self.populations.iter().map(Population::total_energy).sum()
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.populations.iter().map(Population::len).collect()
    }

    /// Sum of member-population energy for a cluster.
    pub fn cluster_energy(&self, id: ClusterId) -> f64 {
        self.cluster(id)
            .members
            .iter()
            .map(|p| self.population(*p).total_energy())
            .sum()
    }

    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.populations.iter().flat_map(|p| p.agents.iter())
    }

    pub fn agents_mut(&mut self) -> impl Iterator<Item = &mut Agent> {
        self.populations.iter_mut().flat_map(|p| p.agents.iter_mut())
    }

    /// Groups of populations that may exchange migrants under `scope`.
    /// Groups with fewer than two populations are omitted.
    pub fn migration_groups(&self, scope: MigrationScope) -> Vec<Vec<PopulationId>> {
        let groups: Vec<Vec<PopulationId>> = match scope {
            MigrationScope::Global => vec![self.root.populations()],
            MigrationScope::SiblingGroup => self.sibling_groups.clone(),
            MigrationScope::Cluster => self
                .clusters
                .iter()
                .map(|c| c.members.iter().copied().collect())
                .collect(),
        };
        groups.into_iter().filter(|g| g.len() >= 2).collect()
    }

    /// Moves the agent at `index` of `from` into `to`. Atomic: the agent is
    /// never held by two populations.
    pub fn move_agent(&mut self, from: PopulationId, index: usize, to: PopulationId) {
        debug_assert_ne!(from, to, "migration source equals destination");
        let agent = self.populations[from.0].take(index);
        self.populations[to.0].insert(agent);
    }

    /// Aggregate sizes for every MetaPopulation, root first.
    pub fn meta_summaries(&self) -> Vec<MetaSummary> {
        let mut metas = Vec::new();
        self.root.collect_metas(&mut metas);
        metas
            .into_iter()
            .filter_map(|node| match node {
                HierarchyNode::Meta { id, .. } => {
                    let pops = node.populations();
                    Some(MetaSummary {
                        id: *id,
                        populations: pops.len(),
                        agents: pops.iter().map(|p| self.population(*p).len()).sum(),
                    })
                }
                HierarchyNode::Population(_) => None,
            })
            .collect()
    }

    /// True when every agent id appears exactly once across the hierarchy.
    pub fn membership_is_exclusive(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.total_agents());
        self.agents().all(|a| seen.insert(a.id))
    }
}

fn build_node(branching: &[usize], next_pop: &mut usize, next_meta: &mut usize) -> HierarchyNode {
    let id = MetaId(*next_meta);
    *next_meta += 1;
    let children = match branching.split_first() {
        Some((&fanout, [])) => (0..fanout)
            .map(|_| {
                let pop = PopulationId(*next_pop);
                *next_pop += 1;
                HierarchyNode::Population(pop)
            })
            .collect(),
        Some((&fanout, rest)) => (0..fanout)
            .map(|_| build_node(rest, next_pop, next_meta))
            .collect(),
        None => Vec::new(),
    };
    HierarchyNode::Meta { id, children }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentId;
    use nalgebra::Vector3;

    #[test]
    fn test_flat_hierarchy() {
        let h = Hierarchy::new(&HierarchyShape::flat(10, 5), &Topology::Isolated).unwrap();
        assert_eq!(h.population_count(), 10);
        assert_eq!(h.clusters().len(), 10);
        assert_eq!(h.sibling_groups().len(), 1);
        assert_eq!(h.meta_summaries().len(), 1);
    }

    #[test]
    fn test_three_level_hierarchy() {
        let h = Hierarchy::new(&HierarchyShape::nested(3, 4, 5), &Topology::PerMetaPopulation)
            .unwrap();
        assert_eq!(h.population_count(), 12);
        assert_eq!(h.sibling_groups().len(), 3);
        assert_eq!(h.clusters().len(), 3);
        // Populations 4..8 belong to the second MetaPopulation and cluster
        assert_eq!(h.population(PopulationId(5)).cluster_id, ClusterId(1));
        // Root plus three children
        assert_eq!(h.meta_summaries().len(), 4);
    }

    #[test]
    fn test_four_level_hierarchy() {
        let shape = HierarchyShape {
            branching: vec![2, 2, 3],
            agents_per_population: 1,
        };
        let h = Hierarchy::new(&shape, &Topology::Global).unwrap();
        assert_eq!(h.population_count(), 12);
        assert_eq!(h.sibling_groups().len(), 4);
        assert_eq!(h.clusters().len(), 1);
        assert_eq!(h.root().populations().len(), 12);
    }

    #[test]
    fn test_migration_groups_by_scope() {
        let h = Hierarchy::new(&HierarchyShape::nested(2, 3, 5), &Topology::Paired).unwrap();
        assert_eq!(h.migration_groups(MigrationScope::Global), vec![h.root().populations()]);
        assert_eq!(h.migration_groups(MigrationScope::SiblingGroup).len(), 2);
        // Paired over six populations: three clusters of two
        assert_eq!(h.migration_groups(MigrationScope::Cluster).len(), 3);

        let single = Hierarchy::new(&HierarchyShape::single(5), &Topology::Isolated).unwrap();
        assert!(single.migration_groups(MigrationScope::Global).is_empty());
    }

    #[test]
    fn test_move_agent_preserves_count_and_exclusivity() {
        let mut h = Hierarchy::new(&HierarchyShape::flat(2, 0), &Topology::Global).unwrap();
        for i in 0..3 {
            h.population_mut(PopulationId(0))
                .insert(Agent::new(AgentId(i), 5.0, Vector3::zeros()));
        }
        h.move_agent(PopulationId(0), 1, PopulationId(1));
        assert_eq!(h.total_agents(), 3);
        assert_eq!(h.population(PopulationId(1)).len(), 1);
        assert!(h.membership_is_exclusive());
    }
}
