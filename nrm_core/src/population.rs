//! Population - an arena of agents addressed by index.
//!
//! Agents live in a contiguous `Vec`; order carries no meaning, so removal
//! is `swap_remove`. Handles across cycles are `AgentId`s, never indices.

use crate::agent::Agent;
use crate::cluster::ClusterId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PopulationId(pub usize);

impl std::fmt::Display for PopulationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pop#{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Population {
    pub id: PopulationId,
    pub cluster_id: ClusterId,
    pub agents: Vec<Agent>,
}

impl Population {
    /// Empty population in its own singleton cluster.
    pub fn new(id: PopulationId) -> Self {
        Self {
            id,
            cluster_id: ClusterId(id.0),
            agents: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn total_energy(&self) -> f64 {
        self.agents.iter().map(|a| a.energy()).sum()
    }

    /// Removes and returns the agent at `index`.
    pub fn take(&mut self, index: usize) -> Agent {
        self.agents.swap_remove(index)
    }

    pub fn insert(&mut self, agent: Agent) {
        self.agents.push(agent);
    }

    /// Drops every agent below `floor`, returning how many were removed.
    pub fn prune(&mut self, floor: f64) -> usize {
        let before = self.agents.len();
        self.agents.retain(|a| a.energy() >= floor);
        before - self.agents.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentId;
    use nalgebra::Vector3;

    fn filled(energies: &[f64]) -> Population {
        let mut pop = Population::new(PopulationId(3));
        for (i, &e) in energies.iter().enumerate() {
            pop.insert(Agent::new(AgentId(i as u64), e, Vector3::zeros()));
        }
        pop
    }

    #[test]
    fn test_defaults_to_singleton_cluster() {
        let pop = Population::new(PopulationId(3));
        assert_eq!(pop.cluster_id, ClusterId(3));
        assert!(pop.is_empty());
    }

    #[test]
    fn test_prune_counts_removed() {
        let mut pop = filled(&[0.5, 2.0, 0.99, 1.0]);
        assert_eq!(pop.prune(1.0), 2);
        assert_eq!(pop.len(), 2);
        assert!(pop.agents.iter().all(|a| a.energy() >= 1.0));
    }

    #[test]
    fn test_take_removes_exactly_one() {
        let mut pop = filled(&[1.0, 2.0, 3.0]);
        let taken = pop.take(0);
        assert_eq!(taken.id, AgentId(0));
        assert_eq!(pop.len(), 2);
        assert!(pop.agents.iter().all(|a| a.id != AgentId(0)));
        assert_eq!(pop.total_energy(), 5.0);
    }
}
