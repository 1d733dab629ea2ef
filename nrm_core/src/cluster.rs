//! Cluster - populations sharing one energy-recovery pool.
//!
//! ISOLATED, PAIRED and CLUSTERED experiments differ only in how the
//! population set is partitioned here; the engine has a single recovery
//! code path.

use crate::config::Topology;
use crate::error::ConfigError;
use crate::population::PopulationId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub members: BTreeSet<PopulationId>,
}

impl Cluster {
    fn new(id: usize, members: impl IntoIterator<Item = PopulationId>) -> Self {
        Self {
            id: ClusterId(id),
            members: members.into_iter().collect(),
        }
    }

    pub fn contains(&self, pop: PopulationId) -> bool {
        self.members.contains(&pop)
    }
}

/// Resolves a topology into clusters over `population_count` populations.
///
/// `sibling_groups` are the population sets of the lowest MetaPopulations,
/// in hierarchy order; they are only consulted for `PerMetaPopulation`.
/// The result is an exact partition, ordered by cluster id.
pub fn partition(
    topology: &Topology,
    population_count: usize,
    sibling_groups: &[Vec<PopulationId>],
) -> Result<Vec<Cluster>, ConfigError> {
    let ids = || (0..population_count).map(PopulationId);
    let clusters: Vec<Cluster> = match topology {
        Topology::Isolated => ids().map(|p| Cluster::new(p.0, [p])).collect(),
        Topology::Paired => chunked(population_count, 2),
        Topology::Grouped { size } => {
            if *size == 0 {
                return Err(ConfigError::partition("group size must be at least 1"));
            }
            chunked(population_count, *size)
        }
        Topology::PerMetaPopulation => sibling_groups
            .iter()
            .enumerate()
            .map(|(i, group)| Cluster::new(i, group.iter().copied()))
            .collect(),
        Topology::Global => vec![Cluster::new(0, ids())],
        Topology::Custom { clusters } => clusters
            .iter()
            .enumerate()
            .map(|(i, members)| Cluster::new(i, members.iter().map(|&m| PopulationId(m))))
            .collect(),
    };

    let mut seen = vec![false; population_count];
    for cluster in &clusters {
        if cluster.members.is_empty() {
            return Err(ConfigError::partition(format!("cluster {} is empty", cluster.id.0)));
        }
        for pop in &cluster.members {
            match seen.get_mut(pop.0) {
                Some(slot) if !*slot => *slot = true,
                Some(_) => {
                    return Err(ConfigError::partition(format!("{} assigned twice", pop)))
                }
                None => return Err(ConfigError::partition(format!("{} out of range", pop))),
            }
        }
    }
    if let Some(missing) = seen.iter().position(|s| !s) {
        return Err(ConfigError::partition(format!(
            "{} not assigned to any cluster",
            PopulationId(missing)
        )));
    }

    Ok(clusters)
}

fn chunked(population_count: usize, size: usize) -> Vec<Cluster> {
    (0..population_count)
        .collect::<Vec<_>>()
        .chunks(size)
        .enumerate()
        .map(|(i, chunk)| Cluster::new(i, chunk.iter().map(|&p| PopulationId(p))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(clusters: &[Cluster]) -> Vec<usize> {
        clusters.iter().map(|c| c.members.len()).collect()
    }

    #[test]
    fn test_isolated_is_singletons() {
        let clusters = partition(&Topology::Isolated, 4, &[]).unwrap();
        assert_eq!(sizes(&clusters), vec![1, 1, 1, 1]);
        assert!(clusters[2].contains(PopulationId(2)));
    }

    #[test]
    fn test_paired_leaves_odd_tail_alone() {
        let clusters = partition(&Topology::Paired, 5, &[]).unwrap();
        assert_eq!(sizes(&clusters), vec![2, 2, 1]);
    }

    #[test]
    fn test_grouped_two_clusters_of_five() {
        let clusters = partition(&Topology::Grouped { size: 5 }, 10, &[]).unwrap();
        assert_eq!(sizes(&clusters), vec![5, 5]);
        assert!(clusters[1].contains(PopulationId(7)));
    }

    #[test]
    fn test_per_meta_population_follows_siblings() {
        let groups = vec![
            vec![PopulationId(0), PopulationId(1)],
            vec![PopulationId(2), PopulationId(3)],
        ];
        let clusters = partition(&Topology::PerMetaPopulation, 4, &groups).unwrap();
        assert_eq!(clusters.len(), 2);
        assert!(clusters[1].contains(PopulationId(3)));
    }

    #[test]
    fn test_custom_gap_rejected() {
        let topology = Topology::Custom {
            clusters: vec![vec![0], vec![2]],
        };
        assert!(partition(&topology, 3, &[]).is_err());
    }
}
