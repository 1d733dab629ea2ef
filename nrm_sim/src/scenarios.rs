//! Named experiment scenarios.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// NRM-001: one population, intra-population spawning only
    SinglePopulation,

    /// NRM-002: ten populations, ISOLATED vs CLUSTERED energy pooling
    TopologyComparison,

    /// NRM-003: 3-level hierarchy with sibling migration
    Metapopulation,

    /// NRM-004: 50% composition suppression, then recovery
    Suppression,

    /// NRM-005: control run with homeostatic scaling disabled
    NoHomeostasis,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::SinglePopulation,
            ScenarioId::TopologyComparison,
            ScenarioId::Metapopulation,
            ScenarioId::Suppression,
            ScenarioId::NoHomeostasis,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::SinglePopulation => "single_population",
            ScenarioId::TopologyComparison => "topology_comparison",
            ScenarioId::Metapopulation => "metapopulation",
            ScenarioId::Suppression => "suppression",
            ScenarioId::NoHomeostasis => "no_homeostasis",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::SinglePopulation => {
                "1 population, f_intra=0.025, no migration, 3000 cycles; expect Basin A"
            }
            ScenarioId::TopologyComparison => {
                "10 populations as singletons vs 2 pooled clusters; clustered viability must not drop"
            }
            ScenarioId::Metapopulation => {
                "3 meta-populations x 4 populations, per-meta pools, sibling migration"
            }
            ScenarioId::Suppression => {
                "block 50% of compositions in cycles 2000-2500; pattern weight must recover"
            }
            ScenarioId::NoHomeostasis => {
                "homeostatic scaling off; potentiation drifts pattern weights upward"
            }
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single_population" | "single" | "nrm-001" => Ok(ScenarioId::SinglePopulation),
            "topology_comparison" | "topology" | "nrm-002" => Ok(ScenarioId::TopologyComparison),
            "metapopulation" | "meta" | "nrm-003" => Ok(ScenarioId::Metapopulation),
            "suppression" | "nrm-004" => Ok(ScenarioId::Suppression),
            "no_homeostasis" | "nohomeostasis" | "nrm-005" => Ok(ScenarioId::NoHomeostasis),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for id in ScenarioId::all() {
            assert_eq!(id.name().parse::<ScenarioId>(), Ok(id));
            assert_eq!(id.to_string(), id.name());
        }
    }

    #[test]
    fn test_aliases_and_unknown() {
        assert_eq!("NRM-004".parse::<ScenarioId>(), Ok(ScenarioId::Suppression));
        assert_eq!("Meta".parse::<ScenarioId>(), Ok(ScenarioId::Metapopulation));
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }
}
