//! Solver configuration and algorithm dispatch.

use crate::error::{Result, SolverError};
use crate::heuristics::{ConstructionHeuristic, Grasp, GraspConfig, GreedyHeuristic, Rvnd, RvndConfig};
use crate::instance::ProblemInstance;
use crate::solution::Solution;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Solution method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Nearest feasible zone construction, no local search
    Greedy,
    /// Randomized construction + local search over fixed list sizes
    Grasp,
    /// GRASP swept over list sizes and repetition counts
    Rvnd,
}

impl Default for Algorithm {
    fn default() -> Self {
        Algorithm::Rvnd
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Algorithm::Greedy => "Greedy",
            Algorithm::Grasp => "GRASP",
            Algorithm::Rvnd => "RVND",
        };
        write!(f, "{}", name)
    }
}

/// Full solver configuration, loadable from JSON.
///
/// Missing fields fall back to their defaults, so `{"algorithm": "grasp"}` is
/// a valid file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub algorithm: Algorithm,
    pub grasp: GraspConfig,
    pub rvnd: RvndConfig,
}

impl SolverConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| SolverError::Config(e.to_string()))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Use one seed for every randomized component
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.grasp.seed = seed;
        self.rvnd.seed = seed;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.grasp.parallel = parallel;
        self.rvnd.parallel = parallel;
        self
    }
}

/// Solve an instance with the configured algorithm
pub fn solve(instance: &ProblemInstance, config: &SolverConfig) -> Result<Solution> {
    log::info!("solving {} ({} zones) with {}", instance.name, instance.num_zones(), config.algorithm);

    let heuristic: Box<dyn ConstructionHeuristic> = match config.algorithm {
        Algorithm::Greedy => Box::new(GreedyHeuristic::new()),
        Algorithm::Grasp => Box::new(Grasp::new(config.grasp.clone())),
        Algorithm::Rvnd => Box::new(Rvnd::new(config.rvnd.clone())),
    };
    heuristic.construct(instance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::tests::create_test_instance;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = SolverConfig::from_json(r#"{"algorithm": "grasp", "grasp": {"repetitions": 2}}"#).unwrap();
        assert_eq!(config.algorithm, Algorithm::Grasp);
        assert_eq!(config.grasp.repetitions, 2);
        assert_eq!(config.grasp.k_values, GraspConfig::default().k_values);
        assert_eq!(config.rvnd, RvndConfig::default());
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(SolverConfig::from_json("{\"algorithm\": \"tabu\"}"), Err(SolverError::Config(_))));
    }

    #[test]
    fn test_solve_every_algorithm() {
        let instance = create_test_instance();
        for algorithm in [Algorithm::Greedy, Algorithm::Grasp, Algorithm::Rvnd] {
            let mut config = SolverConfig { algorithm, ..Default::default() }.with_parallel(false);
            config.grasp.repetitions = 2;
            config.rvnd.k_max = 3;
            config.rvnd.max_repetitions = 1;

            let solution = solve(&instance, &config).unwrap();
            assert!(solution.validate(&instance).is_ok(), "{} produced an invalid solution", algorithm);
            assert_eq!(solution.algorithm, algorithm.to_string());
        }
    }
}
