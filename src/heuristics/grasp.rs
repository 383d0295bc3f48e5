//! Greedy Randomized Adaptive Search Procedure.
//!
//! Each trial builds collection routes with a restricted candidate list of
//! size `k`, improves them with the local search engine and assigns the
//! transport fleet. Trials are independent and can run in parallel.

use crate::error::{Result, SolverError};
use crate::heuristics::construction::{
    build_collection_routes, evaluate_candidate, CandidateSelector, CollectionState, ConstructionHeuristic, Selection,
};
use crate::heuristics::local_search::LocalSearchEngine;
use crate::heuristics::transport::TransportAssigner;
use crate::instance::{ProblemInstance, EPSILON};
use crate::solution::{Route, Solution, TrialMetrics};
use ordered_float::OrderedFloat;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Random choice among the `k` nearest feasible pending zones
pub struct RestrictedCandidateList<R: Rng> {
    k: usize,
    rng: R,
}

impl<R: Rng> RestrictedCandidateList<R> {
    /// A list size of 0 behaves as 1
    pub fn new(k: usize, rng: R) -> Self {
        RestrictedCandidateList { k: k.max(1), rng }
    }
}

impl<R: Rng> CandidateSelector for RestrictedCandidateList<R> {
    fn select(&mut self, instance: &ProblemInstance, state: &CollectionState, route: &Route) -> Result<Selection> {
        let position = route.position();
        let mut feasible = Vec::new();
        let mut overflow = false;

        for zone in state.pending_zones(instance) {
            let fit = evaluate_candidate(instance, state, route, zone)?;
            if fit.is_feasible() {
                feasible.push(zone);
            } else if fit.fits_time {
                overflow = true;
            }
        }

        if feasible.is_empty() {
            return Ok(if overflow && route.load > EPSILON {
                Selection::Discharge
            } else {
                Selection::Close
            });
        }

        feasible.sort_by_key(|&z| (OrderedFloat(instance.distance(position, z)), z));
        feasible.truncate(self.k);
        let pick = self.rng.gen_range(0..feasible.len());
        Ok(Selection::Visit(feasible[pick]))
    }
}

/// Configuration for GRASP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraspConfig {
    /// Restricted candidate list sizes to try
    pub k_values: Vec<usize>,
    /// Trials per list size
    pub repetitions: usize,
    pub seed: u64,
    /// Run trials on the rayon thread pool
    pub parallel: bool,
}

impl Default for GraspConfig {
    fn default() -> Self {
        GraspConfig {
            k_values: vec![2, 3, 4, 5],
            repetitions: 10,
            seed: 42,
            parallel: true,
        }
    }
}

/// Seed of the `index`-th trial derived from a base seed
pub(crate) fn trial_seed(base: u64, index: usize) -> u64 {
    base.wrapping_add((index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Keep the solution with the fewest vehicles, the earliest one on ties.
///
/// Failed runs are logged and excluded; when every run failed the first error
/// is returned.
pub(crate) fn select_best<I>(outcomes: I) -> Result<(Solution, Vec<TrialMetrics>)>
where
    I: IntoIterator<Item = Result<(Solution, Vec<TrialMetrics>)>>,
{
    let mut best: Option<Solution> = None;
    let mut trials = Vec::new();
    let mut first_error = None;

    for outcome in outcomes {
        match outcome {
            Ok((solution, metrics)) => {
                trials.extend(metrics);
                if best.as_ref().map_or(true, |b| solution.vehicle_count() < b.vehicle_count()) {
                    best = Some(solution);
                }
            }
            Err(e) => {
                log::warn!("trial excluded: {}", e);
                first_error.get_or_insert(e);
            }
        }
    }

    match best {
        Some(solution) => Ok((solution, trials)),
        None => Err(first_error.unwrap_or_else(|| SolverError::InvariantViolation("no trial was run".to_string()))),
    }
}

/// GRASP over a set of restricted candidate list sizes
pub struct Grasp {
    pub config: GraspConfig,
    local_search: LocalSearchEngine,
    transport: TransportAssigner,
}

impl Grasp {
    pub fn new(config: GraspConfig) -> Self {
        Grasp {
            config,
            local_search: LocalSearchEngine::with_standard_operators(),
            transport: TransportAssigner::new(),
        }
    }

    /// `(k, repetition)` of every trial, in trial order
    pub fn plan(&self) -> Vec<(usize, usize)> {
        (0..self.config.repetitions)
            .flat_map(|rep| self.config.k_values.iter().map(move |&k| (k, rep)))
            .collect()
    }

    /// One randomized construction, local search and transport assignment
    pub fn run_trial(&self, instance: &ProblemInstance, k: usize, repetition: usize, seed: u64) -> Result<(Solution, TrialMetrics)> {
        let start = Instant::now();

        let mut selector = RestrictedCandidateList::new(k, ChaCha8Rng::seed_from_u64(seed));
        let mut routes = build_collection_routes(instance, &mut selector)?;
        let distance_before: f64 = routes.iter().map(|r| r.distance(instance)).sum();

        self.local_search.improve_routes(instance, &mut routes);
        let distance_after: f64 = routes.iter().map(|r| r.distance(instance)).sum();

        let transport_routes = self.transport.assign(instance, &routes)?;

        let mut solution = Solution::new(instance, self.name());
        solution.collection_routes = routes;
        solution.transport_routes = transport_routes;
        solution.distance_before = distance_before;
        solution.distance_after = distance_after;
        solution.computation_time = start.elapsed().as_secs_f64();

        let metrics = TrialMetrics {
            instance: instance.name.clone(),
            k,
            repetition,
            collection_vehicles: solution.collection_routes.len(),
            transport_vehicles: solution.transport_routes.len(),
            distance_before,
            distance_after,
            time: solution.computation_time,
        };

        log::debug!("{} k={} rep={}: {} vehicles, distance {:.2} -> {:.2}",
            instance.name, k, repetition, metrics.vehicles(), distance_before, distance_after);
        Ok((solution, metrics))
    }

    /// Run every trial and keep the best solution, with all trial metrics attached
    pub fn run(&self, instance: &ProblemInstance) -> Result<Solution> {
        let start = Instant::now();
        let plan = self.plan();

        let trial = |(index, &(k, rep)): (usize, &(usize, usize))| {
            self.run_trial(instance, k, rep, trial_seed(self.config.seed, index))
                .map(|(solution, metrics)| (solution, vec![metrics]))
        };

        let outcomes: Vec<_> = if self.config.parallel {
            plan.par_iter().enumerate().map(trial).collect()
        } else {
            plan.iter().enumerate().map(trial).collect()
        };

        let (mut best, trials) = select_best(outcomes)?;
        best.trials = trials;
        best.computation_time = start.elapsed().as_secs_f64();

        log::info!("{}: GRASP best of {} trials uses {} vehicles",
            instance.name, best.trials.len(), best.vehicle_count());
        Ok(best)
    }
}

impl ConstructionHeuristic for Grasp {
    fn construct(&self, instance: &ProblemInstance) -> Result<Solution> {
        self.run(instance)
    }

    fn name(&self) -> &str {
        "GRASP"
    }
}
