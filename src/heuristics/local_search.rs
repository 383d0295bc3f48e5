//! Local search improvement for collection routes.
//!
//! This module implements the neighbourhoods:
//! - Swap of two zones between routes or within a route
//! - Reinsertion of a zone within its route or into another route
//! - 2-opt segment reversal within a route
//!
//! Operators only move collection zones; depots and transfer stations stay in
//! place. A move is accepted only when it strictly shortens the touched routes
//! and every touched route still satisfies the capacity and duration bounds.

use crate::instance::{ProblemInstance, EPSILON};
use crate::solution::Route;

/// Trait for local search operators
pub trait LocalSearch {
    /// Apply improving moves in place and return how many were accepted
    fn improve(&self, instance: &ProblemInstance, routes: &mut [Route]) -> usize;

    fn name(&self) -> &str;
}

#[inline]
fn is_movable(instance: &ProblemInstance, zone: usize) -> bool {
    instance.zones[zone].is_collection()
}

fn serves_any(instance: &ProblemInstance, stops: &[usize]) -> bool {
    stops.iter().any(|&z| is_movable(instance, z))
}

/// Distance of a stop sequence; a route left without zones costs nothing
fn sequence_cost(instance: &ProblemInstance, stops: &[usize]) -> f64 {
    if serves_any(instance, stops) {
        instance.route_cost(stops)
    } else {
        0.0
    }
}

/// Whether `candidate` is a strictly shorter feasible replacement of `current`
fn improves(instance: &ProblemInstance, current: &[usize], candidate: &[usize]) -> bool {
    instance.route_cost(candidate) < instance.route_cost(current) - EPSILON
        && instance.is_collection_feasible(candidate)
}

/// Distance change of putting `zone` at position `pos` instead of the current stop
fn replacement_delta(instance: &ProblemInstance, stops: &[usize], pos: usize, zone: usize) -> f64 {
    let (prev, current, next) = (stops[pos - 1], stops[pos], stops[pos + 1]);
    instance.distance(prev, zone) + instance.distance(zone, next)
        - instance.distance(prev, current) - instance.distance(current, next)
}

/// Exchange two zones belonging to different routes
#[derive(Debug, Clone, Copy, Default)]
pub struct SwapInter;

impl LocalSearch for SwapInter {
    fn improve(&self, instance: &ProblemInstance, routes: &mut [Route]) -> usize {
        let mut accepted = 0;

        for a in 0..routes.len() {
            for b in a + 1..routes.len() {
                for i in 1..routes[a].stops.len().saturating_sub(1) {
                    for j in 1..routes[b].stops.len().saturating_sub(1) {
                        let x = routes[a].stops[i];
                        let y = routes[b].stops[j];
                        if !is_movable(instance, x) || !is_movable(instance, y) {
                            continue;
                        }

                        let delta = replacement_delta(instance, &routes[a].stops, i, y)
                            + replacement_delta(instance, &routes[b].stops, j, x);
                        if delta >= -EPSILON {
                            continue;
                        }

                        let mut first = routes[a].stops.clone();
                        first[i] = y;
                        let mut second = routes[b].stops.clone();
                        second[j] = x;
                        if instance.is_collection_feasible(&first) && instance.is_collection_feasible(&second) {
                            routes[a].stops = first;
                            routes[b].stops = second;
                            accepted += 1;
                        }
                    }
                }
            }
        }

        accepted
    }

    fn name(&self) -> &str {
        "SwapInter"
    }
}

/// Exchange two zones of the same route
#[derive(Debug, Clone, Copy, Default)]
pub struct SwapIntra;

impl LocalSearch for SwapIntra {
    fn improve(&self, instance: &ProblemInstance, routes: &mut [Route]) -> usize {
        let mut accepted = 0;

        for route in routes.iter_mut() {
            let n = route.stops.len();
            for i in 1..n.saturating_sub(1) {
                for j in i + 1..n - 1 {
                    if !is_movable(instance, route.stops[i]) || !is_movable(instance, route.stops[j]) {
                        continue;
                    }
                    let mut candidate = route.stops.clone();
                    candidate.swap(i, j);
                    if improves(instance, &route.stops, &candidate) {
                        route.stops = candidate;
                        accepted += 1;
                    }
                }
            }
        }

        accepted
    }

    fn name(&self) -> &str {
        "SwapIntra"
    }
}

/// Move one zone to another position of its route
#[derive(Debug, Clone, Copy, Default)]
pub struct ReinsertIntra;

impl LocalSearch for ReinsertIntra {
    fn improve(&self, instance: &ProblemInstance, routes: &mut [Route]) -> usize {
        let mut accepted = 0;

        for route in routes.iter_mut() {
            let n = route.stops.len();
            for j in 1..n.saturating_sub(1) {
                if !is_movable(instance, route.stops[j]) {
                    continue;
                }
                for k in 1..n - 1 {
                    if k == j {
                        continue;
                    }
                    let mut candidate = route.stops.clone();
                    let zone = candidate.remove(j);
                    candidate.insert(k, zone);
                    if improves(instance, &route.stops, &candidate) {
                        route.stops = candidate;
                        accepted += 1;
                        break;
                    }
                }
            }
        }

        accepted
    }

    fn name(&self) -> &str {
        "ReinsertIntra"
    }
}

/// Move one zone into another route, possibly emptying its own
#[derive(Debug, Clone, Copy, Default)]
pub struct ReinsertInter;

impl ReinsertInter {
    /// First improving insertion point of `zone` in any other route
    fn find_target(
        &self,
        instance: &ProblemInstance,
        routes: &[Route],
        from: usize,
        zone: usize,
        saving: f64,
    ) -> Option<(usize, Vec<usize>)> {
        for (to, target) in routes.iter().enumerate() {
            if to == from || !serves_any(instance, &target.stops) {
                continue;
            }
            let target_cost = instance.route_cost(&target.stops);
            for k in 1..target.stops.len() {
                let mut candidate = target.stops.clone();
                candidate.insert(k, zone);
                if instance.route_cost(&candidate) - target_cost < saving - EPSILON
                    && instance.is_collection_feasible(&candidate)
                {
                    return Some((to, candidate));
                }
            }
        }
        None
    }
}

impl LocalSearch for ReinsertInter {
    fn improve(&self, instance: &ProblemInstance, routes: &mut [Route]) -> usize {
        let mut accepted = 0;

        for from in 0..routes.len() {
            let mut i = 1;
            while i + 1 < routes[from].stops.len() {
                let zone = routes[from].stops[i];
                if !is_movable(instance, zone) {
                    i += 1;
                    continue;
                }

                let mut source = routes[from].stops.clone();
                source.remove(i);
                if serves_any(instance, &source) && !instance.is_collection_feasible(&source) {
                    i += 1;
                    continue;
                }

                let saving = sequence_cost(instance, &routes[from].stops) - sequence_cost(instance, &source);
                match self.find_target(instance, routes, from, zone, saving) {
                    Some((to, target)) => {
                        routes[from].stops = source;
                        routes[to].stops = target;
                        accepted += 1;
                    }
                    None => i += 1,
                }
            }
        }

        accepted
    }

    fn name(&self) -> &str {
        "ReinsertInter"
    }
}

/// Reverse a segment of a route
#[derive(Debug, Clone, Copy, Default)]
pub struct TwoOptIntra;

impl LocalSearch for TwoOptIntra {
    fn improve(&self, instance: &ProblemInstance, routes: &mut [Route]) -> usize {
        let mut accepted = 0;

        for route in routes.iter_mut() {
            let n = route.stops.len();
            for i in 1..n.saturating_sub(1) {
                for j in i + 1..n - 1 {
                    let mut candidate = route.stops.clone();
                    candidate[i..=j].reverse();
                    if improves(instance, &route.stops, &candidate) {
                        route.stops = candidate;
                        accepted += 1;
                    }
                }
            }
        }

        accepted
    }

    fn name(&self) -> &str {
        "TwoOptIntra"
    }
}

/// Descent over a fixed list of neighbourhoods.
///
/// Operators run in order; full passes repeat until one accepts no move.
pub struct LocalSearchEngine {
    operators: Vec<Box<dyn LocalSearch + Send + Sync>>,
}

impl LocalSearchEngine {
    pub fn new() -> Self {
        LocalSearchEngine { operators: Vec::new() }
    }

    /// Swap (inter, intra), reinsertion (intra, inter), then 2-opt
    pub fn with_standard_operators() -> Self {
        let mut engine = Self::new();
        engine.add_operator(Box::new(SwapInter));
        engine.add_operator(Box::new(SwapIntra));
        engine.add_operator(Box::new(ReinsertIntra));
        engine.add_operator(Box::new(ReinsertInter));
        engine.add_operator(Box::new(TwoOptIntra));
        engine
    }

    pub fn add_operator(&mut self, op: Box<dyn LocalSearch + Send + Sync>) {
        self.operators.push(op);
    }

    /// Run the descent, then drop routes left without zones, collapse
    /// repeated stops and refresh route times.
    pub fn improve_routes(&self, instance: &ProblemInstance, routes: &mut Vec<Route>) -> usize {
        let accepted = self.improve(instance, routes);

        routes.retain(|r| r.num_served(instance) > 0);
        for route in routes.iter_mut() {
            route.stops.dedup();
            route.recompute(instance);
        }

        accepted
    }
}

impl Default for LocalSearchEngine {
    fn default() -> Self {
        Self::with_standard_operators()
    }
}

impl LocalSearch for LocalSearchEngine {
    fn improve(&self, instance: &ProblemInstance, routes: &mut [Route]) -> usize {
        let mut total = 0;

        loop {
            let mut pass = 0;
            for op in &self.operators {
                let accepted = op.improve(instance, routes);
                if accepted > 0 {
                    log::debug!("{} accepted {} moves", op.name(), accepted);
                }
                pass += accepted;
            }
            total += pass;
            if pass == 0 {
                break;
            }
        }

        total
    }

    fn name(&self) -> &str {
        "LocalSearch"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristics::construction::GreedyHeuristic;
    use crate::instance::tests::{ample_fleet, create_test_instance};
    use crate::instance::Zone;
    use crate::solution::RouteKind;

    fn closed_route(instance: &ProblemInstance, stops: &[usize]) -> Route {
        let mut route = Route::open(RouteKind::Collection, instance.depot());
        route.stops = stops.to_vec();
        route.recompute(instance);
        route.close(instance);
        route
    }

    fn total(instance: &ProblemInstance, routes: &[Route]) -> f64 {
        routes.iter().map(|r| r.distance(instance)).sum()
    }

    fn scattered_instance() -> ProblemInstance {
        let mut zones = vec![
            Zone::depot(50.0, 50.0),
            Zone::transfer_station("IF", 20.0, 80.0),
            Zone::transfer_station("IF1", 80.0, 20.0),
            Zone::dumpsite(100.0, 100.0),
        ];
        for i in 0..12 {
            let x = ((i * 37) % 100) as f64;
            let y = ((i * 61 + 13) % 100) as f64;
            zones.push(Zone::collection(&format!("Z{}", i), x, y, 3.0, 2.0));
        }
        let mut fleet = ample_fleet(10.0);
        fleet.collection_duration = 400.0;
        ProblemInstance::new("scattered", zones, fleet).unwrap()
    }

    #[test]
    fn test_two_opt_uncrosses_route() {
        let instance = create_test_instance();
        let mut routes = vec![closed_route(&instance, &[0, 4, 3, 1, 5, 1, 0])];
        let before = total(&instance, &routes);

        let accepted = TwoOptIntra.improve(&instance, &mut routes);

        assert!(accepted > 0);
        assert!(total(&instance, &routes) < before);
        assert_eq!(routes[0].stops, vec![0, 3, 4, 1, 5, 1, 0]);
        assert!(instance.is_collection_feasible(&routes[0].stops));
    }

    #[test]
    fn test_reinsert_inter_merges_routes() {
        let instance = create_test_instance();
        let mut routes = vec![
            closed_route(&instance, &[0, 3, 1, 0]),
            closed_route(&instance, &[0, 4, 1, 0]),
        ];

        let engine = LocalSearchEngine::with_standard_operators();
        engine.improve_routes(&instance, &mut routes);

        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].stops, vec![0, 3, 4, 1, 0]);
    }

    #[test]
    fn test_capacity_blocks_merge() {
        let instance = create_test_instance();
        let mut routes = vec![
            closed_route(&instance, &[0, 3, 4, 1, 0]),
            closed_route(&instance, &[0, 5, 1, 0]),
        ];

        LocalSearchEngine::with_standard_operators().improve_routes(&instance, &mut routes);

        assert_eq!(routes.len(), 2);
        for route in &routes {
            assert!(instance.is_collection_feasible(&route.stops));
        }
    }

    #[test]
    fn test_descent_is_monotone_and_idempotent() {
        let instance = scattered_instance();
        let mut routes = GreedyHeuristic::new().build(&instance).unwrap();
        let before = total(&instance, &routes);

        let engine = LocalSearchEngine::with_standard_operators();
        engine.improve_routes(&instance, &mut routes);
        let after = total(&instance, &routes);

        assert!(after <= before + 1e-9);
        for route in &routes {
            assert!(instance.is_collection_feasible(&route.stops));
            assert!(route.elapsed <= instance.fleet.collection_duration + 1e-9);
        }

        let mut served: Vec<usize> = routes.iter()
            .flat_map(|r| r.stops.iter().copied())
            .filter(|&z| instance.zones[z].is_collection())
            .collect();
        served.sort_unstable();
        assert_eq!(served, instance.collection_zones().to_vec());

        let snapshot: Vec<Vec<usize>> = routes.iter().map(|r| r.stops.clone()).collect();
        assert_eq!(engine.improve_routes(&instance, &mut routes), 0);
        let again: Vec<Vec<usize>> = routes.iter().map(|r| r.stops.clone()).collect();
        assert_eq!(snapshot, again);
    }

    #[test]
    fn test_operators_keep_stations_in_place() {
        let instance = create_test_instance();
        let mut routes = vec![closed_route(&instance, &[0, 3, 1, 4, 5, 1, 0])];

        SwapIntra.improve(&instance, &mut routes);
        ReinsertIntra.improve(&instance, &mut routes);

        assert_eq!(routes[0].stops[0], 0);
        assert_eq!(*routes[0].stops.last().unwrap(), 0);
        assert_eq!(routes[0].stops.iter().filter(|&&z| z == 1).count(), 2);
    }
}
