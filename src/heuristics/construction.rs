//! Construction heuristics for the collection echelon.
//!
//! Vehicles leave the depot, repeatedly pick a pending collection zone, detour
//! to a transfer station when the next zone would overflow them, and return to
//! the depot through a transfer station. The zone choice is delegated to a
//! [`CandidateSelector`]: the deterministic nearest-zone rule used by
//! [`GreedyHeuristic`], or the restricted candidate list used by GRASP.

use crate::error::{Result, SolverError};
use crate::heuristics::transport::TransportAssigner;
use crate::instance::{ProblemInstance, EPSILON};
use crate::solution::{Route, RouteKind, Solution};
use ordered_float::OrderedFloat;

/// Common interface of the complete solution methods (greedy, GRASP, RVND)
pub trait ConstructionHeuristic {
    fn construct(&self, instance: &ProblemInstance) -> Result<Solution>;
    fn name(&self) -> &str;
}

/// Zone demand and pending set of one construction run.
///
/// Each run owns its snapshot, so concurrent trials never share mutable state.
#[derive(Debug, Clone)]
pub struct CollectionState {
    demand: Vec<f64>,
    pending: Vec<bool>,
    remaining: usize,
}

impl CollectionState {
    pub fn new(instance: &ProblemInstance) -> Self {
        let demand = instance.zones.iter().map(|z| z.demand).collect();
        let mut pending = vec![false; instance.zones.len()];
        for &z in instance.collection_zones() {
            pending[z] = true;
        }

        CollectionState {
            demand,
            pending,
            remaining: instance.collection_zones().len(),
        }
    }

    #[inline]
    pub fn is_pending(&self, zone: usize) -> bool {
        self.pending[zone]
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    #[inline]
    pub fn demand(&self, zone: usize) -> f64 {
        self.demand[zone]
    }

    /// Pending collection zones in input order
    pub fn pending_zones<'a>(&'a self, instance: &'a ProblemInstance) -> impl Iterator<Item = usize> + 'a {
        instance.collection_zones().iter().copied().filter(move |&z| self.pending[z])
    }

    /// Empty a zone, remove it from the pending set and return its demand
    pub fn take(&mut self, zone: usize) -> f64 {
        debug_assert!(self.pending[zone], "zone taken twice");
        self.pending[zone] = false;
        self.remaining -= 1;
        std::mem::replace(&mut self.demand[zone], 0.0)
    }
}

/// Next action of a collection vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Drive to the zone and collect it
    Visit(usize),
    /// Drive to the nearest transfer station and empty the vehicle
    Discharge,
    /// Finish the route
    Close,
}

/// Result of the capacity and duration tests for one candidate zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateFit {
    pub fits_load: bool,
    pub fits_time: bool,
}

impl CandidateFit {
    pub fn is_feasible(&self) -> bool {
        self.fits_load && self.fits_time
    }

    /// Map the tests to an action for a vehicle currently carrying `load`
    pub fn selection(&self, zone: usize, load: f64) -> Selection {
        match (self.fits_load, self.fits_time) {
            (true, true) => Selection::Visit(zone),
            (false, true) if load > EPSILON => Selection::Discharge,
            _ => Selection::Close,
        }
    }
}

/// Test whether `route` can serve `zone` next.
///
/// The duration test looks ahead: reach the zone, process it, drive to the
/// transfer station nearest to it and return to the depot.
pub fn evaluate_candidate(
    instance: &ProblemInstance,
    state: &CollectionState,
    route: &Route,
    zone: usize,
) -> Result<CandidateFit> {
    let fleet = &instance.fleet;
    let fits_load = route.load + state.demand(zone) <= fleet.collection_capacity + EPSILON;

    let station = instance.nearest_transfer_station(zone)?;
    let lookahead = instance.travel_time(route.position(), zone)
        + instance.zones[zone].processing_time
        + instance.travel_time(zone, station)
        + instance.travel_time(station, instance.depot());
    let fits_time = route.elapsed + lookahead <= fleet.collection_duration + EPSILON;

    Ok(CandidateFit { fits_load, fits_time })
}

/// Policy choosing the next move of a collection vehicle
pub trait CandidateSelector {
    fn select(&mut self, instance: &ProblemInstance, state: &CollectionState, route: &Route) -> Result<Selection>;
}

/// Deterministic rule: the nearest pending zone (ties by input order), taken
/// only if it passes both tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestCandidate;

impl CandidateSelector for NearestCandidate {
    fn select(&mut self, instance: &ProblemInstance, state: &CollectionState, route: &Route) -> Result<Selection> {
        let position = route.position();
        let nearest = state.pending_zones(instance)
            .min_by_key(|&z| (OrderedFloat(instance.distance(position, z)), z));

        match nearest {
            Some(zone) => Ok(evaluate_candidate(instance, state, route, zone)?.selection(zone, route.load)),
            None => Ok(Selection::Close),
        }
    }
}

/// Build collection routes until every collection zone has been served.
///
/// Fails with [`SolverError::InfeasibleRoute`] when a freshly opened vehicle
/// cannot serve anything, i.e. some zone cannot be serviced even alone.
pub fn build_collection_routes<S>(instance: &ProblemInstance, selector: &mut S) -> Result<Vec<Route>>
where
    S: CandidateSelector + ?Sized,
{
    let mut state = CollectionState::new(instance);
    let mut routes = Vec::new();

    while state.remaining() > 0 {
        let mut route = Route::open(RouteKind::Collection, instance.depot());

        while state.remaining() > 0 {
            match selector.select(instance, &state, &route)? {
                Selection::Visit(zone) => {
                    route.travel_to(instance, zone);
                    let amount = state.take(zone);
                    route.collect(amount, instance.zones[zone].processing_time);
                }
                Selection::Discharge if route.load > EPSILON => {
                    let station = instance.nearest_transfer_station(route.position())?;
                    route.travel_to(instance, station);
                    route.discharge();
                }
                Selection::Discharge | Selection::Close => break,
            }
        }

        if route.num_served(instance) == 0 {
            return Err(unserviceable(instance, &state));
        }

        if !instance.zones[route.position()].is_transfer_station() {
            let station = instance.nearest_transfer_station(route.position())?;
            route.travel_to(instance, station);
            route.discharge();
        }
        route.close(instance);

        log::trace!("collection route {}: {:?}", routes.len(), route.labels(instance));
        routes.push(route);
    }

    Ok(routes)
}

/// Error for the nearest pending zone that an empty vehicle could not take
fn unserviceable(instance: &ProblemInstance, state: &CollectionState) -> SolverError {
    let depot = instance.depot();
    let Some(zone) = state.pending_zones(instance)
        .min_by_key(|&z| (OrderedFloat(instance.distance(depot, z)), z))
    else {
        return SolverError::InvariantViolation("vehicle closed with no pending zone".to_string());
    };

    let fleet = &instance.fleet;
    let reason = if state.demand(zone) > fleet.collection_capacity + EPSILON {
        format!("demand {} exceeds collection capacity {}", state.demand(zone), fleet.collection_capacity)
    } else {
        format!("round trip through a transfer station exceeds collection duration {}", fleet.collection_duration)
    };

    SolverError::infeasible(instance.zones[zone].id.clone(), reason)
}

/// Greedy nearest-feasible-zone heuristic.
///
/// Builds the collection routes with [`NearestCandidate`], then assigns the
/// resulting transfer tasks to the transport fleet. No local search.
#[derive(Debug, Clone, Default)]
pub struct GreedyHeuristic {
    transport: TransportAssigner,
}

impl GreedyHeuristic {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collection routes only
    pub fn build(&self, instance: &ProblemInstance) -> Result<Vec<Route>> {
        build_collection_routes(instance, &mut NearestCandidate)
    }
}

impl ConstructionHeuristic for GreedyHeuristic {
    fn construct(&self, instance: &ProblemInstance) -> Result<Solution> {
        let start = std::time::Instant::now();

        let collection_routes = self.build(instance)?;
        let transport_routes = self.transport.assign(instance, &collection_routes)?;

        let mut solution = Solution::new(instance, self.name());
        solution.collection_routes = collection_routes;
        solution.transport_routes = transport_routes;
        solution.distance_before = solution.collection_distance(instance);
        solution.distance_after = solution.distance_before;
        solution.computation_time = start.elapsed().as_secs_f64();

        log::info!("{}: greedy built {} collection + {} transport routes",
            instance.name, solution.collection_routes.len(), solution.transport_routes.len());
        Ok(solution)
    }

    fn name(&self) -> &str {
        "Greedy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::tests::{ample_fleet, create_test_instance};
    use crate::instance::Zone;
    use crate::solution::collected_demand;

    #[test]
    fn test_greedy_discharges_before_overflow() {
        let instance = create_test_instance();
        let routes = GreedyHeuristic::new().build(&instance).unwrap();

        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].labels(&instance), vec!["Depot", "Z1", "Z2", "IF", "Z3", "IF", "Depot"]);

        let expected = 2.0 + 164f64.sqrt() + 2.0 * 149f64.sqrt() + 200f64.sqrt();
        assert!((routes[0].distance(&instance) - expected).abs() < 1e-9);
        assert!(routes[0].is_closed());
        assert_eq!(routes[0].load, 0.0);
    }

    #[test]
    fn test_zone_above_capacity_is_infeasible() {
        let zones = vec![
            Zone::depot(0.0, 0.0),
            Zone::transfer_station("IF", 10.0, 10.0),
            Zone::dumpsite(20.0, 20.0),
            Zone::collection("Big", 1.0, 0.0, 15.0, 0.0),
        ];
        let instance = ProblemInstance::new("big", zones, ample_fleet(10.0)).unwrap();

        match GreedyHeuristic::new().build(&instance) {
            Err(SolverError::InfeasibleRoute { zone, .. }) => assert_eq!(zone, "Big"),
            other => panic!("expected InfeasibleRoute, got {:?}", other),
        }
    }

    #[test]
    fn test_zone_beyond_duration_is_infeasible() {
        let mut fleet = ample_fleet(10.0);
        fleet.collection_duration = 20.0;
        let zones = vec![
            Zone::depot(0.0, 0.0),
            Zone::transfer_station("IF", 10.0, 10.0),
            Zone::dumpsite(20.0, 20.0),
            Zone::collection("Far", 40.0, 40.0, 1.0, 0.0),
        ];
        let instance = ProblemInstance::new("far", zones, fleet).unwrap();

        assert!(matches!(
            GreedyHeuristic::new().build(&instance),
            Err(SolverError::InfeasibleRoute { .. })
        ));
    }

    #[test]
    fn test_duration_bound_opens_second_vehicle() {
        let mut fleet = ample_fleet(100.0);
        fleet.collection_duration = 40.0;
        let zones = vec![
            Zone::depot(0.0, 0.0),
            Zone::transfer_station("IF", 10.0, 10.0),
            Zone::dumpsite(20.0, 20.0),
            Zone::collection("Z1", 1.0, 0.0, 1.0, 5.0),
            Zone::collection("Z2", 2.0, 0.0, 1.0, 5.0),
            Zone::collection("Z3", 3.0, 0.0, 1.0, 5.0),
        ];
        let instance = ProblemInstance::new("tight", zones, fleet).unwrap();
        let routes = GreedyHeuristic::new().build(&instance).unwrap();

        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].labels(&instance), vec!["Depot", "Z1", "Z2", "IF", "Depot"]);
        assert_eq!(routes[1].labels(&instance), vec!["Depot", "Z3", "IF", "Depot"]);
        for route in &routes {
            assert!(route.elapsed <= 40.0 + 1e-9);
            assert!(instance.is_collection_feasible(&route.stops));
        }
    }

    #[test]
    fn test_greedy_solution_conserves_mass() {
        let instance = create_test_instance();
        let solution = GreedyHeuristic::new().construct(&instance).unwrap();

        let collected = collected_demand(&instance, &solution.collection_routes);
        assert!((collected - instance.total_demand()).abs() < 1e-9);
        assert!(solution.validate(&instance).is_ok());
        assert_eq!(solution.distance_before, solution.distance_after);
    }

    #[test]
    fn test_state_take() {
        let instance = create_test_instance();
        let mut state = CollectionState::new(&instance);
        assert_eq!(state.remaining(), 3);
        assert_eq!(state.take(4), 4.0);
        assert!(!state.is_pending(4));
        assert_eq!(state.demand(4), 0.0);
        assert_eq!(state.pending_zones(&instance).collect::<Vec<_>>(), vec![3, 5]);
    }
}
