//! Solution representation for the two-echelon problem.
//!
//! This module provides the route model shared by both fleets, the transfer
//! tasks handed from the collection echelon to the transport echelon, and the
//! solution record published to reporting.

use crate::error::{Result, SolverError};
use crate::instance::{ProblemInstance, ZoneKind, EPSILON};
use serde::{Deserialize, Serialize};

/// Which fleet a route belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteKind {
    /// Starts and ends at the depot, discharges at transfer stations
    Collection,
    /// Starts and ends at the dumpsite, picks up tasks at transfer stations
    Transport,
}

/// Lifecycle of a vehicle
///
/// `Idle -> Loading -> Discharging -> (Loading | Discharging)* -> Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteState {
    Idle,
    Loading,
    Discharging,
    Closed,
}

/// Waste accumulated at a transfer station, waiting for the transport fleet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub amount: f64,
    /// Transfer station zone index
    pub station: usize,
    /// Completion time (minutes) reported by the collection route
    pub time: f64,
}

/// A vehicle route: ordered zone visits plus running load and elapsed time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub kind: RouteKind,
    /// Zone indices, starting at the route origin
    pub stops: Vec<usize>,
    /// Load currently on board
    pub load: f64,
    /// Minutes spent so far (travel + processing)
    pub elapsed: f64,
    pub state: RouteState,
    /// Tasks picked up by a transport route, in pickup order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<Task>,
}

impl Route {
    /// Open an idle vehicle at its origin (depot or dumpsite)
    pub fn open(kind: RouteKind, origin: usize) -> Self {
        Route {
            kind,
            stops: vec![origin],
            load: 0.0,
            elapsed: 0.0,
            state: RouteState::Idle,
            tasks: Vec::new(),
        }
    }

    /// Current position of the vehicle
    #[inline]
    pub fn position(&self) -> usize {
        self.stops[self.stops.len() - 1]
    }

    #[inline]
    pub fn origin(&self) -> usize {
        self.stops[0]
    }

    pub fn is_closed(&self) -> bool {
        self.state == RouteState::Closed
    }

    /// Drive to a zone, accounting for the travel time
    pub fn travel_to(&mut self, instance: &ProblemInstance, zone: usize) {
        debug_assert!(!self.is_closed(), "closed routes cannot move");
        self.elapsed += instance.travel_time(self.position(), zone);
        self.stops.push(zone);
    }

    /// Load waste at the current position
    pub fn collect(&mut self, amount: f64, processing_time: f64) {
        self.load += amount;
        self.elapsed += processing_time;
        self.state = RouteState::Loading;
    }

    /// Empty the vehicle at the current position and return the discharged amount
    pub fn discharge(&mut self) -> f64 {
        let amount = self.load;
        self.load = 0.0;
        self.state = RouteState::Discharging;
        amount
    }

    /// Drive back to the origin (if not already there), discharge and close
    pub fn close(&mut self, instance: &ProblemInstance) {
        let home = self.origin();
        if self.position() != home {
            self.travel_to(instance, home);
        }
        self.discharge();
        self.state = RouteState::Closed;
    }

    /// Total Euclidean length of the route
    pub fn distance(&self, instance: &ProblemInstance) -> f64 {
        instance.route_cost(&self.stops)
    }

    /// Number of collection zones served
    pub fn num_served(&self, instance: &ProblemInstance) -> usize {
        self.stops.iter().filter(|&&z| instance.zones[z].is_collection()).count()
    }

    /// Recompute the elapsed time of a closed collection route from its stops
    pub fn recompute(&mut self, instance: &ProblemInstance) {
        self.elapsed = self.stops.windows(2)
            .map(|leg| instance.travel_time(leg[0], leg[1]) + instance.zones[leg[1]].processing_time)
            .sum();
        self.load = 0.0;
    }

    /// Zone ids along the route
    pub fn labels(&self, instance: &ProblemInstance) -> Vec<String> {
        self.stops.iter().map(|&z| instance.zones[z].id.clone()).collect()
    }
}

/// Metrics of one randomized construction + improvement trial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialMetrics {
    pub instance: String,
    /// Restricted candidate list size
    pub k: usize,
    /// Repetition index within its parameter cell
    pub repetition: usize,
    pub collection_vehicles: usize,
    pub transport_vehicles: usize,
    pub distance_before: f64,
    pub distance_after: f64,
    /// Wall-clock seconds
    pub time: f64,
}

impl TrialMetrics {
    pub fn vehicles(&self) -> usize {
        self.collection_vehicles + self.transport_vehicles
    }
}

/// Represents a solution of both echelons
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    pub instance: String,
    /// Algorithm that generated this solution
    pub algorithm: String,
    pub collection_routes: Vec<Route>,
    pub transport_routes: Vec<Route>,
    /// Collection distance before local search
    pub distance_before: f64,
    /// Collection distance after local search
    pub distance_after: f64,
    /// Computation time in seconds
    pub computation_time: f64,
    /// Metrics of every trial that contributed to this solution
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trials: Vec<TrialMetrics>,
}

impl Solution {
    pub fn new(instance: &ProblemInstance, algorithm: &str) -> Self {
        Solution {
            instance: instance.name.clone(),
            algorithm: algorithm.to_string(),
            collection_routes: Vec::new(),
            transport_routes: Vec::new(),
            distance_before: 0.0,
            distance_after: 0.0,
            computation_time: 0.0,
            trials: Vec::new(),
        }
    }

    /// Combined collection + transport vehicle count
    pub fn vehicle_count(&self) -> usize {
        self.collection_routes.len() + self.transport_routes.len()
    }

    pub fn collection_distance(&self, instance: &ProblemInstance) -> f64 {
        self.collection_routes.iter().map(|r| r.distance(instance)).sum()
    }

    pub fn transport_distance(&self, instance: &ProblemInstance) -> f64 {
        self.transport_routes.iter().map(|r| r.distance(instance)).sum()
    }

    /// Check coverage, resource bounds and mass conservation of both echelons
    pub fn validate(&self, instance: &ProblemInstance) -> Result<()> {
        let violation = |msg: String| Err(SolverError::InvariantViolation(msg));

        let mut visits = vec![0usize; instance.zones.len()];
        for (r, route) in self.collection_routes.iter().enumerate() {
            if !instance.is_collection_feasible(&route.stops) {
                return violation(format!("collection route {} breaks capacity or duration", r));
            }
            for &z in &route.stops {
                visits[z] += 1;
            }
        }
        for &z in instance.collection_zones() {
            if visits[z] != 1 {
                return violation(format!("zone {} visited {} times", instance.zones[z].id, visits[z]));
            }
        }

        let capacity = instance.fleet.transport_capacity + EPSILON;
        let duration = instance.fleet.transport_duration + EPSILON;
        let dumpsite = instance.dumpsite();
        let mut transported = 0.0;

        for (r, route) in self.transport_routes.iter().enumerate() {
            if route.origin() != dumpsite || route.position() != dumpsite {
                return violation(format!("transport route {} does not start and end at the dumpsite", r));
            }
            let mut tasks = route.tasks.iter();
            let mut load = 0.0;
            let mut elapsed = 0.0;
            for leg in route.stops.windows(2) {
                elapsed += instance.travel_time(leg[0], leg[1]);
                if leg[1] == dumpsite {
                    transported += load;
                    load = 0.0;
                } else {
                    match tasks.next() {
                        Some(task) if task.station == leg[1] => load += task.amount,
                        _ => return violation(format!("transport route {} visits a station without a task", r)),
                    }
                }
                if load > capacity || elapsed > duration {
                    return violation(format!("transport route {} breaks capacity or duration", r));
                }
            }
        }

        let total = instance.total_demand();
        if (transported - total).abs() > 1e-6 * total.max(1.0) {
            return violation(format!("transported {:.3} of {:.3} collected", transported, total));
        }

        Ok(())
    }
}

impl std::fmt::Display for Solution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Solution ({})", self.algorithm)?;
        writeln!(f, "  Collection vehicles: {}", self.collection_routes.len())?;
        writeln!(f, "  Transport vehicles: {}", self.transport_routes.len())?;
        writeln!(f, "  Distance: {:.2} -> {:.2}", self.distance_before, self.distance_after)?;
        writeln!(f, "  Time: {:.4}s", self.computation_time)
    }
}

/// Sum of collected demand over the non-transfer stops of a set of routes
pub fn collected_demand(instance: &ProblemInstance, routes: &[Route]) -> f64 {
    routes.iter()
        .flat_map(|r| r.stops.iter())
        .filter(|&&z| instance.zones[z].kind == ZoneKind::CollectionZone)
        .map(|&z| instance.zones[z].demand)
        .sum()
}
