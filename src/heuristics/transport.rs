//! Second echelon: moving waste from transfer stations to the dumpsite.
//!
//! Every transfer-station visit of a finished collection route leaves a
//! [`Task`]. Tasks are served in completion-time order; each goes to the open
//! transport vehicle nearest to the station among those able to take it, or to
//! a new vehicle leaving the dumpsite.

use crate::error::{Result, SolverError};
use crate::instance::{ProblemInstance, ZoneKind, EPSILON};
use crate::solution::{Route, RouteKind, Task};
use ordered_float::OrderedFloat;
use std::collections::VecDeque;

/// Greedy nearest-vehicle assignment of transfer tasks
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportAssigner;

impl TransportAssigner {
    pub fn new() -> Self {
        TransportAssigner
    }

    /// Extract the tasks left by a set of closed collection routes.
    ///
    /// Along each route, collected amount and elapsed time accumulate from the
    /// previous transfer station (or the depot); each transfer station emits
    /// the accumulated amount and resets both. Empty visits emit nothing. The
    /// result is stably sorted by completion time.
    pub fn derive_tasks(&self, instance: &ProblemInstance, routes: &[Route]) -> Vec<Task> {
        let mut tasks = Vec::new();

        for route in routes {
            let mut amount = 0.0;
            let mut time = 0.0;
            for leg in route.stops.windows(2) {
                let zone = &instance.zones[leg[1]];
                time += instance.travel_time(leg[0], leg[1]) + zone.processing_time;
                match zone.kind {
                    ZoneKind::CollectionZone => amount += zone.demand,
                    ZoneKind::TransferStation => {
                        if amount > EPSILON {
                            tasks.push(Task { amount, station: leg[1], time });
                        }
                        amount = 0.0;
                        time = 0.0;
                    }
                    _ => {}
                }
            }
        }

        tasks.sort_by_key(|t| OrderedFloat(t.time));
        tasks
    }

    /// Build the transport routes serving every task of `collection_routes`
    pub fn assign(&self, instance: &ProblemInstance, collection_routes: &[Route]) -> Result<Vec<Route>> {
        let tasks = self.derive_tasks(instance, collection_routes);
        self.assign_tasks(instance, tasks)
    }

    /// Assign tasks, already sorted by time, to transport vehicles.
    ///
    /// After each pickup a vehicle whose free capacity is below the smallest
    /// pending task first drives to the dumpsite to unload. All vehicles end at
    /// the dumpsite.
    pub fn assign_tasks(&self, instance: &ProblemInstance, tasks: Vec<Task>) -> Result<Vec<Route>> {
        let fleet = &instance.fleet;
        let dumpsite = instance.dumpsite();

        if let Some(task) = tasks.iter().find(|t| t.amount > fleet.transport_capacity + EPSILON) {
            return Err(SolverError::infeasible(
                instance.zones[task.station].id.clone(),
                format!("task of {} exceeds transport capacity {}", task.amount, fleet.transport_capacity),
            ));
        }

        let mut pending: VecDeque<Task> = tasks.into();
        let mut vehicles: Vec<Route> = Vec::new();

        while let Some(task) = pending.pop_front() {
            let nearest = vehicles.iter()
                .enumerate()
                .filter_map(|(i, v)| self.pickup_cost(instance, v, &task).map(|cost| (i, cost)))
                .min_by_key(|&(i, cost)| (OrderedFloat(cost), i))
                .map(|(i, _)| i);

            let index = match nearest {
                Some(i) => i,
                None => {
                    let round_trip = instance.travel_time(dumpsite, task.station)
                        + instance.travel_time(task.station, dumpsite);
                    if round_trip > fleet.transport_duration + EPSILON {
                        return Err(SolverError::infeasible(
                            instance.zones[task.station].id.clone(),
                            format!("round trip from the dumpsite exceeds transport duration {}", fleet.transport_duration),
                        ));
                    }
                    vehicles.push(Route::open(RouteKind::Transport, dumpsite));
                    vehicles.len() - 1
                }
            };

            let vehicle = &mut vehicles[index];
            vehicle.travel_to(instance, task.station);
            vehicle.collect(task.amount, 0.0);
            vehicle.tasks.push(task);

            let smallest = pending.iter().map(|t| OrderedFloat(t.amount)).min();
            if let Some(OrderedFloat(smallest)) = smallest {
                if fleet.transport_capacity - vehicle.load < smallest - EPSILON {
                    vehicle.travel_to(instance, dumpsite);
                    vehicle.discharge();
                }
            }
        }

        for vehicle in &mut vehicles {
            vehicle.close(instance);
        }

        log::debug!("{}: {} transport vehicles", instance.name, vehicles.len());
        Ok(vehicles)
    }

    /// Distance from the vehicle to the task's station, or `None` when the
    /// vehicle cannot take the task.
    ///
    /// A vehicle qualifies if the task fits its free capacity, it can drive
    /// from its previous station within the time separating both tasks, and it
    /// can still reach the dumpsite within the transport duration.
    fn pickup_cost(&self, instance: &ProblemInstance, vehicle: &Route, task: &Task) -> Option<f64> {
        let fleet = &instance.fleet;

        if vehicle.load + task.amount > fleet.transport_capacity + EPSILON {
            return None;
        }

        if let Some(last) = vehicle.tasks.last() {
            let transfer = instance.travel_time(last.station, task.station);
            if transfer > task.time - last.time + EPSILON {
                return None;
            }
        }

        let finish = vehicle.elapsed
            + instance.travel_time(vehicle.position(), task.station)
            + instance.travel_time(task.station, instance.dumpsite());
        if finish > fleet.transport_duration + EPSILON {
            return None;
        }

        Some(instance.distance(vehicle.position(), task.station))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristics::construction::GreedyHeuristic;
    use crate::instance::tests::{ample_fleet, create_test_instance};
    use crate::instance::Zone;

    fn greedy_routes(instance: &ProblemInstance) -> Vec<Route> {
        GreedyHeuristic::new().build(instance).unwrap()
    }

    #[test]
    fn test_derive_tasks_resets_at_each_station() {
        let instance = create_test_instance();
        let tasks = TransportAssigner::new().derive_tasks(&instance, &greedy_routes(&instance));

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].amount, 8.0);
        assert!((tasks[0].time - (2.0 + 164f64.sqrt())).abs() < 1e-9);
        assert_eq!(tasks[1].amount, 4.0);
        assert!((tasks[1].time - 2.0 * 149f64.sqrt()).abs() < 1e-9);
        assert!(tasks.iter().all(|t| t.station == 1));
    }

    #[test]
    fn test_single_vehicle_takes_all_tasks() {
        let instance = create_test_instance();
        let routes = TransportAssigner::new().assign(&instance, &greedy_routes(&instance)).unwrap();

        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].stops, vec![2, 1, 1, 2]);
        let carried: f64 = routes[0].tasks.iter().map(|t| t.amount).sum();
        assert_eq!(carried, instance.total_demand());
        assert!(routes[0].is_closed());
    }

    #[test]
    fn test_vehicle_unloads_when_next_task_cannot_fit() {
        let mut fleet = ample_fleet(10.0);
        fleet.transport_capacity = 10.0;
        let zones = create_test_instance().zones;
        let instance = ProblemInstance::new("divert", zones, fleet).unwrap();

        let routes = TransportAssigner::new().assign(&instance, &greedy_routes(&instance)).unwrap();

        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].stops, vec![2, 1, 2, 1, 2]);
    }

    #[test]
    fn test_task_above_transport_capacity_is_infeasible() {
        let mut fleet = ample_fleet(10.0);
        fleet.transport_capacity = 5.0;
        let instance = ProblemInstance::new("small", create_test_instance().zones, fleet).unwrap();

        match TransportAssigner::new().assign(&instance, &greedy_routes(&instance)) {
            Err(SolverError::InfeasibleRoute { zone, .. }) => assert_eq!(zone, "IF"),
            other => panic!("expected InfeasibleRoute, got {:?}", other),
        }
    }

    #[test]
    fn test_unreachable_station_is_infeasible() {
        let mut fleet = ample_fleet(10.0);
        fleet.transport_duration = 10.0;
        let instance = ProblemInstance::new("short", create_test_instance().zones, fleet).unwrap();

        assert!(matches!(
            TransportAssigner::new().assign(&instance, &greedy_routes(&instance)),
            Err(SolverError::InfeasibleRoute { .. })
        ));
    }

    #[test]
    fn test_time_gap_between_stations() {
        let zones = vec![
            Zone::depot(0.0, 0.0),
            Zone::transfer_station("IF", 10.0, 10.0),
            Zone::transfer_station("IF1", 0.0, 20.0),
            Zone::dumpsite(20.0, 20.0),
            Zone::collection("Z1", 1.0, 0.0, 4.0, 0.0),
        ];
        let instance = ProblemInstance::new("gap", zones, ample_fleet(10.0)).unwrap();
        let assigner = TransportAssigner::new();

        let close = vec![
            Task { amount: 4.0, station: 1, time: 10.0 },
            Task { amount: 4.0, station: 2, time: 12.0 },
        ];
        assert_eq!(assigner.assign_tasks(&instance, close).unwrap().len(), 2);

        let spread = vec![
            Task { amount: 4.0, station: 1, time: 10.0 },
            Task { amount: 4.0, station: 2, time: 30.0 },
        ];
        let routes = assigner.assign_tasks(&instance, spread).unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].stops, vec![3, 1, 2, 3]);
    }

    #[test]
    fn test_no_tasks_no_vehicles() {
        let instance = create_test_instance();
        let routes = TransportAssigner::new().assign_tasks(&instance, Vec::new()).unwrap();
        assert!(routes.is_empty());
    }
}
