//! Module for parsing and representing two-echelon waste collection instances.
//!
//! An instance holds the zone network (depot, transfer stations, dumpsite and
//! collection zones), the fleet parameters of both echelons and a precomputed
//! Euclidean distance matrix. Instances are immutable once built: every search
//! stage borrows them read-only, and the demand that construction consumes is
//! tracked in per-trial state instead.

use crate::error::{Result, SolverError};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Tolerance used for every floating point bound comparison
pub const EPSILON: f64 = 1e-9;

/// Category of a zone in the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZoneKind {
    Depot,
    TransferStation,
    Dumpsite,
    CollectionZone,
}

impl ZoneKind {
    /// Classify a zone from its identifier in an instance file.
    /// `Depot` and `Dumpsite` are reserved, transfer stations are named `IF`, `IF1`, ...
    pub fn from_id(id: &str) -> Self {
        match id {
            "Depot" => ZoneKind::Depot,
            "Dumpsite" => ZoneKind::Dumpsite,
            _ if id.starts_with("IF") => ZoneKind::TransferStation,
            _ => ZoneKind::CollectionZone,
        }
    }
}

/// A location of the network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    /// Identifier as written in the instance file
    pub id: String,
    pub kind: ZoneKind,
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
    /// Waste waiting to be collected (0 for non-collection zones)
    pub demand: f64,
    /// Minutes spent servicing the zone
    pub processing_time: f64,
}

impl Zone {
    pub fn new(id: &str, kind: ZoneKind, x: f64, y: f64, demand: f64, processing_time: f64) -> Self {
        Zone {
            id: id.to_string(),
            kind,
            x,
            y,
            demand,
            processing_time,
        }
    }

    pub fn depot(x: f64, y: f64) -> Self {
        Self::new("Depot", ZoneKind::Depot, x, y, 0.0, 0.0)
    }

    pub fn dumpsite(x: f64, y: f64) -> Self {
        Self::new("Dumpsite", ZoneKind::Dumpsite, x, y, 0.0, 0.0)
    }

    pub fn transfer_station(id: &str, x: f64, y: f64) -> Self {
        Self::new(id, ZoneKind::TransferStation, x, y, 0.0, 0.0)
    }

    pub fn collection(id: &str, x: f64, y: f64, demand: f64, processing_time: f64) -> Self {
        Self::new(id, ZoneKind::CollectionZone, x, y, demand, processing_time)
    }

    #[inline]
    pub fn is_collection(&self) -> bool {
        self.kind == ZoneKind::CollectionZone
    }

    #[inline]
    pub fn is_transfer_station(&self) -> bool {
        self.kind == ZoneKind::TransferStation
    }

    /// Euclidean distance to another zone
    pub fn distance_to(&self, other: &Zone) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Square, symmetric matrix of pairwise Euclidean distances.
/// Computed once from zone positions and never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct DistanceMatrix {
    size: usize,
    values: Vec<f64>,
}

impl DistanceMatrix {
    /// Compute the matrix for a zone list (O(n²), diagonal is zero)
    pub fn build(zones: &[Zone]) -> Self {
        let size = zones.len();
        let mut values = vec![0.0; size * size];

        for i in 0..size {
            for j in i + 1..size {
                let d = zones[i].distance_to(&zones[j]);
                values[i * size + j] = d;
                values[j * size + i] = d;
            }
        }

        DistanceMatrix { size, values }
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.size + j]
    }

    pub fn len(&self) -> usize {
        self.size
    }
}

/// Capacity, duration and speed of both fleets
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FleetParameters {
    pub collection_capacity: f64,
    /// Minutes
    pub collection_duration: f64,
    pub transport_capacity: f64,
    /// Minutes
    pub transport_duration: f64,
    /// Distance units per hour, shared by both fleets
    pub speed: f64,
}

impl Default for FleetParameters {
    fn default() -> Self {
        FleetParameters {
            collection_capacity: 0.0,
            collection_duration: 0.0,
            transport_capacity: 0.0,
            transport_duration: 0.0,
            speed: 0.0,
        }
    }
}

/// Represents a complete two-echelon instance
#[derive(Debug, Clone, Serialize)]
pub struct ProblemInstance {
    /// Name of the instance (file stem when parsed from disk)
    pub name: String,
    /// All zones, in input order
    pub zones: Vec<Zone>,
    pub fleet: FleetParameters,
    /// Area bounds (Lx, Ly)
    pub area: (f64, f64),
    /// Fleet size announced by the instance file (informative only)
    pub num_vehicles: usize,
    #[serde(skip)]
    distance_matrix: DistanceMatrix,
    depot: usize,
    dumpsite: usize,
    transfer_stations: Vec<usize>,
    collection_zones: Vec<usize>,
}

impl ProblemInstance {
    /// Build an instance from validated zones.
    ///
    /// Requires exactly one depot, exactly one dumpsite, at least one transfer
    /// station, non-negative demand and processing times, and positive fleet
    /// parameters.
    pub fn new(name: &str, zones: Vec<Zone>, fleet: FleetParameters) -> Result<Self> {
        let find_unique = |kind: ZoneKind| -> Result<usize> {
            let matches: Vec<usize> = zones.iter()
                .enumerate()
                .filter(|(_, z)| z.kind == kind)
                .map(|(i, _)| i)
                .collect();
            match matches.as_slice() {
                [single] => Ok(*single),
                [] => Err(SolverError::InstanceValidation(format!("missing {:?}", kind))),
                _ => Err(SolverError::InstanceValidation(format!("more than one {:?}", kind))),
            }
        };

        let depot = find_unique(ZoneKind::Depot)?;
        let dumpsite = find_unique(ZoneKind::Dumpsite)?;

        let transfer_stations: Vec<usize> = zones.iter()
            .enumerate()
            .filter(|(_, z)| z.is_transfer_station())
            .map(|(i, _)| i)
            .collect();
        if transfer_stations.is_empty() {
            return Err(SolverError::InstanceValidation("no transfer station".to_string()));
        }

        for zone in &zones {
            if !zone.x.is_finite() || !zone.y.is_finite() {
                return Err(SolverError::InstanceValidation(
                    format!("zone {} has non-finite coordinates ({}, {})", zone.id, zone.x, zone.y)));
            }
            if !zone.demand.is_finite() || !zone.processing_time.is_finite() {
                return Err(SolverError::InstanceValidation(
                    format!("zone {} has non-finite demand or processing time", zone.id)));
            }
            if zone.demand < 0.0 {
                return Err(SolverError::InstanceValidation(
                    format!("zone {} has negative demand {}", zone.id, zone.demand)));
            }
            if zone.processing_time < 0.0 {
                return Err(SolverError::InstanceValidation(
                    format!("zone {} has negative processing time {}", zone.id, zone.processing_time)));
            }
        }

        let positive = [
            ("collection capacity", fleet.collection_capacity),
            ("collection duration", fleet.collection_duration),
            ("transport capacity", fleet.transport_capacity),
            ("transport duration", fleet.transport_duration),
            ("speed", fleet.speed),
        ];
        for (label, value) in positive {
            if !(value > 0.0) || !value.is_finite() {
                return Err(SolverError::InstanceValidation(format!("{} must be positive, got {}", label, value)));
            }
        }

        let collection_zones = zones.iter()
            .enumerate()
            .filter(|(_, z)| z.is_collection())
            .map(|(i, _)| i)
            .collect();

        let area = zones.iter().fold((0.0f64, 0.0f64), |(lx, ly), z| (lx.max(z.x), ly.max(z.y)));
        let distance_matrix = DistanceMatrix::build(&zones);

        Ok(ProblemInstance {
            name: name.to_string(),
            zones,
            fleet,
            area,
            num_vehicles: 0,
            distance_matrix,
            depot,
            dumpsite,
            transfer_stations,
            collection_zones,
        })
    }

    /// Parse an instance file (see [`ProblemInstance::parse`] for the format)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let name = path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::parse(&name, &text)
    }

    /// Parse the tokenized key/value format:
    ///
    /// ```text
    /// L1 <collection duration>    L2 <transport capacity>
    /// Q1 <collection capacity>    Q2 <transport duration>
    /// V <speed>  Lx <x bound>  Ly <y bound>  num_vehicles <n>  num_zones <n>
    /// <id> <x> <y> [<processing time> <demand>]
    /// ```
    ///
    /// Processing time and demand are only read for collection zones.
    pub fn parse(name: &str, text: &str) -> Result<Self> {
        let mut fleet = FleetParameters::default();
        let mut bounds: (Option<f64>, Option<f64>) = (None, None);
        let mut num_vehicles = 0usize;
        let mut num_zones: Option<usize> = None;
        let mut zones = Vec::new();

        for (index, line) in text.lines().enumerate() {
            let line_no = index + 1;
            let mut tokens = line.split_whitespace();
            let Some(key) = tokens.next() else {
                continue;
            };
            let values: Vec<&str> = tokens.collect();

            match key {
                "L1" => fleet.collection_duration = parse_value(key, &values, line_no)?,
                "L2" => fleet.transport_capacity = parse_value(key, &values, line_no)?,
                "Q1" => fleet.collection_capacity = parse_value(key, &values, line_no)?,
                "Q2" => fleet.transport_duration = parse_value(key, &values, line_no)?,
                "V" => fleet.speed = parse_value(key, &values, line_no)?,
                "Lx" => bounds.0 = Some(parse_value(key, &values, line_no)?),
                "Ly" => bounds.1 = Some(parse_value(key, &values, line_no)?),
                "num_vehicles" => num_vehicles = parse_value(key, &values, line_no)?,
                "num_zones" => num_zones = Some(parse_value(key, &values, line_no)?),
                "epsilon" | "offset" | "k" => continue,
                id => zones.push(parse_zone(id, &values, line_no)?),
            }
        }

        let (Some(lx), Some(ly)) = bounds else {
            return Err(SolverError::InstanceValidation("missing Lx/Ly area bounds".to_string()));
        };
        if !lx.is_finite() || !ly.is_finite() {
            return Err(SolverError::InstanceValidation(format!("area bounds must be finite, got {}x{}", lx, ly)));
        }

        for zone in zones.iter().filter(|z| z.kind != ZoneKind::Dumpsite) {
            if zone.x < 0.0 || zone.y < 0.0 {
                return Err(SolverError::InstanceValidation(
                    format!("coordinates of zone {} cannot be negative", zone.id)));
            }
            if zone.x > lx || zone.y > ly {
                return Err(SolverError::InstanceValidation(
                    format!("coordinates of zone {} are outside [0,{}]x[0,{}]", zone.id, lx, ly)));
            }
        }

        let mut instance = Self::new(name, zones, fleet)?;
        instance.area = (lx, ly);
        instance.num_vehicles = num_vehicles;

        if let Some(expected) = num_zones {
            if expected != instance.collection_zones.len() {
                log::warn!("{}: num_zones announces {} zones, found {}",
                    name, expected, instance.collection_zones.len());
            }
        }

        Ok(instance)
    }

    /// Get the distance between two zones
    #[inline]
    pub fn distance(&self, i: usize, j: usize) -> f64 {
        self.distance_matrix.get(i, j)
    }

    pub fn distance_matrix(&self) -> &DistanceMatrix {
        &self.distance_matrix
    }

    /// Minutes needed to drive from zone `i` to zone `j`
    #[inline]
    pub fn travel_time(&self, i: usize, j: usize) -> f64 {
        self.distance(i, j) / self.fleet.speed * 60.0
    }

    #[inline]
    pub fn depot(&self) -> usize {
        self.depot
    }

    #[inline]
    pub fn dumpsite(&self) -> usize {
        self.dumpsite
    }

    pub fn transfer_stations(&self) -> &[usize] {
        &self.transfer_stations
    }

    /// Collection zone indices, in input order
    pub fn collection_zones(&self) -> &[usize] {
        &self.collection_zones
    }

    pub fn num_zones(&self) -> usize {
        self.collection_zones.len()
    }

    pub fn total_demand(&self) -> f64 {
        self.collection_zones.iter().map(|&z| self.zones[z].demand).sum()
    }

    /// Nearest transfer station to a zone (ties broken by input order)
    pub fn nearest_transfer_station(&self, from: usize) -> Result<usize> {
        self.transfer_stations.iter()
            .copied()
            .min_by_key(|&s| (OrderedFloat(self.distance(from, s)), s))
            .ok_or_else(|| SolverError::InvariantViolation(
                format!("no transfer station reachable from {}", self.zones[from].id)))
    }

    /// Sum of consecutive-stop distances
    pub fn route_cost(&self, stops: &[usize]) -> f64 {
        stops.windows(2).map(|w| self.distance(w[0], w[1])).sum()
    }

    /// Check a collection stop sequence against both resource bounds.
    ///
    /// Load grows at collection zones and resets at every transfer station; it
    /// must never exceed the collection capacity and must be zero on arrival at
    /// the closing depot. Elapsed time (travel + processing) must stay within
    /// the collection duration at every prefix.
    pub fn is_collection_feasible(&self, stops: &[usize]) -> bool {
        if stops.len() < 2 || stops[0] != self.depot || stops[stops.len() - 1] != self.depot {
            return false;
        }

        let capacity = self.fleet.collection_capacity + EPSILON;
        let duration = self.fleet.collection_duration + EPSILON;
        let mut load = 0.0;
        let mut elapsed = 0.0;

        for leg in stops.windows(2) {
            let zone = &self.zones[leg[1]];
            elapsed += self.travel_time(leg[0], leg[1]) + zone.processing_time;
            match zone.kind {
                ZoneKind::TransferStation => load = 0.0,
                ZoneKind::CollectionZone => load += zone.demand,
                _ => {}
            }
            if load > capacity || elapsed > duration {
                return false;
            }
        }

        load <= EPSILON
    }

    /// Get statistics about the instance
    pub fn statistics(&self) -> InstanceStatistics {
        let mut distances: Vec<f64> = Vec::new();
        for i in 0..self.zones.len() {
            for j in i + 1..self.zones.len() {
                distances.push(self.distance(i, j));
            }
        }
        let avg_distance = if distances.is_empty() {
            0.0
        } else {
            distances.iter().sum::<f64>() / distances.len() as f64
        };
        let max_distance = distances.iter().cloned().fold(0.0, f64::max);
        let max_demand = self.collection_zones.iter()
            .map(|&z| self.zones[z].demand)
            .fold(0.0, f64::max);

        InstanceStatistics {
            name: self.name.clone(),
            num_zones: self.collection_zones.len(),
            num_transfer_stations: self.transfer_stations.len(),
            total_demand: self.total_demand(),
            max_demand,
            fleet: self.fleet,
            avg_distance,
            max_distance,
        }
    }
}

fn parse_value<T: FromStr>(key: &str, values: &[&str], line_no: usize) -> Result<T> {
    values.first()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| SolverError::InstanceValidation(format!("line {}: invalid value for {}", line_no, key)))
}

fn parse_zone(id: &str, values: &[&str], line_no: usize) -> Result<Zone> {
    let number = |pos: usize, what: &str| -> Result<f64> {
        values.get(pos)
            .and_then(|v| v.parse::<f64>().ok())
            .ok_or_else(|| SolverError::InstanceValidation(
                format!("line {}: zone {} has an invalid {}", line_no, id, what)))
    };

    let x = number(0, "x coordinate")?;
    let y = number(1, "y coordinate")?;
    let kind = ZoneKind::from_id(id);

    let zone = match kind {
        ZoneKind::CollectionZone => {
            let processing_time = number(2, "processing time")?;
            let demand = number(3, "demand")?;
            Zone::collection(id, x, y, demand, processing_time)
        }
        _ => Zone::new(id, kind, x, y, 0.0, 0.0),
    };

    Ok(zone)
}

/// Statistics about an instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceStatistics {
    pub name: String,
    pub num_zones: usize,
    pub num_transfer_stations: usize,
    pub total_demand: f64,
    pub max_demand: f64,
    pub fleet: FleetParameters,
    pub avg_distance: f64,
    pub max_distance: f64,
}

impl std::fmt::Display for InstanceStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Instance: {}", self.name)?;
        writeln!(f, "  Collection zones: {}", self.num_zones)?;
        writeln!(f, "  Transfer stations: {}", self.num_transfer_stations)?;
        writeln!(f, "  Total demand: {:.2} (max {:.2})", self.total_demand, self.max_demand)?;
        writeln!(f, "  Collection fleet: capacity {}, duration {} min",
            self.fleet.collection_capacity, self.fleet.collection_duration)?;
        writeln!(f, "  Transport fleet: capacity {}, duration {} min",
            self.fleet.transport_capacity, self.fleet.transport_duration)?;
        writeln!(f, "  Speed: {}", self.fleet.speed)?;
        writeln!(f, "  Avg distance: {:.2}", self.avg_distance)?;
        writeln!(f, "  Max distance: {:.2}", self.max_distance)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn ample_fleet(capacity: f64) -> FleetParameters {
        FleetParameters {
            collection_capacity: capacity,
            collection_duration: 10_000.0,
            transport_capacity: 40.0,
            transport_duration: 10_000.0,
            speed: 60.0,
        }
    }

    /// Depot at the origin, one transfer station at (10,10), three zones of demand 4 on the x axis
    pub(crate) fn create_test_instance() -> ProblemInstance {
        let zones = vec![
            Zone::depot(0.0, 0.0),
            Zone::transfer_station("IF", 10.0, 10.0),
            Zone::dumpsite(20.0, 20.0),
            Zone::collection("Z1", 1.0, 0.0, 4.0, 0.0),
            Zone::collection("Z2", 2.0, 0.0, 4.0, 0.0),
            Zone::collection("Z3", 3.0, 0.0, 4.0, 0.0),
        ];
        ProblemInstance::new("test", zones, ample_fleet(10.0)).unwrap()
    }

    const SAMPLE: &str = "\
L1 600
L2 30
num_vehicles 5
num_zones 3
Lx 20
Ly 20
Q1 10
Q2 480
V 40
epsilon 0.5
Depot 0 0
IF 10 10
IF1 5 15
Dumpsite 30 30
Z1 2 3 10 4
Z2 4 1 12 2.5
Z3 8 8 5 6
";

    #[test]
    fn test_zone_kinds() {
        assert_eq!(ZoneKind::from_id("Depot"), ZoneKind::Depot);
        assert_eq!(ZoneKind::from_id("Dumpsite"), ZoneKind::Dumpsite);
        assert_eq!(ZoneKind::from_id("IF"), ZoneKind::TransferStation);
        assert_eq!(ZoneKind::from_id("IF1"), ZoneKind::TransferStation);
        assert_eq!(ZoneKind::from_id("Z7"), ZoneKind::CollectionZone);
    }

    #[test]
    fn test_distance_matrix() {
        let zones = vec![
            Zone::depot(0.0, 0.0),
            Zone::collection("A", 3.0, 4.0, 1.0, 0.0),
        ];
        let matrix = DistanceMatrix::build(&zones);

        assert_eq!(matrix.len(), 2);
        assert!((matrix.get(0, 1) - 5.0).abs() < 1e-10);
        assert!((matrix.get(1, 0) - 5.0).abs() < 1e-10);
        assert_eq!(matrix.get(0, 0), 0.0);
    }

    #[test]
    fn test_parse_instance() {
        let instance = ProblemInstance::parse("sample", SAMPLE).unwrap();

        assert_eq!(instance.name, "sample");
        assert_eq!(instance.num_zones(), 3);
        assert_eq!(instance.transfer_stations().len(), 2);
        assert_eq!(instance.num_vehicles, 5);
        assert_eq!(instance.area, (20.0, 20.0));
        assert_eq!(instance.fleet.collection_duration, 600.0);
        assert_eq!(instance.fleet.transport_capacity, 30.0);
        assert_eq!(instance.fleet.collection_capacity, 10.0);
        assert_eq!(instance.fleet.transport_duration, 480.0);
        assert_eq!(instance.fleet.speed, 40.0);

        let z2 = &instance.zones[instance.collection_zones()[1]];
        assert_eq!(z2.id, "Z2");
        assert_eq!(z2.processing_time, 12.0);
        assert_eq!(z2.demand, 2.5);
        assert!((instance.total_demand() - 12.5).abs() < 1e-10);
    }

    #[test]
    fn test_parse_rejects_out_of_range_zone() {
        let text = SAMPLE.replace("Z3 8 8 5 6", "Z3 25 8 5 6");
        let err = ProblemInstance::parse("bad", &text).unwrap_err();
        assert!(matches!(err, SolverError::InstanceValidation(_)));
    }

    #[test]
    fn test_parse_rejects_negative_demand() {
        let text = SAMPLE.replace("Z3 8 8 5 6", "Z3 8 8 5 -6");
        let err = ProblemInstance::parse("bad", &text).unwrap_err();
        assert!(matches!(err, SolverError::InstanceValidation(_)));
    }

    #[test]
    fn test_parse_rejects_nan() {
        for (line, replacement) in [
            ("Z1 2 3 10 4", "Z1 NaN 3 10 NaN"),
            ("Z1 2 3 10 4", "Z1 2 3 10 NaN"),
            ("Z1 2 3 10 4", "Z1 2 3 inf 4"),
            ("Dumpsite 30 30", "Dumpsite NaN 30"),
            ("V 40", "V NaN"),
        ] {
            let text = SAMPLE.replace(line, replacement);
            let err = ProblemInstance::parse("bad", &text).unwrap_err();
            assert!(matches!(err, SolverError::InstanceValidation(_)), "{} accepted", replacement);
        }
    }

    #[test]
    fn test_parse_rejects_missing_transfer_station() {
        let text = SAMPLE.replace("IF 10 10\n", "").replace("IF1 5 15\n", "");
        let err = ProblemInstance::parse("bad", &text).unwrap_err();
        assert!(matches!(err, SolverError::InstanceValidation(_)));
    }

    #[test]
    fn test_parse_rejects_malformed_number() {
        let text = SAMPLE.replace("V 40", "V fast");
        assert!(ProblemInstance::parse("bad", &text).is_err());
    }

    #[test]
    fn test_nearest_transfer_station() {
        let instance = ProblemInstance::parse("sample", SAMPLE).unwrap();
        let z1 = instance.collection_zones()[0];
        let nearest = instance.nearest_transfer_station(z1).unwrap();
        assert_eq!(instance.zones[nearest].id, "IF");
    }

    #[test]
    fn test_collection_feasibility() {
        let instance = create_test_instance();
        let (depot, station) = (0, 1);

        // 8 units then a discharge, then 4 more
        assert!(instance.is_collection_feasible(&[depot, 3, 4, station, 5, station, depot]));
        // 12 units before the first discharge
        assert!(!instance.is_collection_feasible(&[depot, 3, 4, 5, station, depot]));
        // load still on board at the closing depot
        assert!(!instance.is_collection_feasible(&[depot, 3, depot]));
    }

    #[test]
    fn test_collection_feasibility_checks_duration() {
        let mut instance = create_test_instance();
        // 60 units/hour: one distance unit per minute
        instance.fleet.collection_duration = 30.0;
        assert!(instance.is_collection_feasible(&[0, 3, 1, 0]));

        instance.fleet.collection_duration = 20.0;
        assert!(!instance.is_collection_feasible(&[0, 3, 1, 0]));
    }
}
