//! Waste Routing Solver Library
//!
//! Heuristics for the two-echelon waste collection problem: a collection
//! fleet empties zones into transfer stations, a transport fleet moves the
//! accumulated waste from the stations to the dumpsite.
//!
//! # Features
//!
//! - Instance parser and validation
//! - Greedy nearest-feasible-zone construction
//! - GRASP with a restricted candidate list and five local search operators
//! - RVND sweep over GRASP parameters, parallelised with rayon
//! - Transfer-task assignment to the transport fleet
//! - Batch benchmarking and SVG visualization
//!
//! # Example
//!
//! ```no_run
//! use waste_routing_solver::instance::ProblemInstance;
//! use waste_routing_solver::solver::{solve, Algorithm, SolverConfig};
//!
//! let instance = ProblemInstance::from_file("instance.txt").unwrap();
//! let config = SolverConfig { algorithm: Algorithm::Grasp, ..Default::default() };
//! let solution = solve(&instance, &config).unwrap();
//!
//! println!("Vehicles: {}", solution.vehicle_count());
//! ```

pub mod error;
pub mod instance;
pub mod solution;
pub mod heuristics;
pub mod solver;
pub mod benchmark;
pub mod visualization;

pub use error::{Result, SolverError};
pub use instance::ProblemInstance;
pub use solution::Solution;
