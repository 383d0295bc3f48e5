//! Heuristics for the two-echelon collection problem.
//!
//! This module exports the collection constructors, the local search
//! operators, the transport assignment and the GRASP / RVND drivers.

pub mod construction;
pub mod local_search;
pub mod transport;
pub mod grasp;
pub mod rvnd;

pub use construction::*;
pub use local_search::*;
pub use transport::*;
pub use grasp::*;
pub use rvnd::*;
