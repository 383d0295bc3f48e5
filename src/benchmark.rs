//! Batch experiments over a directory of instances.
//!
//! Solves every instance with one solver configuration, records one result
//! row per instance plus every GRASP trial, and summarises the batch.

use crate::error::Result;
use crate::instance::ProblemInstance;
use crate::solution::{Solution, TrialMetrics};
use crate::solver::{self, SolverConfig};

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fs::File;
use std::path::Path;

/// Outcome of solving one instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceResult {
    pub instance: String,
    pub algorithm: String,
    /// Number of collection zones
    pub zones: usize,
    pub collection_vehicles: usize,
    pub transport_vehicles: usize,
    /// Collection distance before local search
    pub distance_before: f64,
    /// Collection distance after local search
    pub distance_after: f64,
    pub transport_distance: f64,
    /// Wall-clock seconds
    pub time: f64,
    pub solved: bool,
    /// Failure message of an unsolved instance
    pub error: Option<String>,
}

/// Aggregates over the solved instances of a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStatistics {
    pub num_instances: usize,
    pub num_solved: usize,
    pub avg_zones: f64,
    pub avg_collection_vehicles: f64,
    pub avg_transport_vehicles: f64,
    pub avg_distance_before: f64,
    pub avg_distance_after: f64,
    /// Mean relative distance saved by local search, in percent
    pub avg_improvement: f64,
    pub avg_time: f64,
    pub total_time: f64,
}

/// Benchmark configuration
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    pub solver: SolverConfig,
    /// Show a progress bar while solving
    pub show_progress: bool,
    /// Check every solution before recording it
    pub validate: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfig {
            solver: SolverConfig::default(),
            show_progress: true,
            validate: true,
        }
    }
}

/// Benchmarking engine
pub struct Benchmark {
    config: BenchmarkConfig,
    results: Vec<InstanceResult>,
    trials: Vec<TrialMetrics>,
}

impl Benchmark {
    pub fn new(config: BenchmarkConfig) -> Self {
        Benchmark {
            config,
            results: Vec::new(),
            trials: Vec::new(),
        }
    }

    /// Solve one instance and record the outcome; failures become unsolved rows
    pub fn run_instance(&mut self, instance: &ProblemInstance) -> Option<Solution> {
        let outcome = solver::solve(instance, &self.config.solver).and_then(|solution| {
            if self.config.validate {
                solution.validate(instance)?;
            }
            Ok(solution)
        });

        match outcome {
            Ok(mut solution) => {
                self.record_result(instance, &solution);
                self.trials.append(&mut solution.trials);
                Some(solution)
            }
            Err(e) => {
                log::error!("{} failed: {}", instance.name, e);
                self.results.push(InstanceResult {
                    instance: instance.name.clone(),
                    algorithm: self.config.solver.algorithm.to_string(),
                    zones: instance.num_zones(),
                    collection_vehicles: 0,
                    transport_vehicles: 0,
                    distance_before: 0.0,
                    distance_after: 0.0,
                    transport_distance: 0.0,
                    time: 0.0,
                    solved: false,
                    error: Some(e.to_string()),
                });
                None
            }
        }
    }

    /// Run benchmark on multiple instances
    pub fn run_on_instances(&mut self, instances: &[ProblemInstance]) {
        let progress = if self.config.show_progress {
            let bar = ProgressBar::new(instances.len() as u64);
            if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}") {
                bar.set_style(style);
            }
            bar
        } else {
            ProgressBar::hidden()
        };

        for instance in instances {
            progress.set_message(instance.name.clone());
            self.run_instance(instance);
            progress.inc(1);
        }
        progress.finish_and_clear();
    }

    fn record_result(&mut self, instance: &ProblemInstance, solution: &Solution) {
        self.results.push(InstanceResult {
            instance: instance.name.clone(),
            algorithm: solution.algorithm.clone(),
            zones: instance.num_zones(),
            collection_vehicles: solution.collection_routes.len(),
            transport_vehicles: solution.transport_routes.len(),
            distance_before: solution.distance_before,
            distance_after: solution.distance_after,
            transport_distance: solution.transport_distance(instance),
            time: solution.computation_time,
            solved: true,
            error: None,
        });
    }

    /// Averages over solved instances
    pub fn compute_statistics(&self) -> BatchStatistics {
        let solved: Vec<&InstanceResult> = self.results.iter().filter(|r| r.solved).collect();
        let mean = |values: Vec<f64>| if values.is_empty() { 0.0 } else { values.iter().mean() };

        let times: Vec<f64> = solved.iter().map(|r| r.time).collect();
        let improvements = solved.iter()
            .filter(|r| r.distance_before > 0.0)
            .map(|r| (r.distance_before - r.distance_after) / r.distance_before * 100.0)
            .collect();

        BatchStatistics {
            num_instances: self.results.len(),
            num_solved: solved.len(),
            avg_zones: mean(solved.iter().map(|r| r.zones as f64).collect()),
            avg_collection_vehicles: mean(solved.iter().map(|r| r.collection_vehicles as f64).collect()),
            avg_transport_vehicles: mean(solved.iter().map(|r| r.transport_vehicles as f64).collect()),
            avg_distance_before: mean(solved.iter().map(|r| r.distance_before).collect()),
            avg_distance_after: mean(solved.iter().map(|r| r.distance_after).collect()),
            avg_improvement: mean(improvements),
            avg_time: mean(times.clone()),
            total_time: times.iter().sum(),
        }
    }

    /// Export one row per instance
    pub fn export_to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_writer(File::create(path)?);
        for result in &self.results {
            writer.serialize(result)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Export one row per GRASP trial
    pub fn export_trials_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_writer(File::create(path)?);
        for trial in &self.trials {
            writer.serialize(trial)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Generate summary report
    pub fn generate_report(&self) -> String {
        let mut report = String::new();
        let rule = "-".repeat(92);

        report.push_str("========================================\n");
        report.push_str("     Waste Collection Batch Report\n");
        report.push_str("========================================\n");
        report.push_str(&format!("Generated: {}\n", chrono::Local::now().format("%Y-%m-%d %H:%M:%S")));
        report.push_str(&format!("Algorithm: {}\n\n", self.config.solver.algorithm));

        report.push_str(&format!("{:<24} {:>7} {:>5} {:>5} {:>12} {:>12} {:>12} {:>9}\n",
            "Instance", "#Zones", "#CV", "#TV", "Dist before", "Dist after", "Transport", "CPU (s)"));
        report.push_str(&rule);
        report.push('\n');

        for r in &self.results {
            if r.solved {
                report.push_str(&format!("{:<24} {:>7} {:>5} {:>5} {:>12.2} {:>12.2} {:>12.2} {:>9.3}\n",
                    r.instance, r.zones, r.collection_vehicles, r.transport_vehicles,
                    r.distance_before, r.distance_after, r.transport_distance, r.time));
            } else {
                report.push_str(&format!("{:<24} {:>7}  FAILED: {}\n",
                    r.instance, r.zones, r.error.as_deref().unwrap_or("unknown")));
            }
        }
        report.push_str(&rule);
        report.push('\n');

        let stats = self.compute_statistics();
        report.push_str(&format!("Solved: {}/{}\n", stats.num_solved, stats.num_instances));
        report.push_str(&format!("Average collection vehicles: {:.2}\n", stats.avg_collection_vehicles));
        report.push_str(&format!("Average transport vehicles: {:.2}\n", stats.avg_transport_vehicles));
        report.push_str(&format!("Average distance: {:.2} -> {:.2} ({:.2}% saved)\n",
            stats.avg_distance_before, stats.avg_distance_after, stats.avg_improvement));
        report.push_str(&format!("Average CPU time: {:.3}s (total {:.3}s)\n", stats.avg_time, stats.total_time));

        report
    }

    pub fn results(&self) -> &[InstanceResult] {
        &self.results
    }

    pub fn trials(&self) -> &[TrialMetrics] {
        &self.trials
    }
}

/// Load every `.txt` instance of a directory, smallest first.
///
/// Files that fail to parse are logged and skipped.
pub fn load_instances_from_dir<P: AsRef<Path>>(dir: P) -> Result<Vec<ProblemInstance>> {
    let mut instances = Vec::new();

    for entry in std::fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if path.extension().map(|e| e == "txt").unwrap_or(false) {
            match ProblemInstance::from_file(&path) {
                Ok(instance) => instances.push(instance),
                Err(e) => log::warn!("skipping {}: {}", path.display(), e),
            }
        }
    }

    instances.sort_by(|a, b| a.num_zones().cmp(&b.num_zones()).then_with(|| a.name.cmp(&b.name)));
    Ok(instances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::tests::{ample_fleet, create_test_instance};
    use crate::instance::Zone;
    use crate::solver::Algorithm;

    fn greedy_benchmark() -> Benchmark {
        let config = BenchmarkConfig {
            solver: SolverConfig { algorithm: Algorithm::Greedy, ..Default::default() },
            show_progress: false,
            validate: true,
        };
        Benchmark::new(config)
    }

    #[test]
    fn test_failed_instance_is_recorded() {
        let zones = vec![
            Zone::depot(0.0, 0.0),
            Zone::transfer_station("IF", 10.0, 10.0),
            Zone::dumpsite(20.0, 20.0),
            Zone::collection("Big", 1.0, 0.0, 50.0, 0.0),
        ];
        let broken = ProblemInstance::new("broken", zones, ample_fleet(10.0)).unwrap();

        let mut benchmark = greedy_benchmark();
        benchmark.run_on_instances(&[create_test_instance(), broken]);

        let stats = benchmark.compute_statistics();
        assert_eq!(stats.num_instances, 2);
        assert_eq!(stats.num_solved, 1);
        assert_eq!(stats.avg_collection_vehicles, 1.0);
        assert!(!benchmark.results()[1].solved);
        assert!(benchmark.generate_report().contains("FAILED"));
    }

    #[test]
    fn test_grasp_trials_are_collected() {
        let mut config = SolverConfig { algorithm: Algorithm::Grasp, ..Default::default() }.with_parallel(false);
        config.grasp.k_values = vec![2];
        config.grasp.repetitions = 3;
        let mut benchmark = Benchmark::new(BenchmarkConfig { solver: config, show_progress: false, validate: true });

        benchmark.run_instance(&create_test_instance());
        assert_eq!(benchmark.trials().len(), 3);
    }

    #[test]
    fn test_load_skips_unparsable_files() {
        let dir = std::env::temp_dir().join(format!("waste-batch-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("bad.txt"), "not an instance").unwrap();
        std::fs::write(dir.join("notes.md"), "ignored").unwrap();

        let instances = load_instances_from_dir(&dir).unwrap();
        assert!(instances.is_empty());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
