//! Waste Routing Solver - Command Line Interface
//!
//! Solves two-echelon waste collection instances: collection vehicles empty
//! into transfer stations, transport vehicles carry the waste to the dumpsite.

use clap::{Parser, Subcommand, ValueEnum};
use waste_routing_solver::benchmark::{load_instances_from_dir, Benchmark, BenchmarkConfig};
use waste_routing_solver::heuristics::{ConstructionHeuristic, GreedyHeuristic};
use waste_routing_solver::instance::ProblemInstance;
use waste_routing_solver::solver::{self, SolverConfig};
use waste_routing_solver::visualization::Visualizer;

use std::path::{Path, PathBuf};
use std::process::exit;

#[derive(Parser)]
#[command(name = "waste-routing-solver")]
#[command(version = "1.0")]
#[command(about = "Two-echelon waste collection routing with transfer stations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a single instance
    Solve {
        #[arg(short, long)]
        instance: PathBuf,

        /// Algorithm to use (overrides the configuration file)
        #[arg(short, long, value_enum)]
        algorithm: Option<Algorithm>,

        #[command(flatten)]
        tuning: Tuning,

        /// Write the solution as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Render the routes and write their plot data next to the instance file
        #[arg(long)]
        visualize: bool,

        /// Print every route
        #[arg(short, long)]
        verbose: bool,
    },

    /// Solve every instance of a directory
    Batch {
        /// Directory containing instance files
        #[arg(short, long)]
        dir: PathBuf,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        #[arg(short, long, value_enum)]
        algorithm: Option<Algorithm>,

        #[command(flatten)]
        tuning: Tuning,

        /// Maximum number of collection zones
        #[arg(long)]
        max_size: Option<usize>,
    },

    /// Analyze an instance
    Analyze {
        #[arg(short, long)]
        instance: PathBuf,
    },
}

/// Solver parameters shared by `solve` and `batch`
#[derive(clap::Args)]
struct Tuning {
    /// JSON solver configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Largest candidate list size swept by RVND
    #[arg(long)]
    k_max: Option<usize>,

    /// GRASP repetitions (RVND sweeps 1..=repetitions)
    #[arg(short, long)]
    repetitions: Option<usize>,

    #[arg(short, long)]
    seed: Option<u64>,

    /// Run trials on a single thread
    #[arg(long)]
    sequential: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum Algorithm {
    /// Nearest feasible zone, no local search
    Greedy,
    /// Randomized construction + local search
    Grasp,
    /// GRASP swept over candidate list sizes and repetitions
    Rvnd,
}

impl From<Algorithm> for solver::Algorithm {
    fn from(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Greedy => solver::Algorithm::Greedy,
            Algorithm::Grasp => solver::Algorithm::Grasp,
            Algorithm::Rvnd => solver::Algorithm::Rvnd,
        }
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Solve { instance, algorithm, tuning, output, visualize, verbose } => {
            let config = build_config(algorithm, &tuning);
            solve_instance(&instance, &config, output, visualize, verbose);
        }

        Commands::Batch { dir, output, algorithm, tuning, max_size } => {
            let config = build_config(algorithm, &tuning);
            run_batch(&dir, &output, config, max_size);
        }

        Commands::Analyze { instance } => {
            analyze_instance(&instance);
        }
    }
}

fn build_config(algorithm: Option<Algorithm>, tuning: &Tuning) -> SolverConfig {
    let mut config = match &tuning.config {
        Some(path) => SolverConfig::from_file(path).unwrap_or_else(|e| {
            eprintln!("Error loading configuration {:?}: {}", path, e);
            exit(1);
        }),
        None => SolverConfig::default(),
    };

    if let Some(algorithm) = algorithm {
        config.algorithm = algorithm.into();
    }
    if let Some(k_max) = tuning.k_max {
        config.rvnd.k_max = k_max;
    }
    if let Some(repetitions) = tuning.repetitions {
        config.grasp.repetitions = repetitions;
        config.rvnd.max_repetitions = repetitions;
    }
    if let Some(seed) = tuning.seed {
        config = config.with_seed(seed);
    }
    if tuning.sequential {
        config = config.with_parallel(false);
    }
    config
}

fn load_instance(path: &Path) -> ProblemInstance {
    ProblemInstance::from_file(path).unwrap_or_else(|e| {
        eprintln!("Error loading instance: {}", e);
        exit(1);
    })
}

fn solve_instance(path: &Path, config: &SolverConfig, output: Option<PathBuf>, visualize: bool, verbose: bool) {
    println!("Loading instance from {:?}...", path);
    let instance = load_instance(path);

    if verbose {
        println!("{}", instance.statistics());
    }

    println!("Solving with {}...", config.algorithm);
    let solution = match solver::solve(&instance, config) {
        Ok(solution) => solution,
        Err(e) => {
            eprintln!("Solver error: {}", e);
            exit(1);
        }
    };

    if let Err(e) = solution.validate(&instance) {
        log::error!("solution failed validation: {}", e);
    }

    println!("\n========== Results ==========");
    println!("Instance: {} ({} zones)", instance.name, instance.num_zones());
    print!("{}", solution);
    println!("  Transport distance: {:.2}", solution.transport_distance(&instance));
    if !solution.trials.is_empty() {
        println!("  Trials: {}", solution.trials.len());
    }

    if verbose {
        println!("\nCollection routes:");
        for (i, route) in solution.collection_routes.iter().enumerate() {
            println!("  {:>3}: {} ({:.1} min)", i + 1, route.labels(&instance).join(" -> "), route.elapsed);
        }
        println!("Transport routes:");
        for (i, route) in solution.transport_routes.iter().enumerate() {
            let carried: f64 = route.tasks.iter().map(|t| t.amount).sum();
            println!("  {:>3}: {} ({:.1} carried)", i + 1, route.labels(&instance).join(" -> "), carried);
        }
    }

    if let Some(out_path) = output {
        let written = serde_json::to_string_pretty(&solution)
            .map_err(|e| e.to_string())
            .and_then(|json| std::fs::write(&out_path, json).map_err(|e| e.to_string()));
        match written {
            Ok(()) => println!("\nSolution saved to {:?}", out_path),
            Err(e) => eprintln!("Failed to write solution: {}", e),
        }
    }

    if visualize {
        let viz = Visualizer::new();
        let svg = viz.generate_svg(&instance, &solution);
        let png_path = path.with_extension("png");
        match viz.save_png(&svg, &png_path) {
            Ok(()) => println!("Visualization saved to {:?}", png_path),
            Err(e) => {
                let svg_path = path.with_extension("svg");
                match viz.save_svg(&svg, &svg_path) {
                    Ok(()) => println!("PNG conversion failed ({}). Saved SVG to {:?}", e, svg_path),
                    Err(e) => eprintln!("Failed to save SVG: {}", e),
                }
            }
        }

        let data_path = path.with_extension("routes.txt");
        match std::fs::write(&data_path, viz.export_plot_data(&instance, &solution)) {
            Ok(()) => println!("Plot data saved to {:?}", data_path),
            Err(e) => eprintln!("Failed to save plot data: {}", e),
        }
    }
}

fn run_batch(dir: &Path, output: &Path, solver: SolverConfig, max_size: Option<usize>) {
    println!("Loading instances from {:?}...", dir);

    let mut instances = load_instances_from_dir(dir).unwrap_or_else(|e| {
        eprintln!("Error reading {:?}: {}", dir, e);
        exit(1);
    });
    if let Some(max) = max_size {
        instances.retain(|i| i.num_zones() <= max);
    }

    println!("Found {} instances", instances.len());
    if instances.is_empty() {
        eprintln!("No instances found!");
        return;
    }

    if let Err(e) = std::fs::create_dir_all(output) {
        eprintln!("Failed to create output directory: {}", e);
        exit(1);
    }

    let mut benchmark = Benchmark::new(BenchmarkConfig { solver, ..Default::default() });
    benchmark.run_on_instances(&instances);

    let results_path = output.join("results.csv");
    match benchmark.export_to_csv(&results_path) {
        Ok(()) => println!("Results exported to {:?}", results_path),
        Err(e) => eprintln!("Failed to export results: {}", e),
    }

    let trials_path = output.join("trials.csv");
    match benchmark.export_trials_csv(&trials_path) {
        Ok(()) => println!("Trials exported to {:?}", trials_path),
        Err(e) => eprintln!("Failed to export trials: {}", e),
    }

    let report = benchmark.generate_report();
    println!("\n{}", report);

    let report_path = output.join("report.txt");
    match std::fs::write(&report_path, &report) {
        Ok(()) => println!("Report saved to {:?}", report_path),
        Err(e) => eprintln!("Failed to save report: {}", e),
    }
}

fn analyze_instance(path: &Path) {
    let instance = load_instance(path);

    println!("========== Instance Analysis ==========\n");
    println!("{}", instance.statistics());

    let fleet = &instance.fleet;
    let demands: Vec<f64> = instance.collection_zones().iter().map(|&z| instance.zones[z].demand).collect();
    if !demands.is_empty() {
        let avg = demands.iter().sum::<f64>() / demands.len() as f64;
        let max = demands.iter().cloned().fold(0.0, f64::max);
        println!("\nDemand Statistics:");
        println!("  Average: {:.2}", avg);
        println!("  Max: {:.2}", max);
        println!("  Capacity utilization ratio: {:.2}%", avg / fleet.collection_capacity * 100.0);
        println!("  Lower bound on collection trips: {}",
            (instance.total_demand() / fleet.collection_capacity).ceil());
    }

    let overloaded: Vec<&str> = instance.collection_zones().iter()
        .map(|&z| &instance.zones[z])
        .filter(|z| z.demand > fleet.collection_capacity)
        .map(|z| z.id.as_str())
        .collect();
    if !overloaded.is_empty() {
        println!("\nZones above collection capacity: {}", overloaded.join(", "));
    }

    match GreedyHeuristic::new().construct(&instance) {
        Ok(solution) => println!("\nGreedy estimate: {} collection + {} transport vehicles, distance {:.2}",
            solution.collection_routes.len(), solution.transport_routes.len(), solution.distance_after),
        Err(e) => println!("\nGreedy estimate: infeasible ({})", e),
    }
}
