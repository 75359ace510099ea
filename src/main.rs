use rate_allocator::config::Config;
use rate_allocator::evaluation::{EvaluationError, FitnessEvaluator, Objective};
use rate_allocator::evolution::EvolutionEngine;
use rate_allocator::evolution::factory::ChromosomeFactory;
use rate_allocator::evolution::operators::{MutationTable, VariationOperators};
use rate_allocator::export::{ResultsRecorder, RunExport};
use rate_allocator::selection::Nsga2Selector;
use rate_allocator::topology::loader::load_topology;
use std::path::Path;
use std::process;

fn build_objectives(config: &Config) -> Result<Vec<Objective>, EvaluationError> {
    config.objectives.iter().map(Objective::from_config).collect()
}

fn main() {
    env_logger::init();
    log::info!("Booting rate allocator...");

    // 1. Load and Validate Configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = match Config::load(Path::new(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        log::error!("Invalid configuration: {}", e);
        process::exit(1);
    }
    log::info!("Configuration '{}' loaded and validated.", config_path);

    // 2. Load Topology
    let topology = match load_topology(Path::new(&config.topology_file), config.repair.ack_overhead)
    {
        Ok(t) => t,
        Err(e) => {
            log::error!("Failed to load topology: {}", e);
            process::exit(1);
        }
    };

    // 3. Build Objectives, Operators and Selector
    let evaluator = match build_objectives(&config)
        .and_then(|objectives| FitnessEvaluator::new(&topology, objectives))
    {
        Ok(e) => e,
        Err(e) => {
            log::error!("Failed to set up objectives: {}", e);
            process::exit(1);
        }
    };
    let operators = match MutationTable::from_config(&config.mutation).and_then(|table| {
        VariationOperators::new(&topology, table, config.ga.mutation_fraction)
    }) {
        Ok(o) => o,
        Err(e) => {
            log::error!("Failed to set up variation operators: {}", e);
            process::exit(1);
        }
    };
    let selector = Nsga2Selector::new(evaluator.weights());

    // 4. Run the Evolution
    log::info!("--- Starting Evolution ---");
    let mut engine = match EvolutionEngine::new(
        &config.ga,
        ChromosomeFactory::new(&topology),
        operators,
        &evaluator,
        &selector,
    ) {
        Ok(engine) => engine,
        Err(e) => {
            log::error!("Failed to start evolution: {}", e);
            process::exit(1);
        }
    };
    let mut recorder = ResultsRecorder::new(
        RunExport::new(&config, engine.seed(), &evaluator),
        &config.output_file,
    );
    let population = match engine.evolve(&mut recorder) {
        Ok(population) => population,
        Err(e) => {
            log::error!("Evolution failed: {}", e);
            process::exit(1);
        }
    };

    // 5. Summary
    log::info!("--- Evolution Complete ---");
    println!("Seed: {}", engine.seed());
    println!("Results: {}", config.output_file);
    let names: Vec<&str> = evaluator
        .objectives()
        .iter()
        .map(|o| o.name.as_str())
        .collect();
    println!("Final population ({}):", names.join(", "));
    for (i, individual) in population.iter().enumerate() {
        let fitness: Vec<String> = individual
            .fitness
            .iter()
            .flatten()
            .map(|v| format!("{:.4}", v))
            .collect();
        let paths_used = individual
            .chromosome
            .genes
            .iter()
            .filter(|&&g| g > 0.0)
            .count();
        println!(
            "  [{:>3}] {} | paths used: {}",
            i,
            fitness.join(" "),
            paths_used
        );
    }
}
