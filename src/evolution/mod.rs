pub mod excess;
pub mod factory;
pub mod operators;
pub mod repair;

use crate::config::GaConfig;
use crate::evaluation::{EvaluationError, FitnessEvaluator};
use crate::export::ExportError;
use crate::selection::{SelectionError, Selector};
use chrono::{DateTime, Utc};
use factory::ChromosomeFactory;
use log::{debug, info, warn};
use operators::{MutationStrategy, VariationError, VariationOperators};
use rand::prelude::*;
use rand::rng;
use rayon::prelude::*;
use repair::{RepairError, RepairReport};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Relative tolerance used for every constraint and normalisation check
pub const TOLERANCE: f64 = 1e-6;

/// Values this close to zero are snapped to exactly zero
pub const ZERO_TOLERANCE: f64 = 1e-9;

/// Stream index reserved for the parent tournaments of a generation, pairs use the ones after it
const PARENT_STREAM: u64 = 0;

/// True if `value` is above `limit` by more than the tolerance, scaled by the limit.
pub(crate) fn exceeds(value: f64, limit: f64) -> bool {
    value > limit + TOLERANCE * limit.abs().max(1.0)
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Population size must be even and greater than 0, got {0}")]
    InvalidPopulationSize(usize),
    #[error("Repair failed: {0}")]
    Repair(#[from] RepairError),
    #[error("Variation failed: {0}")]
    Variation(#[from] VariationError),
    #[error("Evaluation failed: {0}")]
    Evaluation(#[from] EvaluationError),
    #[error("Selection failed: {0}")]
    Selection(#[from] SelectionError),
    #[error("Failed to record generation: {0}")]
    Export(#[from] ExportError),
}

/// Which operators produced a chromosome, read by the statistics only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub crossover: bool,
    /// The last strategy applied when the chromosome was mutated
    pub mutation: Option<MutationStrategy>,
}

/// A candidate allocation: one rate per path, indexed by global path id.
#[derive(Debug, Clone, PartialEq)]
pub struct Chromosome {
    pub genes: Vec<f64>,
    pub provenance: Provenance,
}

impl Chromosome {
    pub fn new(genes: Vec<f64>) -> Self {
        Self {
            genes,
            provenance: Provenance::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }
}

/// A chromosome and, once evaluated, its normalised fitness vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Individual {
    pub chromosome: Chromosome,
    /// One value per objective, `None` until evaluated
    pub fitness: Option<Vec<f64>>,
}

impl Individual {
    pub fn new(chromosome: Chromosome) -> Self {
        Self {
            chromosome,
            fitness: None,
        }
    }
}

/// Mutation counts of a single strategy within a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyStats {
    pub strategy: MutationStrategy,
    pub carried_out: usize,
    /// Offspring last mutated with this strategy that made it through selection
    pub survived: usize,
}

/// Operator bookkeeping for one generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub generation: usize,
    /// Pairs that were crossed over
    pub crossovers: usize,
    pub mutations: usize,
    pub crossover_repairs: RepairReport,
    pub mutation_repairs: RepairReport,
    pub strategies: Vec<StrategyStats>,
    /// Tagged offspring that made it through selection
    pub offspring_survived: usize,
    /// Wall-clock time spent on the generation, initialisation included for generation 0
    pub duration_ms: u64,
}

impl GenerationStats {
    pub fn new(generation: usize, strategies: &[MutationStrategy]) -> Self {
        Self {
            generation,
            crossovers: 0,
            mutations: 0,
            crossover_repairs: RepairReport::default(),
            mutation_repairs: RepairReport::default(),
            strategies: strategies
                .iter()
                .map(|&strategy| StrategyStats {
                    strategy,
                    carried_out: 0,
                    survived: 0,
                })
                .collect(),
            offspring_survived: 0,
            duration_ms: 0,
        }
    }

    fn strategy_mut(&mut self, strategy: MutationStrategy) -> Option<&mut StrategyStats> {
        self.strategies.iter_mut().find(|s| s.strategy == strategy)
    }

    fn record_offspring(&mut self, outcome: &PairOutcome) {
        if let Some(report) = outcome.crossover {
            self.crossovers += 1;
            self.crossover_repairs += report;
        }
        self.mutation_repairs += outcome.mutation_repairs;
        for child in &outcome.children {
            if let Some(strategy) = child.provenance.mutation {
                self.mutations += 1;
                if let Some(stats) = self.strategy_mut(strategy) {
                    stats.carried_out += 1;
                }
            }
        }
    }

    fn record_survivors(&mut self, survivors: &[Individual]) {
        for individual in survivors {
            let provenance = individual.chromosome.provenance;
            if provenance.crossover || provenance.mutation.is_some() {
                self.offspring_survived += 1;
            }
            if let Some(strategy) = provenance.mutation {
                if let Some(stats) = self.strategy_mut(strategy) {
                    stats.survived += 1;
                }
            }
        }
    }
}

/// Receives every generation as it completes.
pub trait GenerationRecorder {
    fn record(
        &mut self,
        population: &[Individual],
        stats: &GenerationStats,
    ) -> Result<(), ExportError>;

    /// Called once with the final population after the last generation.
    fn finish(&mut self, population: &[Individual]) -> Result<(), ExportError>;
}

/// Result of varying one pair of parents
#[derive(Debug)]
struct PairOutcome {
    children: [Chromosome; 2],
    crossover: Option<RepairReport>,
    mutation_repairs: RepairReport,
}

/// Drives the generations: initial population, then variation, evaluation and selection.
///
/// Every random draw comes from a `StdRng` seeded from the master seed, the generation and
/// the index of the unit of work, so a run replays exactly under the same seed regardless of
/// how rayon schedules the work.
pub struct EvolutionEngine<'a> {
    /// This is a reference to the user-defined config for a given evolution run
    config: &'a GaConfig,
    /// This is the factory creating the initial population
    factory: ChromosomeFactory<'a>,
    /// This is the crossover and mutation toolbox used on every pair of parents
    operators: VariationOperators<'a>,
    /// This is the evaluator turning genes into normalised fitness vectors
    evaluator: &'a FitnessEvaluator<'a>,
    /// This is the environmental selection, its internals are opaque to the engine
    selector: &'a dyn Selector,
    /// This is an owned-vector of the population at any given moment, it is updated after every
    /// generation
    population: Vec<Individual>,
    seed: u64,
}

impl<'a> EvolutionEngine<'a> {
    /// Creates a new EvolutionEngine instance
    ///
    /// # Arguments
    /// * `config` - Reference to a `GaConfig` struct containing all the parameters required for the evolution.
    /// * `factory` - Builds the initial chromosomes
    /// * `operators` - Crossover and mutation, configured with the mutation strategy table
    /// * `evaluator` - Scores chromosomes against the objectives
    /// * `selector` - Trims a scored population down to the population size
    ///
    /// # Returns
    /// * `Result<Self, EngineError>` - The engine, or `InvalidPopulationSize` if the population
    ///   size is zero or odd
    pub fn new(
        config: &'a GaConfig,
        factory: ChromosomeFactory<'a>,
        operators: VariationOperators<'a>,
        evaluator: &'a FitnessEvaluator<'a>,
        selector: &'a dyn Selector,
    ) -> Result<Self, EngineError> {
        if config.population_size == 0 || config.population_size % 2 != 0 {
            return Err(EngineError::InvalidPopulationSize(config.population_size));
        }
        let seed = config.seed.unwrap_or_else(|| rng().random());
        info!("Master seed: {}", seed);
        Ok(Self {
            config,
            factory,
            operators,
            evaluator,
            selector,
            population: Vec::with_capacity(config.population_size * 2),
            seed,
        })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn population(&self) -> &[Individual] {
        &self.population
    }

    /// Runs the evolution process
    ///
    /// Generation 0 is the selected initial population. Each following generation draws
    /// `population_size` parents by binary tournament and pairs them up in draw order, crosses
    /// each pair over with probability `crossover_rate`, then mutates each child with
    /// probability `mutation_rate`. Offspring are evaluated and selection keeps
    /// `population_size` individuals out of parents and offspring together.
    ///
    /// # Arguments
    /// * `recorder` - Receives every generation and the final population
    ///
    /// # Returns
    /// * `Result<Vec<Individual>, EngineError>` - The final population
    pub fn evolve(
        &mut self,
        recorder: &mut dyn GenerationRecorder,
    ) -> Result<Vec<Individual>, EngineError> {
        let strategies = self.operators.table().strategies().to_vec();

        info!(
            "Initializing population of size {}...",
            self.config.population_size
        );
        let started = Utc::now();
        self.initialize_population()?;
        self.evaluate_population()?;
        self.select_survivors()?;
        let mut stats = GenerationStats::new(0, &strategies);
        stats.duration_ms = elapsed_ms(started);
        self.log_generation(&stats);
        recorder.record(&self.population, &stats)?;

        for generation in 1..=self.config.num_generations {
            debug!(
                "--- Starting Generation {}/{} ---",
                generation, self.config.num_generations
            );
            let started = Utc::now();
            let mut stats = GenerationStats::new(generation, &strategies);

            let offspring = self.produce_offspring(generation, &mut stats)?;
            self.population.extend(offspring.into_iter().map(Individual::new));
            self.evaluate_population()?;
            self.select_survivors()?;

            stats.record_survivors(&self.population);
            for individual in &mut self.population {
                individual.chromosome.provenance = Provenance::default();
            }
            stats.duration_ms = elapsed_ms(started);

            self.log_generation(&stats);
            recorder.record(&self.population, &stats)?;
        }

        let idle = self.unallocated_flows();
        if !idle.is_empty() {
            warn!(
                "Flows {:?} carry no rate in any individual of the final population",
                idle
            );
        }

        recorder.finish(&self.population)?;
        info!("Evolution complete.");
        Ok(self.population.clone())
    }

    /// Fills the population with `population_size` freshly generated chromosomes.
    ///
    /// Generation runs in parallel, chromosome `i` drawing from stream `(seed, 0, i)`.
    pub fn initialize_population(&mut self) -> Result<(), EngineError> {
        let factory = &self.factory;
        let seed = self.seed;
        let chromosomes = (0..self.config.population_size)
            .into_par_iter()
            .map(|i| {
                let mut rng = stream_rng(seed, 0, i as u64);
                factory.generate(&mut rng).map(|(chromosome, _)| chromosome)
            })
            .collect::<Result<Vec<_>, RepairError>>()?;

        self.population = chromosomes.into_iter().map(Individual::new).collect();
        Ok(())
    }

    /// Evaluates every individual that has no fitness yet.
    ///
    /// Evaluation runs in parallel and the results are applied sequentially afterwards.
    pub fn evaluate_population(&mut self) -> Result<usize, EngineError> {
        let evaluator = self.evaluator;
        let results: Vec<(usize, Result<Vec<f64>, EvaluationError>)> = self
            .population
            .par_iter()
            .enumerate()
            .filter(|(_, ind)| ind.fitness.is_none())
            .map(|(i, ind)| (i, evaluator.evaluate(&ind.chromosome.genes)))
            .collect();

        let evaluated = results.len();
        for (i, fitness) in results {
            self.population[i].fitness = Some(fitness?);
        }
        Ok(evaluated)
    }

    fn select_survivors(&mut self) -> Result<(), EngineError> {
        let population = std::mem::take(&mut self.population);
        self.population = self
            .selector
            .select(population, self.config.population_size)?;
        Ok(())
    }

    /// Draws parents by tournament, pairs them up and varies each pair on its own stream.
    fn produce_offspring(
        &self,
        generation: usize,
        stats: &mut GenerationStats,
    ) -> Result<Vec<Chromosome>, EngineError> {
        let seed = self.seed;
        let generation_stream = generation as u64;
        let mut rng = stream_rng(seed, generation_stream, PARENT_STREAM);
        let parents: Vec<Chromosome> = self
            .selector
            .select_parents(&self.population, self.config.population_size, &mut rng)?
            .into_iter()
            .map(|i| self.population[i].chromosome.clone())
            .collect();

        let mut pairs = Vec::with_capacity(parents.len() / 2);
        let mut parents = parents.into_iter();
        while let (Some(first), Some(second)) = (parents.next(), parents.next()) {
            pairs.push((first, second));
        }

        let operators = &self.operators;
        let crossover_rate = self.config.crossover_rate;
        let mutation_rate = self.config.mutation_rate;
        let outcomes = pairs
            .into_par_iter()
            .enumerate()
            .map(|(i, (first, second))| {
                let mut rng = stream_rng(seed, generation_stream, PARENT_STREAM + 1 + i as u64);
                vary_pair(
                    operators,
                    crossover_rate,
                    mutation_rate,
                    first,
                    second,
                    &mut rng,
                )
            })
            .collect::<Result<Vec<_>, VariationError>>()?;

        let mut offspring = Vec::with_capacity(outcomes.len() * 2);
        for outcome in outcomes {
            stats.record_offspring(&outcome);
            offspring.extend(outcome.children);
        }
        Ok(offspring)
    }

    /// Ids of the flows that no individual allocates any rate to.
    pub fn unallocated_flows(&self) -> Vec<usize> {
        self.evaluator
            .topology()
            .flows()
            .filter(|flow| {
                self.population
                    .iter()
                    .all(|ind| flow.allocated_rate(&ind.chromosome.genes) <= 0.0)
            })
            .map(|flow| flow.id)
            .collect()
    }

    fn log_generation(&self, stats: &GenerationStats) {
        let num_objectives = self.evaluator.objectives().len();
        let mut means = vec![0.0; num_objectives];
        for fitness in self.population.iter().filter_map(|i| i.fitness.as_ref()) {
            for (mean, value) in means.iter_mut().zip(fitness) {
                *mean += value;
            }
        }
        let count = self.population.len().max(1) as f64;
        let summary: Vec<String> = self
            .evaluator
            .objectives()
            .iter()
            .zip(&means)
            .map(|(objective, sum)| format!("{}={:.4}", objective.name, sum / count))
            .collect();

        info!(
            "Gen {}: Mean {} | Crossovers={} | Mutations={} | Link Repairs={} | Offspring Survived={} | {}ms",
            stats.generation,
            summary.join(" "),
            stats.crossovers,
            stats.mutations,
            stats.crossover_repairs.links_repaired + stats.mutation_repairs.links_repaired,
            stats.offspring_survived,
            stats.duration_ms
        );
    }
}

/// Crossover with probability `crossover_rate`, then each child mutated with probability
/// `mutation_rate`, then small genes snapped to zero.
fn vary_pair<R: Rng + ?Sized>(
    operators: &VariationOperators<'_>,
    crossover_rate: f64,
    mutation_rate: f64,
    mut first: Chromosome,
    mut second: Chromosome,
    rng: &mut R,
) -> Result<PairOutcome, VariationError> {
    let crossover = if rng.random::<f64>() < crossover_rate {
        Some(operators.crossover(&mut first, &mut second, rng)?)
    } else {
        None
    };

    let mut mutation_repairs = RepairReport::default();
    for child in [&mut first, &mut second] {
        if rng.random::<f64>() < mutation_rate {
            mutation_repairs += operators.mutate(child, rng)?;
        }
        round_small_genes(&mut child.genes)?;
    }

    Ok(PairOutcome {
        children: [first, second],
        crossover,
        mutation_repairs,
    })
}

/// Snaps genes within `ZERO_TOLERANCE` of zero to exactly zero.
///
/// # Returns
/// * `Result<usize, RepairError>` - The number of genes snapped, or `NegativeGene` for the first
///   gene found below zero beyond tolerance
pub fn round_small_genes(genes: &mut [f64]) -> Result<usize, RepairError> {
    let mut rounded = 0;
    for (path, gene) in genes.iter_mut().enumerate() {
        if *gene != 0.0 && gene.abs() <= ZERO_TOLERANCE {
            *gene = 0.0;
            rounded += 1;
        } else if *gene < 0.0 {
            return Err(RepairError::NegativeGene { path, value: *gene });
        }
    }
    Ok(rounded)
}

fn elapsed_ms(since: DateTime<Utc>) -> u64 {
    (Utc::now() - since).num_milliseconds().max(0) as u64
}

fn splitmix64(state: u64) -> u64 {
    let z = state.wrapping_add(0x9e3779b97f4a7c15);
    let z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    let z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

/// Derives the seed of one unit of work from the master seed.
pub fn stream_seed(master: u64, generation: u64, index: u64) -> u64 {
    splitmix64(splitmix64(splitmix64(master) ^ generation) ^ index)
}

pub fn stream_rng(master: u64, generation: u64, index: u64) -> StdRng {
    StdRng::seed_from_u64(stream_seed(master, generation, index))
}
