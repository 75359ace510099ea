use crate::evaluation::metrics::Metric;
use crate::evolution::operators::MutationTable;
use crate::topology::DEFAULT_ACK_OVERHEAD;
use crate::topology::bounds::Bound;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileReadError(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// JSON topology description produced by the path precomputation step
    pub topology_file: String,
    /// Where the run results are written
    pub output_file: String,
    pub ga: GaConfig,
    #[serde(default)]
    pub repair: RepairConfig,
    pub objectives: Vec<ObjectiveConfig>,
    pub mutation: Vec<MutationConfig>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct GaConfig {
    /// Must be even, offspring are produced in pairs
    pub population_size: usize,
    pub num_generations: usize,
    /// Probability that a pair of parents is crossed over
    pub crossover_rate: f64,
    /// Probability that a child is mutated
    pub mutation_rate: f64,
    /// Share of the flows rerouted by a single mutation
    pub mutation_fraction: f64,
    /// Master seed, drawn at random and logged when absent
    #[serde(default)]
    pub seed: Option<u64>,
    /// Keep the genes of every generation in the results, not only the last one
    #[serde(default)]
    pub store_genes: bool,
    /// Write the results every this many generations
    #[serde(default)]
    pub save_frequency: Option<usize>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RepairConfig {
    /// Link usage added per unit of rate on a path whose ACKs cross the link
    #[serde(default = "default_ack_overhead")]
    pub ack_overhead: f64,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            ack_overhead: DEFAULT_ACK_OVERHEAD,
        }
    }
}

fn default_ack_overhead() -> f64 {
    DEFAULT_ACK_OVERHEAD
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ObjectiveConfig {
    pub name: String,
    /// +1 to maximise, -1 to minimise
    pub weight: i8,
    /// Identifier of a built-in metric
    pub metric: String,
    /// Identifier of a built-in bound
    pub bound: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct MutationConfig {
    pub strategy: String,
    pub probability: f64,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Checks every section, stopping at the first problem found.
    ///
    /// Metric, bound and strategy identifiers are resolved here so that a typo fails the run
    /// before any work is done.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ga.validate()?;

        if !(self.repair.ack_overhead.is_finite() && self.repair.ack_overhead >= 0.0) {
            return Err(invalid(format!(
                "ack_overhead must be finite and non-negative, got {}",
                self.repair.ack_overhead
            )));
        }

        if self.objectives.is_empty() {
            return Err(invalid("at least one objective is required"));
        }
        for objective in &self.objectives {
            if objective.weight != 1 && objective.weight != -1 {
                return Err(invalid(format!(
                    "objective '{}' has weight {}, expected 1 or -1",
                    objective.name, objective.weight
                )));
            }
            if objective.metric.parse::<Metric>().is_err() {
                return Err(invalid(format!(
                    "objective '{}' references unknown metric '{}'",
                    objective.name, objective.metric
                )));
            }
            if objective.bound.parse::<Bound>().is_err() {
                return Err(invalid(format!(
                    "objective '{}' references unknown bound '{}'",
                    objective.name, objective.bound
                )));
            }
        }

        MutationTable::from_config(&self.mutation).map_err(|e| invalid(e.to_string()))?;

        Ok(())
    }
}

impl GaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size == 0 || self.population_size % 2 != 0 {
            return Err(invalid(format!(
                "population_size must be even and greater than 0, got {}",
                self.population_size
            )));
        }
        for (name, value) in [
            ("crossover_rate", self.crossover_rate),
            ("mutation_rate", self.mutation_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(format!("{} must be in [0, 1], got {}", name, value)));
            }
        }
        if !(self.mutation_fraction > 0.0 && self.mutation_fraction <= 1.0) {
            return Err(invalid(format!(
                "mutation_fraction must be in (0, 1], got {}",
                self.mutation_fraction
            )));
        }
        if let Some(frequency) = self.save_frequency {
            if frequency == 0 || frequency > self.num_generations {
                return Err(invalid(format!(
                    "save_frequency must be in [1, {}], got {}",
                    self.num_generations, frequency
                )));
            }
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}
