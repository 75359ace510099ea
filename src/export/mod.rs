//! Run results export.
//!
//! A run is written as one JSON document holding the configuration snapshot, the seed, the
//! objective bounds and every recorded generation, so a run can be inspected or replayed
//! without the config file that produced it.

use crate::config::Config;
use crate::evaluation::FitnessEvaluator;
use crate::evolution::{GenerationRecorder, GenerationStats, Individual};
use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SCHEMA_VERSION: &str = "1.0.0";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to write results: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize results: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Everything recorded about a single run.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunExport {
    /// Schema version for forward/backward compatibility
    pub schema_version: String,
    /// Unix timestamp when export was generated
    pub generated_at: u64,
    /// Unix timestamp in milliseconds when the run started
    pub started_at: u64,
    /// Unix timestamp in milliseconds when the run finished, absent while it is running
    #[serde(default)]
    pub finished_at: Option<u64>,
    /// Snapshot of the configuration the run was started with
    pub config: Config,
    /// Master seed, configured or drawn
    pub seed: u64,
    /// Objective names, in the order of the fitness vectors
    pub objectives: Vec<String>,
    /// Normalisation bound of each objective
    pub bounds: Vec<f64>,
    pub generations: Vec<GenerationRecord>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GenerationRecord {
    pub generation: usize,
    /// Wall-clock time the generation took
    pub duration_ms: u64,
    /// One fitness vector per individual
    pub fitness: Vec<Vec<f64>>,
    /// One gene vector per individual, kept when `store_genes` is set and for the last generation
    pub genes: Option<Vec<Vec<f64>>>,
    pub stats: GenerationStats,
}

impl RunExport {
    pub fn new(config: &Config, seed: u64, evaluator: &FitnessEvaluator) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at: Utc::now().timestamp() as u64,
            started_at: Utc::now().timestamp_millis() as u64,
            finished_at: None,
            config: config.clone(),
            seed,
            objectives: evaluator
                .objectives()
                .iter()
                .map(|o| o.name.clone())
                .collect(),
            bounds: evaluator.bounds().to_vec(),
            generations: Vec::new(),
        }
    }

    pub fn last_generation(&self) -> Option<&GenerationRecord> {
        self.generations.last()
    }
}

/// Writes the run export to a JSON file.
pub fn write_export_to_json(export: &RunExport, output_path: &Path) -> Result<(), ExportError> {
    let json = serde_json::to_string_pretty(export)?;
    std::fs::write(output_path, json)?;
    Ok(())
}

/// Reads a run export from a JSON file.
pub fn read_export_from_json(input_path: &Path) -> Result<RunExport, ExportError> {
    let content = std::fs::read_to_string(input_path)?;
    let export: RunExport = serde_json::from_str(&content)?;
    Ok(export)
}

/// Collects generations into a `RunExport` and flushes it to disk periodically.
pub struct ResultsRecorder {
    export: RunExport,
    output_path: PathBuf,
    store_genes: bool,
    save_frequency: Option<usize>,
}

impl ResultsRecorder {
    pub fn new(export: RunExport, output_path: impl Into<PathBuf>) -> Self {
        let store_genes = export.config.ga.store_genes;
        let save_frequency = export.config.ga.save_frequency;
        Self {
            export,
            output_path: output_path.into(),
            store_genes,
            save_frequency,
        }
    }

    pub fn export(&self) -> &RunExport {
        &self.export
    }

    pub fn into_export(self) -> RunExport {
        self.export
    }

    fn save(&mut self) -> Result<(), ExportError> {
        self.export.generated_at = Utc::now().timestamp() as u64;
        write_export_to_json(&self.export, &self.output_path)?;
        debug!(
            "Saved {} generations to {}",
            self.export.generations.len(),
            self.output_path.display()
        );
        Ok(())
    }
}

fn genes_of(population: &[Individual]) -> Vec<Vec<f64>> {
    population
        .iter()
        .map(|ind| ind.chromosome.genes.clone())
        .collect()
}

impl GenerationRecorder for ResultsRecorder {
    fn record(
        &mut self,
        population: &[Individual],
        stats: &GenerationStats,
    ) -> Result<(), ExportError> {
        let fitness = population
            .iter()
            .map(|ind| ind.fitness.clone().unwrap_or_default())
            .collect();
        self.export.generations.push(GenerationRecord {
            generation: stats.generation,
            duration_ms: stats.duration_ms,
            fitness,
            genes: self.store_genes.then(|| genes_of(population)),
            stats: stats.clone(),
        });

        match self.save_frequency {
            Some(frequency) if stats.generation > 0 && stats.generation % frequency == 0 => {
                self.save()
            }
            _ => Ok(()),
        }
    }

    fn finish(&mut self, population: &[Individual]) -> Result<(), ExportError> {
        if let Some(last) = self.export.generations.last_mut() {
            last.genes = Some(genes_of(population));
        }
        self.export.finished_at = Some(Utc::now().timestamp_millis() as u64);
        self.save()?;
        info!("Results written to {}", self.output_path.display());
        Ok(())
    }
}
