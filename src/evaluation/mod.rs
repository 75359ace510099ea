pub mod metrics;

use crate::config::ObjectiveConfig;
use crate::evolution::TOLERANCE;
use crate::topology::Topology;
use crate::topology::bounds::Bound;
use log::debug;
use metrics::Metric;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("No objectives configured")]
    NoObjectives,
    #[error("Objective '{objective}' references unknown metric '{name}'")]
    UnknownMetric { objective: String, name: String },
    #[error("Objective '{objective}' references unknown bound '{name}'")]
    UnknownBound { objective: String, name: String },
    #[error("Objective '{objective}' has weight {weight}, expected 1 or -1")]
    InvalidWeight { objective: String, weight: i8 },
    #[error(
        "Objective '{objective}' normalised outside [0, 1]: raw {raw}, bound {bound}. The bound function is wrong"
    )]
    OutOfRange {
        objective: String,
        raw: f64,
        bound: f64,
    },
}

/// Direction an objective is optimised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weight {
    Maximize,
    Minimize,
}

impl Weight {
    pub fn from_sign(sign: i8) -> Option<Self> {
        match sign {
            1 => Some(Weight::Maximize),
            -1 => Some(Weight::Minimize),
            _ => None,
        }
    }

    /// +1 for maximised objectives, -1 for minimised ones
    pub fn sign(&self) -> f64 {
        match self {
            Weight::Maximize => 1.0,
            Weight::Minimize => -1.0,
        }
    }
}

/// A named metric, the direction it is optimised in and the bound that normalises it.
#[derive(Debug, Clone, PartialEq)]
pub struct Objective {
    pub name: String,
    pub weight: Weight,
    pub metric: Metric,
    pub bound: Bound,
}

impl Objective {
    pub fn new(name: impl Into<String>, weight: Weight, metric: Metric, bound: Bound) -> Self {
        Self {
            name: name.into(),
            weight,
            metric,
            bound,
        }
    }

    /// Resolves the metric and bound identifiers of a configured objective, failing on the
    /// first one that does not exist.
    pub fn from_config(config: &ObjectiveConfig) -> Result<Self, EvaluationError> {
        let weight =
            Weight::from_sign(config.weight).ok_or_else(|| EvaluationError::InvalidWeight {
                objective: config.name.clone(),
                weight: config.weight,
            })?;
        let metric = config
            .metric
            .parse::<Metric>()
            .map_err(|name| EvaluationError::UnknownMetric {
                objective: config.name.clone(),
                name,
            })?;
        let bound = config
            .bound
            .parse::<Bound>()
            .map_err(|name| EvaluationError::UnknownBound {
                objective: config.name.clone(),
                name,
            })?;
        Ok(Self::new(config.name.clone(), weight, metric, bound))
    }
}

/// Scores chromosomes against an ordered list of objectives.
///
/// Bounds are computed once on construction and reused for every evaluation. Evaluation only
/// reads the topology, so one evaluator can be shared across threads.
#[derive(Debug, Clone)]
pub struct FitnessEvaluator<'a> {
    topology: &'a Topology,
    objectives: Vec<Objective>,
    bounds: Vec<f64>,
}

impl<'a> FitnessEvaluator<'a> {
    pub fn new(topology: &'a Topology, objectives: Vec<Objective>) -> Result<Self, EvaluationError> {
        if objectives.is_empty() {
            return Err(EvaluationError::NoObjectives);
        }
        let bound_functions: Vec<Bound> = objectives.iter().map(|o| o.bound).collect();
        let bounds = topology.objective_bounds(&bound_functions);
        for (objective, bound) in objectives.iter().zip(&bounds) {
            debug!("Objective '{}' bounded by {} = {}", objective.name, objective.bound, bound);
        }
        Ok(Self {
            topology,
            objectives,
            bounds,
        })
    }

    pub fn topology(&self) -> &'a Topology {
        self.topology
    }

    pub fn objectives(&self) -> &[Objective] {
        &self.objectives
    }

    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    pub fn weights(&self) -> Vec<Weight> {
        self.objectives.iter().map(|o| o.weight).collect()
    }

    /// Evaluates `genes` against every objective, in order.
    ///
    /// # Returns
    /// * `Result<Vec<f64>, EvaluationError>` - One normalised value in [0, 1] per objective
    ///
    /// # Errors
    /// `OutOfRange` if a value normalises outside [0, 1] beyond tolerance.
    pub fn evaluate(&self, genes: &[f64]) -> Result<Vec<f64>, EvaluationError> {
        self.objectives
            .iter()
            .zip(&self.bounds)
            .map(|(objective, &bound)| {
                let raw = objective.metric.compute(self.topology, genes);
                normalize(raw, bound).ok_or_else(|| EvaluationError::OutOfRange {
                    objective: objective.name.clone(),
                    raw,
                    bound,
                })
            })
            .collect()
    }
}

/// Divides `raw` by `bound`, snapping results within tolerance of 0 or 1 onto them.
///
/// Returns `None` when the value falls outside [0, 1] beyond tolerance.
pub fn normalize(raw: f64, bound: f64) -> Option<f64> {
    if raw.abs() <= TOLERANCE && bound.abs() <= TOLERANCE {
        return Some(0.0);
    }
    let normalized = raw / bound;
    if !normalized.is_finite() {
        return None;
    }
    if normalized.abs() <= TOLERANCE {
        Some(0.0)
    } else if normalized < 0.0 {
        None
    } else if (normalized - 1.0).abs() <= TOLERANCE {
        Some(1.0)
    } else if normalized > 1.0 {
        None
    } else {
        Some(normalized)
    }
}
