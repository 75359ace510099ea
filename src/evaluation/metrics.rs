//! The built-in metrics an objective can reference by name.
//!
//! Every metric is a pure function of the chromosome and the topology.

use crate::topology::{Flow, Topology};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Total allocated rate
    TotalFlow,
    /// Rate times link cost, summed over every link each path traverses
    TotalCost,
    /// Number of paths carrying any rate
    PathsUsed,
    /// Flows split over more than one path, plus the normalised total number of splits
    FlowSplits,
    /// How much of each flow's rate sits on its cheapest paths, summed over flows
    DelayDistribution,
    /// Population standard deviation of the used path costs, summed over flows
    PathStdDev,
    /// Costliest used path of each flow weighted by the flow's share of the total rate
    MaxDelay,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::TotalFlow,
        Metric::TotalCost,
        Metric::PathsUsed,
        Metric::FlowSplits,
        Metric::DelayDistribution,
        Metric::PathStdDev,
        Metric::MaxDelay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::TotalFlow => "total_flow",
            Metric::TotalCost => "total_cost",
            Metric::PathsUsed => "paths_used",
            Metric::FlowSplits => "flow_splits",
            Metric::DelayDistribution => "delay_distribution",
            Metric::PathStdDev => "path_std_dev",
            Metric::MaxDelay => "max_delay",
        }
    }

    /// Computes the raw, unnormalised value of this metric.
    pub fn compute(&self, topology: &Topology, genes: &[f64]) -> f64 {
        match self {
            Metric::TotalFlow => genes.iter().sum(),
            Metric::TotalCost => total_cost(topology, genes),
            Metric::PathsUsed => genes.iter().filter(|&&g| g > 0.0).count() as f64,
            Metric::FlowSplits => flow_splits(topology, genes),
            Metric::DelayDistribution => topology
                .flows()
                .map(|f| flow_delay_distribution(f, genes))
                .sum(),
            Metric::PathStdDev => topology
                .flows()
                .map(|f| used_path_cost_std_dev(f, genes))
                .sum(),
            Metric::MaxDelay => max_delay(topology, genes),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|m| m.as_str() == s.trim())
            .ok_or_else(|| s.to_string())
    }
}

fn total_cost(topology: &Topology, genes: &[f64]) -> f64 {
    genes
        .iter()
        .enumerate()
        .filter(|(_, g)| **g > 0.0)
        .map(|(p, g)| g * topology.path_link_cost(p))
        .sum()
}

/// The integer part counts flows using more than one path. The fractional part is the total
/// number of splits over one more than the most splits possible, so it stays below 1 and
/// never bumps the integer part.
fn flow_splits(topology: &Topology, genes: &[f64]) -> f64 {
    let mut max_splits = 0;
    let mut total_splits = 0;
    let mut split_flows = 0;

    for flow in topology.flows() {
        max_splits += flow.path_count() - 1;
        let used = flow.path_ids().filter(|&p| genes[p] > 0.0).count();
        if used > 1 {
            split_flows += 1;
        }
        total_splits += used.saturating_sub(1);
    }

    split_flows as f64 + total_splits as f64 / (max_splits + 1) as f64
}

/// Each used path weighs its rate by `1 / (cost - cheapest cost + 1)`, the weighted sum is
/// then divided by the flow's allocated rate. A flow sending everything on its cheapest path
/// scores 1.
fn flow_delay_distribution(flow: &Flow, genes: &[f64]) -> f64 {
    let allocated = flow.allocated_rate(genes);
    if allocated <= 0.0 {
        return 0.0;
    }
    let min_cost = flow.min_path_cost();
    let weighted: f64 = flow
        .paths
        .values()
        .filter(|p| genes[p.id] > 0.0)
        .map(|p| genes[p.id] / (p.cost - min_cost + 1.0))
        .sum();
    (weighted / allocated).min(1.0)
}

fn used_path_cost_std_dev(flow: &Flow, genes: &[f64]) -> f64 {
    let costs: Vec<f64> = flow
        .paths
        .values()
        .filter(|p| genes[p.id] > 0.0)
        .map(|p| p.cost)
        .collect();
    if costs.len() < 2 {
        return 0.0;
    }
    let n = costs.len() as f64;
    let mean = costs.iter().sum::<f64>() / n;
    let variance = costs.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

fn max_delay(topology: &Topology, genes: &[f64]) -> f64 {
    let total: f64 = genes.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    topology
        .flows()
        .filter_map(|flow| {
            let largest_cost = flow
                .paths
                .values()
                .filter(|p| genes[p.id] > 0.0)
                .map(|p| p.cost)
                .reduce(f64::max)?;
            Some(flow.allocated_rate(genes) / total * largest_cost)
        })
        .sum()
}
