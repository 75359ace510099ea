//! Upper bounds used to normalise each objective's metric into [0, 1].
//!
//! Bounds are pure functions of the flow set, they are computed once per run.

use super::Topology;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Absolute tolerance used when deciding that the remaining demand of a flow is exhausted
const DEMAND_TOLERANCE: f64 = 1e-9;

/// The built-in bound functions an objective can reference by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bound {
    /// Sum of all requested rates, rounded up
    TotalRequestedRate,
    /// Greedy costliest-path-first cost of routing every flow, rounded up
    WorstCaseCost,
    /// Total number of paths
    PathCount,
    /// Number of flows plus one, room for the fractional part of the flow-splits metric
    FlowSplits,
    /// Number of flows
    FlowCount,
    /// Sum over flows of half the spread between their costliest and cheapest path
    PathCostSpread,
    /// Largest path cost in the topology
    MaxPathCost,
}

impl Bound {
    pub const ALL: [Bound; 7] = [
        Bound::TotalRequestedRate,
        Bound::WorstCaseCost,
        Bound::PathCount,
        Bound::FlowSplits,
        Bound::FlowCount,
        Bound::PathCostSpread,
        Bound::MaxPathCost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Bound::TotalRequestedRate => "total_requested_rate",
            Bound::WorstCaseCost => "worst_case_cost",
            Bound::PathCount => "path_count",
            Bound::FlowSplits => "flow_splits",
            Bound::FlowCount => "flow_count",
            Bound::PathCostSpread => "path_cost_spread",
            Bound::MaxPathCost => "max_path_cost",
        }
    }

    /// Evaluates this bound against `topology`.
    pub fn compute(&self, topology: &Topology) -> f64 {
        match self {
            Bound::TotalRequestedRate => total_requested_rate(topology),
            Bound::WorstCaseCost => worst_case_cost(topology),
            Bound::PathCount => topology.path_count() as f64,
            Bound::FlowSplits => (topology.flow_count() + 1) as f64,
            Bound::FlowCount => topology.flow_count() as f64,
            Bound::PathCostSpread => path_cost_spread(topology),
            Bound::MaxPathCost => max_path_cost(topology),
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Bound {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Bound::ALL
            .into_iter()
            .find(|b| b.as_str() == s.trim())
            .ok_or_else(|| s.to_string())
    }
}

impl Topology {
    /// Computes each bound once, in the order given.
    pub fn objective_bounds(&self, bounds: &[Bound]) -> Vec<f64> {
        bounds.iter().map(|b| b.compute(self)).collect()
    }
}

fn total_requested_rate(topology: &Topology) -> f64 {
    topology
        .flows()
        .map(|f| f.requested_rate)
        .sum::<f64>()
        .ceil()
}

/// Every flow is poured into its costliest paths first, each path taking as much as its
/// narrowest link allows. Other flows are ignored, so the result can only overestimate.
///
/// Path costs are the sums of their link costs, as charged by the total cost metric, not
/// the declared path costs.
fn worst_case_cost(topology: &Topology) -> f64 {
    let mut total_cost = 0.0;

    for flow in topology.flows() {
        let mut remaining = flow.requested_rate;
        let mut paths: Vec<(f64, f64)> = flow
            .path_list()
            .into_iter()
            .map(|p| (topology.path_link_cost(p.id), topology.min_link_capacity(p)))
            .collect();
        paths.sort_by(|a, b| b.0.total_cmp(&a.0));

        for (cost, min_capacity) in paths {
            if remaining < min_capacity {
                total_cost += remaining * cost;
                break;
            }
            total_cost += min_capacity * cost;
            remaining -= min_capacity;
            if remaining.abs() < DEMAND_TOLERANCE {
                break;
            }
        }
    }

    total_cost.ceil()
}

/// The population standard deviation of values confined to [min, max] never exceeds
/// (max - min) / 2.
fn path_cost_spread(topology: &Topology) -> f64 {
    topology
        .flows()
        .map(|flow| {
            let max = flow
                .paths
                .values()
                .map(|p| p.cost)
                .fold(f64::NEG_INFINITY, f64::max);
            (max - flow.min_path_cost()) / 2.0
        })
        .sum()
}

fn max_path_cost(topology: &Topology) -> f64 {
    topology
        .flows()
        .flat_map(|f| f.paths.values())
        .map(|p| p.cost)
        .fold(0.0, f64::max)
}
