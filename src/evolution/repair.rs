//! Restores the two hard constraints on a chromosome: no flow receives more than it
//! requested and no link carries more than its capacity.

use super::excess::{ExcessError, remove_excess};
use super::{ZERO_TOLERANCE, exceeds};
use crate::topology::{FlowId, LinkId, PathId, Topology};
use log::debug;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepairError {
    #[error("Excess removal failed: {0}")]
    Excess(#[from] ExcessError),
    #[error("Link repair did not converge within {limit} passes")]
    IterationLimit { limit: usize },
    #[error("Flow {flow} still over its requested rate after repair: {allocated} > {requested}")]
    FlowViolation {
        flow: FlowId,
        allocated: f64,
        requested: f64,
    },
    #[error("Link {link} still over capacity after repair: {usage} > {capacity}")]
    LinkViolation {
        link: LinkId,
        usage: f64,
        capacity: f64,
    },
    #[error("Negative rate {value} found on path {path}")]
    NegativeGene { path: PathId, value: f64 },
}

/// Number of constraint violations fixed by a repair call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    pub flows_repaired: usize,
    pub links_repaired: usize,
}

impl RepairReport {
    pub fn is_empty(&self) -> bool {
        self.flows_repaired == 0 && self.links_repaired == 0
    }
}

impl AddAssign for RepairReport {
    fn add_assign(&mut self, other: Self) {
        self.flows_repaired += other.flows_repaired;
        self.links_repaired += other.links_repaired;
    }
}

/// Fixes flow-rate and link-capacity violations in place using `remove_excess`.
#[derive(Debug, Clone, Copy)]
pub struct RepairEngine<'a> {
    topology: &'a Topology,
    /// Most link repairs one `repair_link_capacity` call may carry out, `links x paths` by default
    pass_limit: usize,
}

impl<'a> RepairEngine<'a> {
    pub fn new(topology: &'a Topology) -> Self {
        Self {
            topology,
            pass_limit: (topology.link_count() * topology.path_count()).max(1),
        }
    }

    pub fn with_pass_limit(mut self, pass_limit: usize) -> Self {
        self.pass_limit = pass_limit;
        self
    }

    pub fn pass_limit(&self) -> usize {
        self.pass_limit
    }

    /// Runs flow-rate repair followed by link-capacity repair, then checks the result.
    ///
    /// Flows are fixed first, an over-allocated flow would otherwise push extra and
    /// avoidable work onto the link repair.
    ///
    /// # Arguments
    /// * `genes` - The chromosome to repair in place
    /// * `rng` - Random source forwarded to `remove_excess`
    ///
    /// # Returns
    /// * `Result<RepairReport, RepairError>` - How many flows and links had to be fixed
    pub fn repair<R: Rng + ?Sized>(
        &self,
        genes: &mut [f64],
        rng: &mut R,
    ) -> Result<RepairReport, RepairError> {
        let flows_repaired = self.repair_flow_rate(genes, rng)?;
        let links_repaired = self.repair_link_capacity(genes, rng)?;
        self.verify(genes)?;
        Ok(RepairReport {
            flows_repaired,
            links_repaired,
        })
    }

    /// Brings every flow's allocated rate down to its requested rate.
    ///
    /// # Returns
    /// * `Result<usize, RepairError>` - The number of flows that were over-allocated
    pub fn repair_flow_rate<R: Rng + ?Sized>(
        &self,
        genes: &mut [f64],
        rng: &mut R,
    ) -> Result<usize, RepairError> {
        let mut repaired = 0;
        for flow in self.topology.flows() {
            let path_ids: Vec<PathId> = flow.path_ids().collect();
            let per_path: Vec<f64> = path_ids.iter().map(|&p| genes[p]).collect();
            let excess = per_path.iter().sum::<f64>() - flow.requested_rate;
            if excess <= 0.0 {
                continue;
            }

            debug!(
                "Flow {} over its requested rate {} by {:.6}",
                flow.id, flow.requested_rate, excess
            );
            let reduced = remove_excess(&per_path, excess, rng)?;
            for (&p, value) in path_ids.iter().zip(reduced) {
                genes[p] = value;
            }
            repaired += 1;
        }
        Ok(repaired)
    }

    /// Repairs over-capacity links until a full scan finds none.
    ///
    /// Each pass recomputes link usage, scans the links in random order and fixes the first
    /// one found over capacity by removing the excess from the paths contributing to it. A
    /// path contributes its rate if it traverses the link and a fraction of it if its ACKs
    /// cross the link, so the excess is removed on the contributions and then mapped back to
    /// rates. Repairing a link only lowers rates, so a repaired link never becomes violated
    /// again and the loop ends after at most one repair per link. The number of repairs is
    /// still capped by the pass limit, a violation left once it is reached is an error.
    ///
    /// # Returns
    /// * `Result<usize, RepairError>` - The number of link repairs carried out
    pub fn repair_link_capacity<R: Rng + ?Sized>(
        &self,
        genes: &mut [f64],
        rng: &mut R,
    ) -> Result<usize, RepairError> {
        let limit = self.pass_limit;
        let mut order: Vec<LinkId> = (0..self.topology.link_count()).collect();
        let mut repaired = 0;

        for pass in 0..=limit {
            let usage = self.topology.link_usage(genes);
            order.shuffle(rng);
            let violated = order
                .iter()
                .copied()
                .find(|&l| exceeds(usage[l], self.topology.capacity_of(l)));

            let Some(link) = violated else {
                return Ok(repaired);
            };
            if pass == limit {
                break;
            }

            let capacity = self.topology.capacity_of(link);
            let contributors = self.contributors(link, genes);
            let values: Vec<f64> = contributors.iter().map(|&(p, c)| genes[p] * c).collect();
            // Usage and the contributions are summed in a different order
            let excess = (usage[link] - capacity).min(values.iter().sum());

            debug!(
                "Link {} over capacity {} by {:.6}, reducing {} paths",
                link,
                capacity,
                excess,
                contributors.len()
            );
            let reduced = remove_excess(&values, excess, rng)?;
            for (&(p, coefficient), value) in contributors.iter().zip(reduced) {
                let gene = value / coefficient;
                genes[p] = if gene <= ZERO_TOLERANCE { 0.0 } else { gene };
            }
            repaired += 1;
        }

        Err(RepairError::IterationLimit { limit })
    }

    /// Checks that no gene is negative and that every flow and link is within its limit.
    pub fn verify(&self, genes: &[f64]) -> Result<(), RepairError> {
        if let Some((path, &value)) = genes.iter().enumerate().find(|(_, g)| **g < 0.0) {
            return Err(RepairError::NegativeGene { path, value });
        }

        for flow in self.topology.flows() {
            let allocated = flow.allocated_rate(genes);
            if exceeds(allocated, flow.requested_rate) {
                return Err(RepairError::FlowViolation {
                    flow: flow.id,
                    allocated,
                    requested: flow.requested_rate,
                });
            }
        }

        for (link, usage) in self.topology.link_usage(genes).into_iter().enumerate() {
            let capacity = self.topology.capacity_of(link);
            if exceeds(usage, capacity) {
                return Err(RepairError::LinkViolation {
                    link,
                    usage,
                    capacity,
                });
            }
        }

        Ok(())
    }

    /// Paths with a non-zero rate loading `link`, paired with their usage coefficient.
    fn contributors(&self, link: LinkId, genes: &[f64]) -> Vec<(PathId, f64)> {
        let mut paths: Vec<PathId> = self.topology.connectivity().paths_using(link).to_vec();
        for &p in self.topology.ack_paths_using(link) {
            if !paths.contains(&p) {
                paths.push(p);
            }
        }
        paths
            .into_iter()
            .filter(|&p| genes[p] > 0.0)
            .map(|p| (p, self.topology.path_coefficient(p, link)))
            .filter(|&(_, c)| c > 0.0)
            .collect()
    }
}
