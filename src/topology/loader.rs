//! JSON topology descriptions, as produced by the k-shortest-path precomputation step.

use super::{AckRoute, Flow, FlowMetadata, Link, Path, Topology, TopologyError};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path as FsPath;

/// Protocol tag of flows that only carry ACKs for another flow. Their traffic is accounted
/// for through ACK routes, so they never get genes of their own.
const ACK_PROTOCOL: &str = "A";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRecord {
    pub id: usize,
    pub cost: f64,
    pub capacity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathRecord {
    pub id: usize,
    pub cost: f64,
    pub links: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRecord {
    pub id: usize,
    pub source: u32,
    pub destination: u32,
    pub requested_rate: f64,
    pub paths: Vec<PathRecord>,
    #[serde(flatten)]
    pub metadata: FlowMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckRouteRecord {
    pub path_id: usize,
    pub links: Vec<usize>,
}

/// The full description of a network and its flow set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyDescription {
    pub links: Vec<LinkRecord>,
    pub flows: Vec<FlowRecord>,
    #[serde(default)]
    pub ack_routes: Vec<AckRouteRecord>,
}

impl TopologyDescription {
    /// Converts the records into a validated `Topology`.
    ///
    /// # Arguments
    /// * `ack_overhead` - Usage added to a link per unit of rate on a path whose ACKs cross it
    ///
    /// # Returns
    /// * `Result<Topology, TopologyError>` - The topology, or the first structural error found
    pub fn build(self, ack_overhead: f64) -> Result<Topology, TopologyError> {
        let links = self
            .links
            .into_iter()
            .map(|l| Link {
                id: l.id,
                cost: l.cost,
                capacity: l.capacity,
            })
            .collect();

        let mut flows = Vec::with_capacity(self.flows.len());
        for record in self.flows {
            if record.metadata.protocol.as_deref() == Some(ACK_PROTOCOL) {
                debug!("Skipping ACK flow {}", record.id);
                continue;
            }
            let paths = record
                .paths
                .into_iter()
                .map(|p| Path {
                    id: p.id,
                    cost: p.cost,
                    links: p.links,
                })
                .collect();
            flows.push(Flow::new(
                record.id,
                record.source,
                record.destination,
                record.requested_rate,
                paths,
                record.metadata,
            )?);
        }

        let ack_routes = self
            .ack_routes
            .into_iter()
            .map(|r| AckRoute {
                path_id: r.path_id,
                links: r.links,
            })
            .collect();

        Ok(Topology::new(links, flows, ack_routes)?.with_ack_overhead(ack_overhead))
    }
}

/// Loads and validates a topology from a JSON file.
///
/// # Arguments
/// * `path` - Location of the topology description
/// * `ack_overhead` - ACK overhead factor to install on the topology
///
/// # Returns
/// * `Result<Topology, TopologyError>` - The validated topology
pub fn load_topology(path: &FsPath, ack_overhead: f64) -> Result<Topology, TopologyError> {
    let content = fs::read_to_string(path)?;
    let description: TopologyDescription = serde_json::from_str(&content)?;
    let topology = description.build(ack_overhead)?;
    info!(
        "Topology loaded: {} links, {} flows, {} paths",
        topology.link_count(),
        topology.flow_count(),
        topology.path_count()
    );
    Ok(topology)
}
