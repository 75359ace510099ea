pub mod bounds;
pub mod loader;

#[cfg(test)]
pub(crate) mod fixtures;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Alias within crate for link identifiers, they double as connectivity matrix columns
pub type LinkId = usize;
/// Alias within crate for path identifiers, they double as chromosome indices
pub type PathId = usize;
/// Alias within crate for flow identifiers
pub type FlowId = usize;

/// Link usage added per unit of rate on a path whose ACK traffic crosses a link.
/// Approximates one ACK packet for every two data packets received and has not been
/// validated against real protocol behaviour, which is why it can be overridden in the config.
pub const DEFAULT_ACK_OVERHEAD: f64 = 0.0458;

#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("Failed to read topology file: {0}")]
    FileReadError(#[from] std::io::Error),
    #[error("Failed to parse topology description: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("No links found in the topology")]
    EmptyLinkSet,
    #[error("Link {0} is duplicate")]
    DuplicateLink(LinkId),
    #[error("Path {0} is duplicate")]
    DuplicatePath(PathId),
    #[error("Flow {0} is duplicate")]
    DuplicateFlow(FlowId),
    #[error("{kind} ids must be contiguous from 0: found id {id} at position {position}")]
    NonContiguousIds {
        kind: &'static str,
        id: usize,
        position: usize,
    },
    #[error("Invalid link {id}: {reason}")]
    InvalidLink { id: LinkId, reason: String },
    #[error("Invalid path {id}: {reason}")]
    InvalidPath { id: PathId, reason: String },
    #[error("Invalid flow {id}: {reason}")]
    InvalidFlow { id: FlowId, reason: String },
    #[error("Flow {0} has no usable paths")]
    FlowWithoutPaths(FlowId),
    #[error("Path {path} references unknown link {link}")]
    UnknownLink { path: PathId, link: LinkId },
    #[error("ACK route references unknown path {0}")]
    UnknownPath(PathId),
}

/// A network link, immutable once parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub id: LinkId,
    pub cost: f64,
    pub capacity: f64,
}

/// An ordered sequence of links a flow may be routed over.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    /// Globally unique, used as the chromosome index of this path
    pub id: PathId,
    /// Normally the sum of the constituent link costs
    pub cost: f64,
    pub links: Vec<LinkId>,
}

/// Protocol details carried along with a flow. None of these influence the allocation,
/// they are kept so results can be traced back to the traffic that produced them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowMetadata {
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub src_port: Option<u16>,
    #[serde(default)]
    pub dst_port: Option<u16>,
    #[serde(default)]
    pub tcp_flow_id: Option<FlowId>,
}

/// A demand for `requested_rate` between two nodes, restricted to a known path set.
#[derive(Debug, Clone, PartialEq)]
pub struct Flow {
    pub id: FlowId,
    pub source: u32,
    pub destination: u32,
    pub requested_rate: f64,
    /// Only the paths usable by this flow, keyed by their global id
    pub paths: BTreeMap<PathId, Path>,
    pub metadata: FlowMetadata,
}

impl Flow {
    /// Creates a new `Flow`, rejecting a path listed twice.
    ///
    /// # Arguments
    /// * `id` - The flow id
    /// * `source` - Source node identifier
    /// * `destination` - Destination node identifier
    /// * `requested_rate` - The data rate the flow asks for
    /// * `paths` - The candidate paths for this flow
    /// * `metadata` - Opaque protocol details
    ///
    /// # Returns
    /// * `Result<Self, TopologyError>` - The flow, or `DuplicatePath` if a path id repeats
    pub fn new(
        id: FlowId,
        source: u32,
        destination: u32,
        requested_rate: f64,
        paths: Vec<Path>,
        metadata: FlowMetadata,
    ) -> Result<Self, TopologyError> {
        let mut path_map = BTreeMap::new();
        for path in paths {
            let path_id = path.id;
            if path_map.insert(path_id, path).is_some() {
                return Err(TopologyError::DuplicatePath(path_id));
            }
        }
        Ok(Self {
            id,
            source,
            destination,
            requested_rate,
            paths: path_map,
            metadata,
        })
    }

    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    pub fn path_ids(&self) -> impl Iterator<Item = PathId> + '_ {
        self.paths.keys().copied()
    }

    pub fn path_list(&self) -> Vec<&Path> {
        self.paths.values().collect()
    }

    /// Cost of the cheapest path available to this flow
    pub fn min_path_cost(&self) -> f64 {
        self.paths
            .values()
            .map(|p| p.cost)
            .fold(f64::INFINITY, f64::min)
    }

    /// Sum of the genes belonging to this flow
    pub fn allocated_rate(&self, genes: &[f64]) -> f64 {
        self.path_ids().map(|p| genes[p]).sum()
    }
}

/// Declares that the ACK traffic of data path `path_id` crosses `links`.
#[derive(Debug, Clone, PartialEq)]
pub struct AckRoute {
    pub path_id: PathId,
    pub links: Vec<LinkId>,
}

/// Binary path x link incidence matrix.
///
/// A row represents a path and a column represents a link, a cell is set when the path
/// traverses the link:
///
/// ```text
///  0, 1, 2, 3, 4   < Link ids
/// [1, 0, 1, 0, 1]  # Path 0, Flow 0
/// [1, 0, 0, 1, 0]  # Path 1, Flow 0
/// [0, 1, 0, 0, 1]  # Path 2, Flow 1
/// ```
///
/// The row and column adjacency lists are kept alongside the dense cells so that link
/// usage can be computed without walking zero cells.
#[derive(Debug, Clone)]
pub struct ConnectivityMatrix {
    num_paths: usize,
    num_links: usize,
    cells: Vec<bool>,
    path_links: Vec<Vec<LinkId>>,
    link_paths: Vec<Vec<PathId>>,
}

impl ConnectivityMatrix {
    /// Creates an all zero matrix with `num_paths` rows and `num_links` columns
    pub fn new(num_paths: usize, num_links: usize) -> Self {
        Self {
            num_paths,
            num_links,
            cells: vec![false; num_paths * num_links],
            path_links: vec![Vec::new(); num_paths],
            link_paths: vec![Vec::new(); num_links],
        }
    }

    /// Marks `path` as traversing `link`. Setting a cell twice is a no-op.
    pub fn set(&mut self, path: PathId, link: LinkId) {
        let cell = path * self.num_links + link;
        if !self.cells[cell] {
            self.cells[cell] = true;
            self.path_links[path].push(link);
            self.link_paths[link].push(path);
        }
    }

    pub fn get(&self, path: PathId, link: LinkId) -> bool {
        self.cells[path * self.num_links + link]
    }

    /// Links traversed by `path`, deduplicated
    pub fn links_of(&self, path: PathId) -> &[LinkId] {
        &self.path_links[path]
    }

    /// Paths traversing `link`, in ascending path id order
    pub fn paths_using(&self, link: LinkId) -> &[PathId] {
        &self.link_paths[link]
    }

    pub fn num_paths(&self) -> usize {
        self.num_paths
    }

    pub fn num_links(&self) -> usize {
        self.num_links
    }
}

/// The immutable network model every operator works against.
///
/// It owns the links, the flows, the connectivity matrix and the ACK route map. Link and
/// path ids are dense so they can index the matrix columns and the chromosome directly.
#[derive(Debug, Clone)]
pub struct Topology {
    /// Indexed by link id
    links: Vec<Link>,
    /// Ordered by flow id so iteration is reproducible under a fixed seed
    flows: BTreeMap<FlowId, Flow>,
    matrix: ConnectivityMatrix,
    /// Indexed by link id, the data paths whose ACKs cross that link
    ack_paths: Vec<Vec<PathId>>,
    /// Indexed by path id, the flow that owns the path
    path_owner: Vec<FlowId>,
    ack_overhead: f64,
}

impl Topology {
    /// Builds the network model from parsed link, flow and ACK route records.
    ///
    /// # Arguments
    /// * `links` - Every link in the network
    /// * `flows` - The flow set, each carrying its candidate paths
    /// * `ack_routes` - ACK routes for data paths, may be empty
    ///
    /// # Returns
    /// * `Result<Self, TopologyError>` - The topology in the happy case
    ///
    /// # Errors
    /// Duplicate or non-contiguous ids, an empty link set, paths referencing unknown links,
    /// flows without paths and invalid numeric fields are all rejected.
    pub fn new(
        links: Vec<Link>,
        flows: Vec<Flow>,
        ack_routes: Vec<AckRoute>,
    ) -> Result<Self, TopologyError> {
        if links.is_empty() {
            return Err(TopologyError::EmptyLinkSet);
        }

        let mut seen_links = HashSet::new();
        for link in &links {
            if !seen_links.insert(link.id) {
                return Err(TopologyError::DuplicateLink(link.id));
            }
            if !(link.capacity.is_finite() && link.capacity > 0.0) {
                return Err(TopologyError::InvalidLink {
                    id: link.id,
                    reason: format!("capacity must be positive, got {}", link.capacity),
                });
            }
            if !(link.cost.is_finite() && link.cost >= 0.0) {
                return Err(TopologyError::InvalidLink {
                    id: link.id,
                    reason: format!("cost must be non-negative, got {}", link.cost),
                });
            }
        }
        let mut links = links;
        links.sort_by_key(|l| l.id);
        check_contiguous("Link", links.iter().map(|l| l.id))?;

        let mut flow_map = BTreeMap::new();
        let mut seen_paths = HashSet::new();
        for flow in flows {
            if flow_map.contains_key(&flow.id) {
                return Err(TopologyError::DuplicateFlow(flow.id));
            }
            if !(flow.requested_rate.is_finite() && flow.requested_rate > 0.0) {
                return Err(TopologyError::InvalidFlow {
                    id: flow.id,
                    reason: format!(
                        "requested rate must be positive, got {}",
                        flow.requested_rate
                    ),
                });
            }
            if flow.paths.is_empty() {
                return Err(TopologyError::FlowWithoutPaths(flow.id));
            }
            for path in flow.paths.values() {
                if !seen_paths.insert(path.id) {
                    return Err(TopologyError::DuplicatePath(path.id));
                }
                if !path.cost.is_finite() {
                    return Err(TopologyError::InvalidPath {
                        id: path.id,
                        reason: format!("cost must be finite, got {}", path.cost),
                    });
                }
                if path.links.is_empty() {
                    return Err(TopologyError::InvalidPath {
                        id: path.id,
                        reason: "path traverses no links".to_string(),
                    });
                }
                if let Some(&link) = path.links.iter().find(|&&l| l >= links.len()) {
                    return Err(TopologyError::UnknownLink {
                        path: path.id,
                        link,
                    });
                }
            }
            flow_map.insert(flow.id, flow);
        }

        let mut path_ids: Vec<PathId> = seen_paths.into_iter().collect();
        path_ids.sort_unstable();
        check_contiguous("Path", path_ids.iter().copied())?;
        let num_paths = path_ids.len();

        let mut matrix = ConnectivityMatrix::new(num_paths, links.len());
        let mut path_owner = vec![0; num_paths];
        for flow in flow_map.values() {
            for path in flow.paths.values() {
                path_owner[path.id] = flow.id;
                for &link_id in &path.links {
                    matrix.set(path.id, link_id);
                }
            }
        }

        let mut ack_paths: Vec<Vec<PathId>> = vec![Vec::new(); links.len()];
        for route in ack_routes {
            if route.path_id >= num_paths {
                return Err(TopologyError::UnknownPath(route.path_id));
            }
            for link_id in route.links {
                if link_id >= links.len() {
                    return Err(TopologyError::UnknownLink {
                        path: route.path_id,
                        link: link_id,
                    });
                }
                if !ack_paths[link_id].contains(&route.path_id) {
                    ack_paths[link_id].push(route.path_id);
                }
            }
        }

        Ok(Self {
            links,
            flows: flow_map,
            matrix,
            ack_paths,
            path_owner,
            ack_overhead: DEFAULT_ACK_OVERHEAD,
        })
    }

    /// Replaces the ACK overhead factor used when computing link usage.
    pub fn with_ack_overhead(mut self, ack_overhead: f64) -> Self {
        self.ack_overhead = ack_overhead;
        self
    }

    pub fn ack_overhead(&self) -> f64 {
        self.ack_overhead
    }

    pub fn capacity_of(&self, link_id: LinkId) -> f64 {
        self.links[link_id].capacity
    }

    /// Data paths whose ACK traffic is carried by `link_id`
    pub fn ack_paths_using(&self, link_id: LinkId) -> &[PathId] {
        &self.ack_paths[link_id]
    }

    /// Total number of paths, which is also the chromosome length
    pub fn path_count(&self) -> usize {
        self.matrix.num_paths()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn link(&self, link_id: LinkId) -> &Link {
        &self.links[link_id]
    }

    /// Flows in ascending id order
    pub fn flows(&self) -> impl Iterator<Item = &Flow> {
        self.flows.values()
    }

    pub fn flow(&self, flow_id: FlowId) -> Option<&Flow> {
        self.flows.get(&flow_id)
    }

    /// The flow owning `path_id`
    pub fn flow_of_path(&self, path_id: PathId) -> &Flow {
        &self.flows[&self.path_owner[path_id]]
    }

    pub fn path(&self, path_id: PathId) -> &Path {
        &self.flow_of_path(path_id).paths[&path_id]
    }

    pub fn connectivity(&self) -> &ConnectivityMatrix {
        &self.matrix
    }

    /// Smallest link capacity along `path`
    pub fn min_link_capacity(&self, path: &Path) -> f64 {
        self.matrix
            .links_of(path.id)
            .iter()
            .map(|&l| self.links[l].capacity)
            .fold(f64::INFINITY, f64::min)
    }

    /// Sum of the costs of the links `path_id` traverses, each link counted once. This is what
    /// one unit of rate on the path costs, whatever the path's declared cost says.
    pub fn path_link_cost(&self, path_id: PathId) -> f64 {
        self.matrix
            .links_of(path_id)
            .iter()
            .map(|&l| self.links[l].cost)
            .sum()
    }

    /// How much one unit of rate on `path_id` contributes to the usage of `link_id`:
    /// 1 if the path traverses the link, plus the ACK overhead if its ACKs cross it.
    pub fn path_coefficient(&self, path_id: PathId, link_id: LinkId) -> f64 {
        let data = if self.matrix.get(path_id, link_id) {
            1.0
        } else {
            0.0
        };
        let ack = if self.ack_paths[link_id].contains(&path_id) {
            self.ack_overhead
        } else {
            0.0
        };
        data + ack
    }

    /// Realized usage of a single link under the allocation `genes`, ACK overhead included.
    pub fn usage_of(&self, link_id: LinkId, genes: &[f64]) -> f64 {
        let data: f64 = self
            .matrix
            .paths_using(link_id)
            .iter()
            .map(|&p| genes[p])
            .sum();
        let ack: f64 = self.ack_paths[link_id].iter().map(|&p| genes[p]).sum();
        data + ack * self.ack_overhead
    }

    /// Realized usage vector, `genes x connectivity` plus ACK overhead, indexed by link id.
    pub fn link_usage(&self, genes: &[f64]) -> Vec<f64> {
        (0..self.links.len())
            .map(|l| self.usage_of(l, genes))
            .collect()
    }
}

fn check_contiguous(
    kind: &'static str,
    sorted_ids: impl Iterator<Item = usize>,
) -> Result<(), TopologyError> {
    for (position, id) in sorted_ids.enumerate() {
        if id != position {
            return Err(TopologyError::NonContiguousIds { kind, id, position });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::fixtures::{butterfly, link, path};
    use super::*;

    #[test]
    fn test_connectivity_matrix_matches_paths() {
        let topology = butterfly();
        let matrix = topology.connectivity();

        assert_eq!(matrix.num_paths(), 4);
        assert_eq!(matrix.num_links(), 9);
        for flow in topology.flows() {
            for p in flow.paths.values() {
                for l in 0..matrix.num_links() {
                    assert_eq!(matrix.get(p.id, l), p.links.contains(&l));
                }
            }
        }
        assert_eq!(matrix.paths_using(2), &[0, 2]);
    }

    #[test]
    fn test_path_lookup_and_ownership() {
        let topology = butterfly();
        assert_eq!(topology.path_count(), 4);
        assert_eq!(topology.flow_of_path(3).id, 1);
        assert_eq!(topology.path(1).links, vec![5, 6]);
        assert_eq!(topology.min_link_capacity(topology.path(1)), 5.0);
        assert_eq!(topology.capacity_of(2), 10.0);
    }

    #[test]
    fn test_empty_link_set_rejected() {
        let result = Topology::new(vec![], vec![], vec![]);
        assert!(matches!(result, Err(TopologyError::EmptyLinkSet)));
    }

    #[test]
    fn test_duplicate_link_rejected() {
        let links = vec![link(0, 1.0, 10.0), link(0, 2.0, 10.0)];
        let result = Topology::new(links, vec![], vec![]);
        assert!(matches!(result, Err(TopologyError::DuplicateLink(0))));
    }

    #[test]
    fn test_duplicate_path_across_flows_rejected() {
        let links = vec![link(0, 1.0, 10.0)];
        let flows = vec![
            Flow::new(0, 0, 1, 5.0, vec![path(0, 1.0, &[0])], FlowMetadata::default()).unwrap(),
            Flow::new(1, 0, 1, 5.0, vec![path(0, 1.0, &[0])], FlowMetadata::default()).unwrap(),
        ];
        let result = Topology::new(links, flows, vec![]);
        assert!(matches!(result, Err(TopologyError::DuplicatePath(0))));
    }

    #[test]
    fn test_duplicate_path_within_flow_rejected() {
        let result = Flow::new(
            0,
            0,
            1,
            5.0,
            vec![path(0, 1.0, &[0]), path(0, 2.0, &[0])],
            FlowMetadata::default(),
        );
        assert!(matches!(result, Err(TopologyError::DuplicatePath(0))));
    }

    #[test]
    fn test_duplicate_flow_rejected() {
        let links = vec![link(0, 1.0, 10.0)];
        let flows = vec![
            Flow::new(0, 0, 1, 5.0, vec![path(0, 1.0, &[0])], FlowMetadata::default()).unwrap(),
            Flow::new(0, 0, 1, 5.0, vec![path(1, 1.0, &[0])], FlowMetadata::default()).unwrap(),
        ];
        let result = Topology::new(links, flows, vec![]);
        assert!(matches!(result, Err(TopologyError::DuplicateFlow(0))));
    }

    #[test]
    fn test_non_contiguous_ids_rejected() {
        let links = vec![link(0, 1.0, 10.0), link(2, 1.0, 10.0)];
        let result = Topology::new(links, vec![], vec![]);
        assert!(matches!(
            result,
            Err(TopologyError::NonContiguousIds { kind: "Link", id: 2, position: 1 })
        ));

        let links = vec![link(0, 1.0, 10.0)];
        let flows =
            vec![Flow::new(0, 0, 1, 5.0, vec![path(1, 1.0, &[0])], FlowMetadata::default()).unwrap()];
        let result = Topology::new(links, flows, vec![]);
        assert!(matches!(
            result,
            Err(TopologyError::NonContiguousIds { kind: "Path", .. })
        ));
    }

    #[test]
    fn test_unknown_link_and_invalid_values_rejected() {
        let flows =
            vec![Flow::new(0, 0, 1, 5.0, vec![path(0, 1.0, &[3])], FlowMetadata::default()).unwrap()];
        let result = Topology::new(vec![link(0, 1.0, 10.0)], flows, vec![]);
        assert!(matches!(
            result,
            Err(TopologyError::UnknownLink { path: 0, link: 3 })
        ));

        let result = Topology::new(vec![link(0, 1.0, 0.0)], vec![], vec![]);
        assert!(matches!(result, Err(TopologyError::InvalidLink { id: 0, .. })));

        let flows =
            vec![Flow::new(0, 0, 1, 0.0, vec![path(0, 1.0, &[0])], FlowMetadata::default()).unwrap()];
        let result = Topology::new(vec![link(0, 1.0, 10.0)], flows, vec![]);
        assert!(matches!(result, Err(TopologyError::InvalidFlow { id: 0, .. })));

        let flows = vec![Flow::new(0, 0, 1, 1.0, vec![], FlowMetadata::default()).unwrap()];
        let result = Topology::new(vec![link(0, 1.0, 10.0)], flows, vec![]);
        assert!(matches!(result, Err(TopologyError::FlowWithoutPaths(0))));
    }

    #[test]
    fn test_link_usage_includes_ack_overhead() {
        let links = vec![link(0, 1.0, 10.0), link(1, 1.0, 10.0)];
        let flows = vec![
            Flow::new(0, 0, 1, 5.0, vec![path(0, 1.0, &[0])], FlowMetadata::default()).unwrap(),
            Flow::new(1, 1, 0, 5.0, vec![path(1, 1.0, &[1])], FlowMetadata::default()).unwrap(),
        ];
        let routes = vec![AckRoute {
            path_id: 0,
            links: vec![1, 1],
        }];
        let topology = Topology::new(links, flows, routes).unwrap();

        assert_eq!(topology.ack_paths_using(1), &[0]);
        assert!(topology.ack_paths_using(0).is_empty());

        let genes = vec![4.0, 2.0];
        let usage = topology.link_usage(&genes);
        assert_eq!(usage[0], 4.0);
        assert!((usage[1] - (2.0 + 4.0 * DEFAULT_ACK_OVERHEAD)).abs() < 1e-12);
        assert!((topology.path_coefficient(0, 1) - DEFAULT_ACK_OVERHEAD).abs() < 1e-12);
        assert_eq!(topology.path_coefficient(1, 1), 1.0);

        let topology = topology.with_ack_overhead(0.5);
        assert!((topology.usage_of(1, &genes) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_ack_route_to_unknown_path_rejected() {
        let links = vec![link(0, 1.0, 10.0)];
        let flows =
            vec![Flow::new(0, 0, 1, 5.0, vec![path(0, 1.0, &[0])], FlowMetadata::default()).unwrap()];
        let routes = vec![AckRoute {
            path_id: 7,
            links: vec![0],
        }];
        let result = Topology::new(links, flows, routes);
        assert!(matches!(result, Err(TopologyError::UnknownPath(7))));
    }
}
