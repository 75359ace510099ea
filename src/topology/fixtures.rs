//! Shared topologies for the unit tests.

use super::{AckRoute, Flow, FlowMetadata, Link, LinkId, Path, PathId, Topology};
use rand::prelude::*;
use rand::Rng;

pub(crate) fn link(id: LinkId, cost: f64, capacity: f64) -> Link {
    Link { id, cost, capacity }
}

pub(crate) fn path(id: PathId, cost: f64, links: &[LinkId]) -> Path {
    Path {
        id,
        cost,
        links: links.to_vec(),
    }
}

/// Two links with capacity 10 and costs 1 and 2, one flow requesting 15 over two
/// single-link paths.
pub(crate) fn two_link_topology() -> Topology {
    let links = vec![link(0, 1.0, 10.0), link(1, 2.0, 10.0)];
    let flows = vec![
        Flow::new(
            0,
            0,
            1,
            15.0,
            vec![path(0, 1.0, &[0]), path(1, 2.0, &[1])],
            FlowMetadata::default(),
        )
        .unwrap(),
    ];
    Topology::new(links, flows, vec![]).unwrap()
}

/// Two flows sharing a bottleneck link (link 2), each with a detour path.
///
/// ```text
/// flow 0 (rate 10): path 0 = [0, 2, 3] cost 3, path 1 = [5, 6] cost 4
/// flow 1 (rate 10): path 2 = [1, 2, 4] cost 3, path 3 = [7, 8] cost 6
/// ```
pub(crate) fn butterfly() -> Topology {
    let links = vec![
        link(0, 1.0, 10.0),
        link(1, 1.0, 10.0),
        link(2, 1.0, 10.0),
        link(3, 1.0, 10.0),
        link(4, 1.0, 10.0),
        link(5, 2.0, 5.0),
        link(6, 2.0, 5.0),
        link(7, 3.0, 5.0),
        link(8, 3.0, 5.0),
    ];
    let flows = vec![
        Flow::new(
            0,
            0,
            3,
            10.0,
            vec![path(0, 3.0, &[0, 2, 3]), path(1, 4.0, &[5, 6])],
            FlowMetadata::default(),
        )
        .unwrap(),
        Flow::new(
            1,
            1,
            4,
            10.0,
            vec![path(2, 3.0, &[1, 2, 4]), path(3, 6.0, &[7, 8])],
            FlowMetadata::default(),
        )
        .unwrap(),
    ];
    Topology::new(links, flows, vec![]).unwrap()
}

/// A random but well formed topology: path costs are the sum of their link costs and
/// every data path sends its ACKs back over one random link.
pub(crate) fn random_topology(seed: u64, num_links: usize, num_flows: usize) -> Topology {
    let mut rng = StdRng::seed_from_u64(seed);
    let links: Vec<Link> = (0..num_links)
        .map(|id| link(id, rng.random_range(0.0..5.0), rng.random_range(1.0..20.0)))
        .collect();

    let mut next_path = 0;
    let mut ack_routes = Vec::new();
    let flows: Vec<Flow> = (0..num_flows)
        .map(|flow_id| {
            let num_paths = rng.random_range(1..=4);
            let paths = (0..num_paths)
                .map(|_| {
                    let hops = rng.random_range(1..=num_links.min(4));
                    let link_ids = rand::seq::index::sample(&mut rng, num_links, hops).into_vec();
                    let cost = link_ids.iter().map(|&l| links[l].cost).sum();
                    let id = next_path;
                    next_path += 1;
                    ack_routes.push(AckRoute {
                        path_id: id,
                        links: vec![rng.random_range(0..num_links)],
                    });
                    path(id, cost, &link_ids)
                })
                .collect();
            Flow::new(
                flow_id,
                0,
                1,
                rng.random_range(1.0..30.0),
                paths,
                FlowMetadata::default(),
            )
            .unwrap()
        })
        .collect();

    Topology::new(links, flows, ack_routes).unwrap()
}
