//! Crossover and mutation.
//!
//! Both operators hand back chromosomes that went through repair, so everything leaving this
//! module satisfies the flow and link constraints.

use super::repair::{RepairEngine, RepairError, RepairReport};
use super::{Chromosome, ZERO_TOLERANCE};
use crate::config::MutationConfig;
use crate::topology::{Flow, Path, Topology};
use log::debug;
use rand::distr::weighted::{Error as WeightError, WeightedIndex};
use rand::prelude::*;
use rand::seq::index;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Probability that a cheapest path is picked by the min-cost strategy
const MIN_COST_PICK_PROBABILITY: f64 = 0.95;

/// Absolute tolerance on the sum of the mutation probabilities
const PROBABILITY_SUM_TOLERANCE: f64 = 1e-9;

#[derive(Error, Debug)]
pub enum VariationError {
    #[error("Repair failed: {0}")]
    Repair(#[from] RepairError),
    #[error("No mutation strategy configured")]
    EmptyStrategyTable,
    #[error("Unknown mutation strategy '{0}'")]
    UnknownStrategy(String),
    #[error("Mutation strategy {0} is listed more than once")]
    DuplicateStrategy(MutationStrategy),
    #[error("Invalid probability {probability} for mutation strategy {strategy}")]
    InvalidProbability {
        strategy: MutationStrategy,
        probability: f64,
    },
    #[error("Mutation probabilities must sum to 1, got {0}")]
    ProbabilitySum(f64),
    #[error("Invalid mutation weights: {0}")]
    Weights(#[from] WeightError),
    #[error("Mutation fraction must be in (0, 1], got {0}")]
    InvalidMutationFraction(f64),
}

/// The ways a mutation can repopulate the paths of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationStrategy {
    /// Favours using few paths, possibly none
    MinPath,
    /// Favours the cheapest paths
    MinCost,
    /// Favours paths whose cost is close to a randomly chosen base path
    MinPathStdDev,
    /// Uses every path
    MaxFlow,
}

/// Order in which assign-on-paths visits the candidate paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathOrder {
    Random,
    CostAscending,
}

impl MutationStrategy {
    pub const ALL: [MutationStrategy; 4] = [
        MutationStrategy::MinPath,
        MutationStrategy::MinCost,
        MutationStrategy::MinPathStdDev,
        MutationStrategy::MaxFlow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MutationStrategy::MinPath => "min_path",
            MutationStrategy::MinCost => "min_cost",
            MutationStrategy::MinPathStdDev => "min_path_std_dev",
            MutationStrategy::MaxFlow => "max_flow",
        }
    }

    /// The cost sensitive strategies fill the cheapest candidates first.
    pub fn path_order(&self) -> PathOrder {
        match self {
            MutationStrategy::MinCost | MutationStrategy::MinPathStdDev => PathOrder::CostAscending,
            MutationStrategy::MinPath | MutationStrategy::MaxFlow => PathOrder::Random,
        }
    }

    /// Picks the subset of `flow`'s paths this strategy will assign rate to.
    ///
    /// An empty result leaves the flow unallocated.
    pub fn select_paths<'f, R: Rng + ?Sized>(&self, flow: &'f Flow, rng: &mut R) -> Vec<&'f Path> {
        let paths = flow.path_list();
        match self {
            MutationStrategy::MinPath => {
                let num_paths = draw_path_count(paths.len(), rng);
                index::sample(rng, paths.len(), num_paths)
                    .iter()
                    .map(|i| paths[i])
                    .collect()
            }
            MutationStrategy::MinCost => {
                let min_cost = flow.min_path_cost();
                paths
                    .into_iter()
                    .filter(|path| {
                        let p = if path.cost == min_cost {
                            MIN_COST_PICK_PROBABILITY
                        } else {
                            MIN_COST_PICK_PROBABILITY * (min_cost / path.cost)
                        };
                        rng.random::<f64>() < p
                    })
                    .collect()
            }
            MutationStrategy::MinPathStdDev => {
                let Some(&base) = paths.choose(rng) else {
                    return Vec::new();
                };
                if paths.len() == 1 {
                    return vec![base];
                }
                let max_difference = paths
                    .iter()
                    .filter(|p| p.id != base.id)
                    .map(|p| (p.cost - base.cost).abs())
                    .fold(0.0, f64::max);
                paths
                    .into_iter()
                    .filter(|path| {
                        if path.id == base.id {
                            return true;
                        }
                        let p = 1.0 - (path.cost - base.cost).abs() / (max_difference + 1.0);
                        rng.random::<f64>() < p
                    })
                    .collect()
            }
            MutationStrategy::MaxFlow => paths,
        }
    }
}

/// Draws how many paths min-path uses: `m` in `[0, k]` with weight `k + 1 - m`.
fn draw_path_count<R: Rng + ?Sized>(num_paths: usize, rng: &mut R) -> usize {
    let total = (num_paths + 1) * (num_paths + 2) / 2;
    let mut ticket = rng.random_range(0..total);
    for m in 0..=num_paths {
        let weight = num_paths + 1 - m;
        if ticket < weight {
            return m;
        }
        ticket -= weight;
    }
    num_paths
}

impl fmt::Display for MutationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MutationStrategy::ALL
            .into_iter()
            .find(|m| m.as_str() == s.trim())
            .ok_or_else(|| s.to_string())
    }
}

/// Maps each configured strategy to its selection probability.
#[derive(Debug, Clone)]
pub struct MutationTable {
    strategies: Vec<MutationStrategy>,
    probabilities: Vec<f64>,
    distribution: WeightedIndex<f64>,
}

impl MutationTable {
    /// Builds the table, failing if a strategy repeats, a probability is negative or the
    /// probabilities do not sum to 1.
    pub fn new(entries: Vec<(MutationStrategy, f64)>) -> Result<Self, VariationError> {
        if entries.is_empty() {
            return Err(VariationError::EmptyStrategyTable);
        }

        let mut strategies = Vec::with_capacity(entries.len());
        let mut probabilities = Vec::with_capacity(entries.len());
        for (strategy, probability) in entries {
            if strategies.contains(&strategy) {
                return Err(VariationError::DuplicateStrategy(strategy));
            }
            if !probability.is_finite() || probability < 0.0 {
                return Err(VariationError::InvalidProbability {
                    strategy,
                    probability,
                });
            }
            strategies.push(strategy);
            probabilities.push(probability);
        }

        let sum: f64 = probabilities.iter().sum();
        if (sum - 1.0).abs() > PROBABILITY_SUM_TOLERANCE {
            return Err(VariationError::ProbabilitySum(sum));
        }

        let distribution = WeightedIndex::new(&probabilities)?;
        Ok(Self {
            strategies,
            probabilities,
            distribution,
        })
    }

    /// Resolves the configured `[[mutation]]` entries by name.
    pub fn from_config(entries: &[MutationConfig]) -> Result<Self, VariationError> {
        let entries = entries
            .iter()
            .map(|entry| {
                entry
                    .strategy
                    .parse::<MutationStrategy>()
                    .map(|strategy| (strategy, entry.probability))
                    .map_err(VariationError::UnknownStrategy)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(entries)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> MutationStrategy {
        self.strategies[self.distribution.sample(rng)]
    }

    pub fn strategies(&self) -> &[MutationStrategy] {
        &self.strategies
    }

    pub fn probability_of(&self, strategy: MutationStrategy) -> f64 {
        self.strategies
            .iter()
            .position(|&s| s == strategy)
            .map_or(0.0, |i| self.probabilities[i])
    }
}

/// Crossover, mutation and the greedy rate assignment they share.
#[derive(Debug, Clone)]
pub struct VariationOperators<'a> {
    topology: &'a Topology,
    repair: RepairEngine<'a>,
    table: MutationTable,
    mutation_fraction: f64,
}

impl<'a> VariationOperators<'a> {
    /// Creates the operators.
    ///
    /// # Arguments
    /// * `topology` - The network the chromosomes allocate rate on
    /// * `table` - Mutation strategies and their probabilities
    /// * `mutation_fraction` - Share of the flows rerouted by a single mutation, in (0, 1]
    pub fn new(
        topology: &'a Topology,
        table: MutationTable,
        mutation_fraction: f64,
    ) -> Result<Self, VariationError> {
        if !(mutation_fraction > 0.0 && mutation_fraction <= 1.0) {
            return Err(VariationError::InvalidMutationFraction(mutation_fraction));
        }
        Ok(Self {
            topology,
            repair: RepairEngine::new(topology),
            table,
            mutation_fraction,
        })
    }

    pub fn table(&self) -> &MutationTable {
        &self.table
    }

    /// Crosses two chromosomes over by exchanging whole flows.
    ///
    /// Each parent sub-vector was already within its flow's requested rate, so only the
    /// link capacities need repairing afterwards. Both children are tagged as crossover
    /// offspring.
    ///
    /// # Returns
    /// * `Result<RepairReport, VariationError>` - The link repairs both children needed
    pub fn crossover<R: Rng + ?Sized>(
        &self,
        first: &mut Chromosome,
        second: &mut Chromosome,
        rng: &mut R,
    ) -> Result<RepairReport, VariationError> {
        let swapped = self.swap_flows(&mut first.genes, &mut second.genes, rng);
        debug!("Crossover swapped {} flows", swapped);

        let mut report = RepairReport::default();
        for child in [first, second] {
            report.links_repaired += self.repair.repair_link_capacity(&mut child.genes, rng)?;
            self.repair.verify(&child.genes)?;
            child.provenance.crossover = true;
        }
        Ok(report)
    }

    /// Swaps the sub-vectors of randomly chosen flows between `first` and `second`.
    ///
    /// One split ratio is drawn per call and every flow is swapped with that probability.
    /// Returns the number of flows swapped.
    pub(crate) fn swap_flows<R: Rng + ?Sized>(
        &self,
        first: &mut [f64],
        second: &mut [f64],
        rng: &mut R,
    ) -> usize {
        let split_ratio: f64 = rng.random();
        let mut swapped = 0;
        for flow in self.topology.flows() {
            if rng.random::<f64>() < split_ratio {
                for p in flow.path_ids() {
                    std::mem::swap(&mut first[p], &mut second[p]);
                }
                swapped += 1;
            }
        }
        swapped
    }

    /// Reroutes a random subset of flows, then repairs the chromosome.
    ///
    /// `ceil(mutation_fraction x flows)` flows are drawn without replacement. Each one has its
    /// rates cleared and refilled by a strategy drawn from the mutation table. The chromosome
    /// is tagged with the strategy applied last.
    ///
    /// # Returns
    /// * `Result<RepairReport, VariationError>` - The repairs the mutated chromosome needed
    pub fn mutate<R: Rng + ?Sized>(
        &self,
        chromosome: &mut Chromosome,
        rng: &mut R,
    ) -> Result<RepairReport, VariationError> {
        let flows: Vec<&Flow> = self.topology.flows().collect();
        let num_mutated =
            ((self.mutation_fraction * flows.len() as f64).ceil() as usize).min(flows.len());

        let mut last_strategy = None;
        for i in index::sample(rng, flows.len(), num_mutated).iter() {
            let flow = flows[i];
            for p in flow.path_ids() {
                chromosome.genes[p] = 0.0;
            }

            let strategy = self.table.sample(rng);
            let mut candidates = strategy.select_paths(flow, rng);
            debug!(
                "Mutating flow {} with {} on {} paths",
                flow.id,
                strategy,
                candidates.len()
            );
            self.assign_on_paths(
                flow,
                &mut candidates,
                &mut chromosome.genes,
                strategy.path_order(),
                rng,
            );
            last_strategy = Some(strategy);
        }

        let report = self.repair.repair(&mut chromosome.genes, rng)?;
        if last_strategy.is_some() {
            chromosome.provenance.mutation = last_strategy;
        }
        Ok(report)
    }

    /// Greedily assigns `flow`'s requested rate over `candidates`.
    ///
    /// The headroom of every link is what the chromosome leaves of its capacity, ACK overhead
    /// included and never below zero. Each candidate in turn gets as much of the remaining
    /// demand as its tightest link allows and consumes that headroom, until the demand is met
    /// or the candidates run out.
    pub fn assign_on_paths<R: Rng + ?Sized>(
        &self,
        flow: &Flow,
        candidates: &mut [&Path],
        genes: &mut [f64],
        order: PathOrder,
        rng: &mut R,
    ) {
        let mut headroom: Vec<f64> = self
            .topology
            .link_usage(genes)
            .into_iter()
            .enumerate()
            .map(|(l, usage)| (self.topology.capacity_of(l) - usage).max(0.0))
            .collect();

        match order {
            PathOrder::Random => candidates.shuffle(rng),
            PathOrder::CostAscending => candidates.sort_by(|a, b| a.cost.total_cmp(&b.cost)),
        }

        let links = self.topology.connectivity();
        let mut remaining = flow.requested_rate;
        for path in candidates.iter() {
            let cap = links
                .links_of(path.id)
                .iter()
                .map(|&l| headroom[l])
                .fold(f64::INFINITY, f64::min);
            let assigned = remaining.min(cap);
            genes[path.id] = assigned;
            remaining -= assigned;
            for &l in links.links_of(path.id) {
                headroom[l] -= assigned;
            }
            if remaining <= ZERO_TOLERANCE {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::fixtures::{butterfly, link, path, random_topology, two_link_topology};
    use crate::topology::FlowMetadata;
    use proptest::prelude::*;
    use rand::Rng;

    fn rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    fn single(strategy: MutationStrategy) -> MutationTable {
        MutationTable::new(vec![(strategy, 1.0)]).unwrap()
    }

    fn uniform() -> MutationTable {
        MutationTable::new(MutationStrategy::ALL.iter().map(|&s| (s, 0.25)).collect()).unwrap()
    }

    fn four_path_flow() -> Flow {
        Flow::new(
            0,
            0,
            1,
            10.0,
            vec![
                path(0, 1.0, &[0]),
                path(1, 2.0, &[0]),
                path(2, 4.0, &[0]),
                path(3, 8.0, &[0]),
            ],
            FlowMetadata::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_strategy_names_round_trip() {
        for strategy in MutationStrategy::ALL {
            assert_eq!(strategy.as_str().parse::<MutationStrategy>(), Ok(strategy));
        }
        assert!("max_cost".parse::<MutationStrategy>().is_err());
    }

    #[test]
    fn test_mutation_table_validation() {
        assert!(matches!(
            MutationTable::new(vec![]),
            Err(VariationError::EmptyStrategyTable)
        ));
        assert!(matches!(
            MutationTable::new(vec![(MutationStrategy::MinPath, 0.5), (MutationStrategy::MaxFlow, 0.4)]),
            Err(VariationError::ProbabilitySum(_))
        ));
        assert!(matches!(
            MutationTable::new(vec![(MutationStrategy::MinPath, 1.5), (MutationStrategy::MaxFlow, -0.5)]),
            Err(VariationError::InvalidProbability { .. })
        ));
        assert!(matches!(
            MutationTable::new(vec![(MutationStrategy::MinPath, 0.5), (MutationStrategy::MinPath, 0.5)]),
            Err(VariationError::DuplicateStrategy(MutationStrategy::MinPath))
        ));

        let table = MutationTable::new(vec![
            (MutationStrategy::MinCost, 0.0),
            (MutationStrategy::MaxFlow, 1.0),
        ])
        .unwrap();
        let mut r = rng(1);
        for _ in 0..100 {
            assert_eq!(table.sample(&mut r), MutationStrategy::MaxFlow);
        }
        assert_eq!(table.probability_of(MutationStrategy::MinPath), 0.0);
    }

    #[test]
    fn test_uniform_table_covers_all_strategies() {
        let table = uniform();
        assert_eq!(table.strategies(), &MutationStrategy::ALL[..]);
        assert_eq!(table.probability_of(MutationStrategy::MinCost), 0.25);
    }

    #[test]
    fn test_table_from_config() {
        let entries = vec![
            MutationConfig {
                strategy: "min_cost".to_string(),
                probability: 0.7,
            },
            MutationConfig {
                strategy: "max_flow".to_string(),
                probability: 0.3,
            },
        ];
        let table = MutationTable::from_config(&entries).unwrap();
        assert_eq!(
            table.strategies(),
            &[MutationStrategy::MinCost, MutationStrategy::MaxFlow][..]
        );
        assert_eq!(table.probability_of(MutationStrategy::MinPath), 0.0);

        let unknown = vec![MutationConfig {
            strategy: "min_delay".to_string(),
            probability: 1.0,
        }];
        assert!(matches!(
            MutationTable::from_config(&unknown),
            Err(VariationError::UnknownStrategy(name)) if name == "min_delay"
        ));
    }

    #[test]
    fn test_min_path_favours_few_paths() {
        let flow = four_path_flow();
        let mut r = rng(7);
        let mut counts = [0usize; 5];
        for _ in 0..5000 {
            let chosen = MutationStrategy::MinPath.select_paths(&flow, &mut r);
            let mut ids: Vec<_> = chosen.iter().map(|p| p.id).collect();
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), chosen.len());
            counts[chosen.len()] += 1;
        }
        // Weights 5:4:3:2:1
        assert!(counts[0] > counts[2]);
        assert!(counts[2] > counts[4]);
        assert!(counts[4] > 0);
    }

    #[test]
    fn test_min_cost_favours_cheap_paths() {
        let flow = four_path_flow();
        let mut r = rng(3);
        let mut picks = [0usize; 4];
        for _ in 0..2000 {
            for p in MutationStrategy::MinCost.select_paths(&flow, &mut r) {
                picks[p.id] += 1;
            }
        }
        assert!(picks[0] > picks[1] && picks[1] > picks[2] && picks[2] > picks[3]);
    }

    #[test]
    fn test_min_path_std_dev_always_keeps_base() {
        let flow = four_path_flow();
        let mut r = rng(5);
        for _ in 0..200 {
            assert!(!MutationStrategy::MinPathStdDev.select_paths(&flow, &mut r).is_empty());
        }

        let single_path =
            Flow::new(1, 0, 1, 5.0, vec![path(7, 3.0, &[0])], FlowMetadata::default()).unwrap();
        let chosen = MutationStrategy::MinPathStdDev.select_paths(&single_path, &mut r);
        assert_eq!(chosen.len(), 1);
        assert_eq!(chosen[0].id, 7);
    }

    #[test]
    fn test_max_flow_uses_every_path() {
        let flow = four_path_flow();
        let chosen = MutationStrategy::MaxFlow.select_paths(&flow, &mut rng(0));
        assert_eq!(chosen.len(), 4);
    }

    #[test]
    fn test_assign_on_paths_fills_cheapest_first() {
        let topology = two_link_topology();
        let operators = VariationOperators::new(&topology, uniform(), 1.0).unwrap();
        let flow = topology.flow(0).unwrap();
        let mut candidates = flow.path_list();
        let mut genes = vec![0.0, 0.0];

        operators.assign_on_paths(
            flow,
            &mut candidates,
            &mut genes,
            PathOrder::CostAscending,
            &mut rng(0),
        );
        assert_eq!(genes, vec![10.0, 5.0]);
    }

    #[test]
    fn test_assign_on_paths_respects_existing_usage() {
        // Flow 1 already puts 8 on the shared link 2
        let topology = butterfly();
        let operators = VariationOperators::new(&topology, uniform(), 1.0).unwrap();
        let flow = topology.flow(0).unwrap();
        let mut candidates = vec![topology.path(0)];
        let mut genes = vec![0.0, 0.0, 8.0, 0.0];

        operators.assign_on_paths(flow, &mut candidates, &mut genes, PathOrder::Random, &mut rng(0));
        assert!((genes[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_assign_on_paths_treats_negative_headroom_as_zero() {
        let links = vec![link(0, 1.0, 5.0), link(1, 1.0, 5.0)];
        let flows = vec![
            Flow::new(0, 0, 1, 5.0, vec![path(0, 1.0, &[0])], FlowMetadata::default()).unwrap(),
            Flow::new(1, 0, 1, 5.0, vec![path(1, 1.0, &[0, 1])], FlowMetadata::default()).unwrap(),
        ];
        let topology = Topology::new(links, flows, vec![]).unwrap();
        let operators = VariationOperators::new(&topology, uniform(), 1.0).unwrap();

        let mut genes = vec![7.0, 0.0];
        let flow = topology.flow(1).unwrap();
        let mut candidates = flow.path_list();
        operators.assign_on_paths(flow, &mut candidates, &mut genes, PathOrder::Random, &mut rng(0));
        assert_eq!(genes[1], 0.0);
    }

    #[test]
    fn test_invalid_mutation_fraction_rejected() {
        let topology = butterfly();
        for fraction in [0.0, -0.1, 1.5, f64::NAN] {
            assert!(matches!(
                VariationOperators::new(&topology, uniform(), fraction),
                Err(VariationError::InvalidMutationFraction(_))
            ));
        }
    }

    #[test]
    fn test_crossover_children_are_feasible_and_tagged() {
        let topology = butterfly();
        let operators = VariationOperators::new(&topology, uniform(), 0.5).unwrap();
        let mut r = rng(21);

        for _ in 0..50 {
            let mut first = Chromosome::new(vec![10.0, 0.0, 0.0, 5.0]);
            let mut second = Chromosome::new(vec![0.0, 5.0, 10.0, 0.0]);
            operators.crossover(&mut first, &mut second, &mut r).unwrap();

            for child in [&first, &second] {
                assert!(child.provenance.crossover);
                assert!(RepairEngine::new(&topology).verify(&child.genes).is_ok());
            }
        }
    }

    #[test]
    fn test_mutation_is_feasible_and_tagged() {
        let topology = butterfly();
        let operators =
            VariationOperators::new(&topology, single(MutationStrategy::MaxFlow), 1.0).unwrap();
        let mut r = rng(2);

        for _ in 0..50 {
            let mut chromosome = Chromosome::new(vec![0.0; 4]);
            operators.mutate(&mut chromosome, &mut r).unwrap();

            assert_eq!(chromosome.provenance.mutation, Some(MutationStrategy::MaxFlow));
            assert!(RepairEngine::new(&topology).verify(&chromosome.genes).is_ok());
            // Whichever flow goes first, the detours leave each flow at least 5
            for flow in topology.flows() {
                assert!(flow.allocated_rate(&chromosome.genes) >= 5.0 - 1e-9);
            }
        }
    }

    #[test]
    fn test_partial_mutation_keeps_other_flows() {
        // Half of two flows is one flow, the other keeps its rates
        let topology = butterfly();
        let operators =
            VariationOperators::new(&topology, single(MutationStrategy::MinCost), 0.5).unwrap();
        let original = vec![2.0, 3.0, 1.0, 4.0];
        let mut chromosome = Chromosome::new(original.clone());
        operators.mutate(&mut chromosome, &mut rng(13)).unwrap();

        let untouched = topology
            .flows()
            .filter(|f| f.path_ids().all(|p| chromosome.genes[p] == original[p]))
            .count();
        assert!(untouched >= 1);
    }

    proptest! {
        #[test]
        fn prop_crossover_swaps_whole_flows(seed in any::<u64>()) {
            let topology = random_topology(seed, 6, 6);
            let operators =
                VariationOperators::new(&topology, uniform(), 0.5).unwrap();
            let mut r = rng(seed);
            let n = topology.path_count();
            let first: Vec<f64> = (0..n).map(|_| r.random_range(0.0..10.0)).collect();
            let second: Vec<f64> = (0..n).map(|_| r.random_range(0.0..10.0)).collect();

            let mut child_a = first.clone();
            let mut child_b = second.clone();
            operators.swap_flows(&mut child_a, &mut child_b, &mut r);

            for flow in topology.flows() {
                let ids: Vec<_> = flow.path_ids().collect();
                let a: Vec<f64> = ids.iter().map(|&p| child_a[p]).collect();
                let b: Vec<f64> = ids.iter().map(|&p| child_b[p]).collect();
                let p1: Vec<f64> = ids.iter().map(|&p| first[p]).collect();
                let p2: Vec<f64> = ids.iter().map(|&p| second[p]).collect();
                prop_assert!((a == p1 && b == p2) || (a == p2 && b == p1));
            }
        }
    }
}
