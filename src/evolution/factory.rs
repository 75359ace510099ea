use super::Chromosome;
use super::repair::{RepairEngine, RepairError, RepairReport};
use crate::topology::Topology;
use log::debug;
use rand::prelude::*;
use rand::seq::index;

/// Builds random feasible chromosomes for the initial population.
#[derive(Debug, Clone, Copy)]
pub struct ChromosomeFactory<'a> {
    topology: &'a Topology,
    repair: RepairEngine<'a>,
}

impl<'a> ChromosomeFactory<'a> {
    pub fn new(topology: &'a Topology) -> Self {
        Self {
            topology,
            repair: RepairEngine::new(topology),
        }
    }

    /// Generates one chromosome.
    ///
    /// Every flow picks between one and all of its paths uniformly at random and puts on each
    /// of them as much as the path could carry on its own, `min(requested rate, narrowest link)`.
    /// Other flows are ignored at this stage, so the raw vector is usually over-provisioned and
    /// the full repair is what makes it feasible.
    ///
    /// # Arguments
    /// * `rng` - Random source, each call draws independently from it
    ///
    /// # Returns
    /// * `Result<(Chromosome, RepairReport), RepairError>` - The feasible chromosome and the
    ///   repairs it needed
    pub fn generate<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<(Chromosome, RepairReport), RepairError> {
        let mut genes = vec![0.0; self.topology.path_count()];

        for flow in self.topology.flows() {
            let paths = flow.path_list();
            let num_paths = rng.random_range(1..=paths.len());
            for i in index::sample(rng, paths.len(), num_paths).iter() {
                let path = paths[i];
                genes[path.id] = flow
                    .requested_rate
                    .min(self.topology.min_link_capacity(path));
            }
        }

        let report = self.repair.repair(&mut genes, rng)?;
        debug!(
            "Generated chromosome after {} flow and {} link repairs",
            report.flows_repaired, report.links_repaired
        );
        Ok((Chromosome::new(genes), report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::fixtures::{butterfly, random_topology, two_link_topology};
    use proptest::prelude::*;

    #[test]
    fn test_two_link_scenario_is_feasible() {
        let topology = two_link_topology();
        let factory = ChromosomeFactory::new(&topology);
        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..50 {
            let (chromosome, _) = factory.generate(&mut rng).unwrap();
            let genes = &chromosome.genes;
            assert_eq!(genes.len(), 2);
            assert!(genes[0] <= 10.0 + 1e-9);
            assert!(genes[1] <= 10.0 + 1e-9);
            assert!(genes[0] + genes[1] <= 15.0 + 1e-9);
            assert!(genes.iter().all(|&g| g >= 0.0));
        }
    }

    #[test]
    fn test_generated_chromosomes_start_untagged() {
        let topology = butterfly();
        let factory = ChromosomeFactory::new(&topology);
        let (chromosome, _) = factory.generate(&mut StdRng::seed_from_u64(3)).unwrap();
        assert!(!chromosome.provenance.crossover);
        assert_eq!(chromosome.provenance.mutation, None);
    }

    #[test]
    fn test_every_flow_gets_some_rate() {
        // Nothing in the butterfly is saturated by a single flow, so repair never
        // wipes out a flow completely
        let topology = butterfly();
        let factory = ChromosomeFactory::new(&topology);
        let mut rng = StdRng::seed_from_u64(8);

        for _ in 0..50 {
            let (chromosome, _) = factory.generate(&mut rng).unwrap();
            for flow in topology.flows() {
                assert!(flow.allocated_rate(&chromosome.genes) > 0.0);
            }
        }
    }

    #[test]
    fn test_same_seed_same_chromosome() {
        let topology = random_topology(4, 8, 6);
        let factory = ChromosomeFactory::new(&topology);
        let (a, _) = factory.generate(&mut StdRng::seed_from_u64(99)).unwrap();
        let (b, _) = factory.generate(&mut StdRng::seed_from_u64(99)).unwrap();
        assert_eq!(a.genes, b.genes);
    }

    proptest! {
        #[test]
        fn prop_generated_chromosomes_are_feasible(seed in any::<u64>()) {
            let topology = random_topology(seed, 7, 6);
            let factory = ChromosomeFactory::new(&topology);
            let mut rng = StdRng::seed_from_u64(seed);
            let (chromosome, _) = factory.generate(&mut rng).unwrap();

            prop_assert!(RepairEngine::new(&topology).verify(&chromosome.genes).is_ok());
        }
    }
}
