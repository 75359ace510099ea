//! Environmental selection over scored populations.
//!
//! The evolution engine only sees the `Selector` trait. `Nsga2Selector` is the implementation
//! the binary uses: fast non-dominated sorting followed by crowding distance truncation of the
//! last front that fits (Deb et al., 2002), and binary tournaments on front rank and crowding
//! distance to pick parents.

use crate::evaluation::Weight;
use crate::evolution::Individual;
use rand::{Rng, RngCore};
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectionError {
    #[error("Cannot draw parents from an empty population")]
    EmptyPopulation,
    #[error("Individual {0} has not been evaluated")]
    Unevaluated(usize),
    #[error("Individual {index} has {found} objective values, expected {expected}")]
    ObjectiveCount {
        index: usize,
        found: usize,
        expected: usize,
    },
}

/// Environmental and parent selection over scored populations.
pub trait Selector {
    /// Trims a scored population down to `target_size` individuals.
    fn select(
        &self,
        population: Vec<Individual>,
        target_size: usize,
    ) -> Result<Vec<Individual>, SelectionError>;

    /// Draws `count` parents, with replacement, as indices into `population`.
    fn select_parents(
        &self,
        population: &[Individual],
        count: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<usize>, SelectionError>;
}

/// NSGA-II environmental selection.
#[derive(Debug, Clone)]
pub struct Nsga2Selector {
    /// One per objective, in the order of the fitness vectors
    weights: Vec<Weight>,
}

impl Nsga2Selector {
    pub fn new(weights: Vec<Weight>) -> Self {
        Self { weights }
    }

    /// Flips minimised objectives so that larger is better everywhere.
    fn oriented(&self, index: usize, individual: &Individual) -> Result<Vec<f64>, SelectionError> {
        let fitness = individual
            .fitness
            .as_deref()
            .ok_or(SelectionError::Unevaluated(index))?;
        if fitness.len() != self.weights.len() {
            return Err(SelectionError::ObjectiveCount {
                index,
                found: fitness.len(),
                expected: self.weights.len(),
            });
        }
        Ok(fitness
            .iter()
            .zip(&self.weights)
            .map(|(v, w)| v * w.sign())
            .collect())
    }

    fn oriented_points(&self, population: &[Individual]) -> Result<Vec<Vec<f64>>, SelectionError> {
        population
            .iter()
            .enumerate()
            .map(|(i, ind)| self.oriented(i, ind))
            .collect()
    }

    /// Front rank (0 for the non-dominated front) and crowding distance within that front of
    /// every individual, in population order.
    pub fn rank_and_crowding(
        &self,
        population: &[Individual],
    ) -> Result<Vec<(usize, f64)>, SelectionError> {
        let points = self.oriented_points(population)?;
        let mut ranked = vec![(0, 0.0); points.len()];
        for (rank, front) in non_dominated_fronts(&points).into_iter().enumerate() {
            let distances = crowding_distances(&points, &front);
            for (i, distance) in front.into_iter().zip(distances) {
                ranked[i] = (rank, distance);
            }
        }
        Ok(ranked)
    }
}

/// Crowded comparison: the lower front wins, then the larger crowding distance, then a coin.
fn tournament_winner(
    ranked: &[(usize, f64)],
    first: usize,
    second: usize,
    rng: &mut dyn RngCore,
) -> usize {
    let (first_rank, first_distance) = ranked[first];
    let (second_rank, second_distance) = ranked[second];
    match first_rank
        .cmp(&second_rank)
        .then_with(|| second_distance.total_cmp(&first_distance))
    {
        Ordering::Less => first,
        Ordering::Greater => second,
        Ordering::Equal => {
            if rng.random_bool(0.5) {
                first
            } else {
                second
            }
        }
    }
}

impl Selector for Nsga2Selector {
    fn select(
        &self,
        population: Vec<Individual>,
        target_size: usize,
    ) -> Result<Vec<Individual>, SelectionError> {
        let points = self.oriented_points(&population)?;

        if population.len() <= target_size {
            return Ok(population);
        }

        let mut chosen: Vec<usize> = Vec::with_capacity(target_size);
        for front in non_dominated_fronts(&points) {
            let room = target_size - chosen.len();
            if front.len() <= room {
                chosen.extend(front);
            } else {
                let distances = crowding_distances(&points, &front);
                let mut ranked: Vec<(usize, f64)> = front.into_iter().zip(distances).collect();
                ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
                chosen.extend(ranked.into_iter().take(room).map(|(i, _)| i));
            }
            if chosen.len() == target_size {
                break;
            }
        }

        let mut slots: Vec<Option<Individual>> = population.into_iter().map(Some).collect();
        Ok(chosen.into_iter().filter_map(|i| slots[i].take()).collect())
    }

    /// Binary tournaments under the crowded comparison, one per parent.
    fn select_parents(
        &self,
        population: &[Individual],
        count: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<usize>, SelectionError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        if population.is_empty() {
            return Err(SelectionError::EmptyPopulation);
        }
        let ranked = self.rank_and_crowding(population)?;
        Ok((0..count)
            .map(|_| {
                let first = rng.random_range(0..population.len());
                let second = rng.random_range(0..population.len());
                tournament_winner(&ranked, first, second, &mut *rng)
            })
            .collect())
    }
}

/// True if `a` is at least as good as `b` everywhere and strictly better somewhere,
/// larger being better.
pub fn dominates(a: &[f64], b: &[f64]) -> bool {
    let mut strictly_better = false;
    for (x, y) in a.iter().zip(b) {
        if x < y {
            return false;
        }
        if x > y {
            strictly_better = true;
        }
    }
    strictly_better
}

/// Splits `points` into successive non-dominated fronts, best first.
pub fn non_dominated_fronts(points: &[Vec<f64>]) -> Vec<Vec<usize>> {
    let n = points.len();
    let mut domination_count = vec![0usize; n];
    let mut dominated: Vec<Vec<usize>> = vec![Vec::new(); n];

    for i in 0..n {
        for j in (i + 1)..n {
            if dominates(&points[i], &points[j]) {
                dominated[i].push(j);
                domination_count[j] += 1;
            } else if dominates(&points[j], &points[i]) {
                dominated[j].push(i);
                domination_count[i] += 1;
            }
        }
    }

    let mut fronts = Vec::new();
    let mut current: Vec<usize> = (0..n).filter(|&i| domination_count[i] == 0).collect();
    while !current.is_empty() {
        let mut next = Vec::new();
        for &i in &current {
            for &j in &dominated[i] {
                domination_count[j] -= 1;
                if domination_count[j] == 0 {
                    next.push(j);
                }
            }
        }
        next.sort_unstable();
        fronts.push(current);
        current = next;
    }
    fronts
}

/// Crowding distance of each member of `front`, in the same order. Boundary points of every
/// objective get an infinite distance.
pub fn crowding_distances(points: &[Vec<f64>], front: &[usize]) -> Vec<f64> {
    let mut distances = vec![0.0; front.len()];
    if front.len() <= 2 {
        distances.fill(f64::INFINITY);
        return distances;
    }

    let num_objectives = points[front[0]].len();
    let mut order: Vec<usize> = (0..front.len()).collect();
    for m in 0..num_objectives {
        order.sort_by(|&a, &b| {
            points[front[a]][m]
                .partial_cmp(&points[front[b]][m])
                .unwrap_or(Ordering::Equal)
        });

        let first = order[0];
        let last = order[order.len() - 1];
        distances[first] = f64::INFINITY;
        distances[last] = f64::INFINITY;

        let range = points[front[last]][m] - points[front[first]][m];
        if range.abs() < 1e-12 {
            continue;
        }
        for k in 1..order.len() - 1 {
            let gap = points[front[order[k + 1]]][m] - points[front[order[k - 1]]][m];
            distances[order[k]] += gap / range;
        }
    }
    distances
}
