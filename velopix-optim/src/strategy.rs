//! Search strategies: where to look next.
//!
//! A strategy only chooses candidates. Trial bookkeeping, budgets and the
//! best-so-far live in [`BaseOptimizer`](crate::BaseOptimizer), which feeds
//! each score back through [`SearchStrategy::observe`].
#![allow(clippy::cast_precision_loss)]

use std::collections::VecDeque;

use log::debug;
use rand::prelude::*;
use velopix_core::ParameterSet;

use crate::space::SearchSpace;

/// Capability shared by all search strategies.
pub trait SearchStrategy: Send {
    /// Strategy name, for logs and results.
    fn name(&self) -> &'static str;

    /// Next candidate, or `None` once a finite strategy is exhausted.
    fn next_candidate(&mut self) -> Option<ParameterSet>;

    /// Feeds back the score of the last candidate (higher is better).
    fn observe(&mut self, params: &ParameterSet, score: f64);

    /// True once no further candidates will be produced.
    fn is_exhausted(&self) -> bool;
}

impl<S: SearchStrategy + ?Sized> SearchStrategy for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn next_candidate(&mut self) -> Option<ParameterSet> {
        (**self).next_candidate()
    }

    fn observe(&mut self, params: &ParameterSet, score: f64) {
        (**self).observe(params, score);
    }

    fn is_exhausted(&self) -> bool {
        (**self).is_exhausted()
    }
}

/// Exhaustive cartesian product, last dimension varying fastest.
#[derive(Debug, Clone)]
pub struct GridSearch {
    space: SearchSpace,
    indices: Vec<usize>,
    exhausted: bool,
}

impl GridSearch {
    /// Creates a grid over `space`.
    #[must_use]
    pub fn new(space: SearchSpace) -> Self {
        let exhausted = space.dimensions().iter().any(|(_, d)| d.is_empty());
        let indices = vec![0; space.dimensions().len()];
        Self {
            space,
            indices,
            exhausted,
        }
    }

    /// Total number of grid points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.space.grid_size()
    }

    /// Returns true if the grid has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn advance(&mut self) {
        for (i, (_, dim)) in self.space.dimensions().iter().enumerate().rev() {
            self.indices[i] += 1;
            if self.indices[i] < dim.len() {
                return;
            }
            self.indices[i] = 0;
        }
        self.exhausted = true;
    }
}

impl SearchStrategy for GridSearch {
    fn name(&self) -> &'static str {
        "grid"
    }

    fn next_candidate(&mut self) -> Option<ParameterSet> {
        if self.exhausted {
            return None;
        }
        let values = self
            .space
            .dimensions()
            .iter()
            .zip(&self.indices)
            .map(|((_, dim), &i)| dim.grid_value(i));
        let params = self.space.candidate(values);
        self.advance();
        Some(params)
    }

    fn observe(&mut self, _params: &ParameterSet, _score: f64) {}

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

/// Independent uniform draws from a seeded generator; never exhausted.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    space: SearchSpace,
    rng: StdRng,
}

impl RandomSearch {
    /// Creates a random search; the same seed yields the same sequence.
    #[must_use]
    pub fn new(space: SearchSpace, seed: u64) -> Self {
        Self {
            space,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl SearchStrategy for RandomSearch {
    fn name(&self) -> &'static str {
        "random"
    }

    fn next_candidate(&mut self) -> Option<ParameterSet> {
        let values: Vec<_> = self
            .space
            .dimensions()
            .iter()
            .map(|(_, dim)| dim.sample(&mut self.rng))
            .collect();
        Some(self.space.candidate(values))
    }

    fn observe(&mut self, _params: &ParameterSet, _score: f64) {}

    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Coordinate hill climbing with step refinement.
///
/// Starting from the base values, each sweep tries `center ± step` along
/// every dimension in a seeded random order and moves to the first
/// improvement. A sweep without improvement halves the steps; the search is
/// exhausted once a sweep at the minimum step sizes finds nothing better.
/// Discrete and integer dimensions move by at least one grid position.
#[derive(Debug, Clone)]
pub struct LocalSearch {
    space: SearchSpace,
    rng: StdRng,
    center: Vec<f64>,
    center_score: Option<f64>,
    steps: Vec<f64>,
    min_steps: Vec<f64>,
    queue: VecDeque<Vec<f64>>,
    in_flight: Option<Vec<f64>>,
    started: bool,
    swept: bool,
    improved: bool,
    exhausted: bool,
}

impl LocalSearch {
    /// Default smallest float step, as a fraction of the dimension's span.
    pub const MIN_STEP_FRACTION: f64 = 1e-3;

    /// Creates a local search starting at the base values of `space`.
    ///
    /// Dimensions whose base value lies outside them start at their midpoint.
    #[must_use]
    pub fn new(space: SearchSpace, seed: u64) -> Self {
        let mut center = Vec::new();
        let mut steps = Vec::new();
        for (name, dim) in space.dimensions() {
            let (lo, hi) = dim.bounds();
            let mid = if dim.is_integral() {
                ((lo + hi) / 2.0).round()
            } else {
                (lo + hi) / 2.0
            };
            let start = space
                .base()
                .get(name)
                .and_then(|v| dim.coordinate(v))
                .unwrap_or(mid);
            center.push(start);
            let quarter = (hi - lo) / 4.0;
            steps.push(if dim.is_integral() {
                quarter.round().max(1.0).min(hi - lo)
            } else {
                quarter
            });
        }
        let mut search = Self {
            space,
            rng: StdRng::seed_from_u64(seed),
            center,
            center_score: None,
            steps,
            min_steps: Vec::new(),
            queue: VecDeque::new(),
            in_flight: None,
            started: false,
            swept: false,
            improved: false,
            exhausted: false,
        };
        search.set_min_step_fraction(Self::MIN_STEP_FRACTION);
        search
    }

    /// Sets the smallest float step as a fraction of each span.
    #[must_use]
    pub fn with_min_step_fraction(mut self, fraction: f64) -> Self {
        self.set_min_step_fraction(fraction);
        self
    }

    fn set_min_step_fraction(&mut self, fraction: f64) {
        self.min_steps = self
            .space
            .dimensions()
            .iter()
            .map(|(_, dim)| {
                let (lo, hi) = dim.bounds();
                if dim.is_integral() {
                    (hi - lo).min(1.0)
                } else {
                    (hi - lo) * fraction.abs()
                }
            })
            .collect();
    }

    /// Current step sizes, one per dimension.
    #[must_use]
    pub fn steps(&self) -> &[f64] {
        &self.steps
    }

    /// Best point found so far.
    #[must_use]
    pub fn center(&self) -> ParameterSet {
        self.to_params(&self.center)
    }

    fn to_params(&self, point: &[f64]) -> ParameterSet {
        let values = self
            .space
            .dimensions()
            .iter()
            .zip(point)
            .map(|((_, dim), &c)| dim.value_at(c));
        self.space.candidate(values)
    }

    /// Halves every step; false if all steps were already minimal.
    fn refine(&mut self) -> bool {
        let minimal = self
            .steps
            .iter()
            .zip(&self.min_steps)
            .all(|(s, m)| s <= m);
        if minimal {
            return false;
        }
        for (i, (_, dim)) in self.space.dimensions().iter().enumerate() {
            let half = self.steps[i] / 2.0;
            let half = if dim.is_integral() { half.floor() } else { half };
            self.steps[i] = half.max(self.min_steps[i]);
        }
        debug!("local search refined steps to {:?}", self.steps);
        true
    }

    /// Queues the neighbours of the center; false once refinement is over.
    fn refill(&mut self) -> bool {
        if self.improved {
            self.improved = false;
        } else if self.swept && !self.refine() {
            return false;
        }
        self.swept = true;

        let mut order: Vec<usize> = (0..self.center.len()).collect();
        order.shuffle(&mut self.rng);
        for i in order {
            let (_, dim) = &self.space.dimensions()[i];
            let (lo, hi) = dim.bounds();
            for sign in [1.0, -1.0] {
                let mut c = (self.center[i] + sign * self.steps[i]).clamp(lo, hi);
                if dim.is_integral() {
                    c = c.round();
                }
                if (c - self.center[i]).abs() <= f64::EPSILON * c.abs().max(1.0) {
                    continue;
                }
                let mut point = self.center.clone();
                point[i] = c;
                if !self.queue.contains(&point) {
                    self.queue.push_back(point);
                }
            }
        }
        true
    }
}

impl SearchStrategy for LocalSearch {
    fn name(&self) -> &'static str {
        "local"
    }

    fn next_candidate(&mut self) -> Option<ParameterSet> {
        if self.exhausted {
            return None;
        }
        if !self.started {
            self.started = true;
            self.in_flight = Some(self.center.clone());
            return Some(self.to_params(&self.center));
        }
        loop {
            if let Some(point) = self.queue.pop_front() {
                let params = self.to_params(&point);
                self.in_flight = Some(point);
                return Some(params);
            }
            if !self.refill() {
                self.exhausted = true;
                return None;
            }
        }
    }

    fn observe(&mut self, _params: &ParameterSet, score: f64) {
        let Some(point) = self.in_flight.take() else {
            return;
        };
        match self.center_score {
            None => self.center_score = Some(score),
            Some(best) if score > best => {
                self.center = point;
                self.center_score = Some(score);
                self.improved = true;
                self.queue.clear();
            }
            Some(_) => {}
        }
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::Dimension;
    use velopix_core::ParamValue;

    fn space_2x2() -> SearchSpace {
        SearchSpace::new(
            ParameterSet::new().with("a", 0.0).with("b", 0_i64).with("fixed", true),
            [
                (
                    "a",
                    Dimension::Float {
                        min: 0.0,
                        max: 1.0,
                        steps: 2,
                    },
                ),
                ("b", Dimension::Int { min: 1, max: 2 }),
            ],
        )
        .unwrap()
    }

    fn drain(strategy: &mut impl SearchStrategy) -> Vec<ParameterSet> {
        let mut out = Vec::new();
        while let Some(p) = strategy.next_candidate() {
            strategy.observe(&p, 0.0);
            out.push(p);
            assert!(out.len() <= 1000, "strategy did not terminate");
        }
        out
    }

    #[test]
    fn test_grid_odometer_order() {
        let mut grid = GridSearch::new(space_2x2());
        assert_eq!(grid.len(), 4);
        let points: Vec<(f64, i64)> = drain(&mut grid)
            .iter()
            .map(|p| (p.float("a").unwrap(), p.int("b").unwrap()))
            .collect();
        assert_eq!(points, vec![(0.0, 1), (0.0, 2), (1.0, 1), (1.0, 2)]);
        assert!(grid.is_exhausted());
        assert!(grid.next_candidate().is_none());
    }

    #[test]
    fn test_grid_without_dimensions_yields_base_once() {
        let base = ParameterSet::new().with("x", 1.0);
        let space = SearchSpace::new(base.clone(), Vec::<(String, Dimension)>::new()).unwrap();
        let mut grid = GridSearch::new(space);
        assert_eq!(drain(&mut grid), vec![base]);
    }

    #[test]
    fn test_random_is_seeded() {
        let mut a = RandomSearch::new(space_2x2(), 7);
        let mut b = RandomSearch::new(space_2x2(), 7);
        for _ in 0..20 {
            let pa = a.next_candidate().unwrap();
            assert_eq!(Some(pa.clone()), b.next_candidate());
            assert_eq!(pa.get("fixed"), Some(&ParamValue::Bool(true)));
        }
        assert!(!a.is_exhausted());
    }

    #[test]
    fn test_local_search_climbs_to_peak() {
        let space = SearchSpace::new(
            ParameterSet::new().with("x", 0.0),
            [(
                "x",
                Dimension::Float {
                    min: -4.0,
                    max: 4.0,
                    steps: 9,
                },
            )],
        )
        .unwrap();
        let mut local = LocalSearch::new(space, 1).with_min_step_fraction(1e-2);
        let mut evaluations = 0;
        while let Some(p) = local.next_candidate() {
            let x = p.float("x").unwrap();
            local.observe(&p, -(x - 1.3) * (x - 1.3));
            evaluations += 1;
            assert!(evaluations < 500, "local search did not terminate");
        }
        let best = local.center().float("x").unwrap();
        assert!((best - 1.3).abs() < 0.1, "ended at {best}");
        assert!(local.is_exhausted());
    }

    #[test]
    fn test_local_search_discrete_terminates() {
        let space = SearchSpace::new(
            ParameterSet::new().with("mode", "b"),
            [(
                "mode",
                Dimension::Discrete(vec!["a".into(), "b".into(), "c".into()]),
            )],
        )
        .unwrap();
        let mut local = LocalSearch::new(space, 0);
        let proposed = drain(&mut local);
        // center, then both neighbours, then exhausted at step 1
        assert_eq!(proposed.len(), 3);
        assert_eq!(proposed[0].choice("mode").unwrap(), "b");
    }
}
