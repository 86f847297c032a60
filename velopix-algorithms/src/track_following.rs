//! Track-following reconstruction.
//!
//! Seeds are hit pairs starting from the earliest module. Each seed is
//! extended greedily module by module: the line through the last two hits
//! is extrapolated to the next module and the closest unused hit inside the
//! search window is appended. A module without a qualifying hit counts as
//! missed; the candidate closes once the missed budget is exceeded or the
//! detector ends.
//!
//! Key characteristics:
//! - Hits are used by at most one track
//! - Deterministic: ties go to the lowest hit id
//! - Complexity: O(n² · m) worst case for n hits on m modules
#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

use log::debug;
use velopix_core::{
    Event, ParamSpec, ParameterSchema, ParameterSet, ReconstructionAlgorithm, Result,
    Track, TrackCollection,
};

use crate::geometry::{extrapolate, within_slopes, DistanceMetric};

/// Track-following configuration.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackFollowingConfig {
    /// Maximum |dx/dz| of a seed pair.
    pub max_slope_x: f64,
    /// Maximum |dy/dz| of a seed pair.
    pub max_slope_y: f64,
    /// Search window around the extrapolated position.
    pub max_tolerance: f64,
    /// Modules a candidate may cross without picking up a hit.
    pub max_missed_layers: usize,
    /// Minimum number of hits of an accepted track.
    pub min_track_length: usize,
    /// Metric for the extrapolation residual.
    pub distance_metric: DistanceMetric,
}

impl Default for TrackFollowingConfig {
    fn default() -> Self {
        Self {
            max_slope_x: 0.7,
            max_slope_y: 0.7,
            max_tolerance: 0.4,
            max_missed_layers: 1,
            min_track_length: 3,
            distance_metric: DistanceMetric::Euclidean,
        }
    }
}

impl TrackFollowingConfig {
    /// Parameter schema; defaults mirror [`TrackFollowingConfig::default`].
    #[must_use]
    pub fn schema() -> ParameterSchema {
        let d = Self::default();
        ParameterSchema::new(
            TrackFollowing::NAME,
            vec![
                ParamSpec::float("max_slope_x", 0.0, 5.0, d.max_slope_x)
                    .describe("maximum |dx/dz| of a seed pair"),
                ParamSpec::float("max_slope_y", 0.0, 5.0, d.max_slope_y)
                    .describe("maximum |dy/dz| of a seed pair"),
                ParamSpec::float("max_tolerance", 0.0, 10.0, d.max_tolerance)
                    .describe("search window around the extrapolated position"),
                ParamSpec::int("max_missed_layers", 0, 5, d.max_missed_layers as i64)
                    .describe("modules a candidate may skip"),
                ParamSpec::int("min_track_length", 2, 52, d.min_track_length as i64)
                    .describe("minimum hits of an accepted track"),
                ParamSpec::choice("distance_metric", &DistanceMetric::LABELS, "euclidean")
                    .describe("residual metric"),
            ],
        )
    }

    /// Builds a configuration from a parameter set.
    ///
    /// # Errors
    /// Returns `InvalidParameter` if the set violates the schema.
    pub fn from_params(params: &ParameterSet) -> Result<Self> {
        Self::schema().validate(params)?;
        Ok(Self {
            max_slope_x: params.float("max_slope_x")?,
            max_slope_y: params.float("max_slope_y")?,
            max_tolerance: params.float("max_tolerance")?,
            max_missed_layers: params.usize("max_missed_layers")?,
            min_track_length: params.usize("min_track_length")?,
            distance_metric: params.choice("distance_metric")?.parse()?,
        })
    }

    /// Sets the search window.
    #[must_use]
    pub fn with_max_tolerance(mut self, tolerance: f64) -> Self {
        self.max_tolerance = tolerance;
        self
    }

    /// Sets the missed-module budget.
    #[must_use]
    pub fn with_max_missed_layers(mut self, missed: usize) -> Self {
        self.max_missed_layers = missed;
        self
    }

    /// Sets the minimum track length.
    #[must_use]
    pub fn with_min_track_length(mut self, length: usize) -> Self {
        self.min_track_length = length;
        self
    }

    /// Sets the residual metric.
    #[must_use]
    pub fn with_distance_metric(mut self, metric: DistanceMetric) -> Self {
        self.distance_metric = metric;
        self
    }

    /// Parameter set equivalent to this configuration.
    #[must_use]
    pub fn to_params(&self) -> ParameterSet {
        ParameterSet::new()
            .with("max_slope_x", self.max_slope_x)
            .with("max_slope_y", self.max_slope_y)
            .with("max_tolerance", self.max_tolerance)
            .with("max_missed_layers", self.max_missed_layers as i64)
            .with("min_track_length", self.min_track_length as i64)
            .with(
                "distance_metric",
                DistanceMetric::LABELS[self.distance_metric as usize],
            )
    }
}

/// A candidate grown from one seed pair.
struct Candidate {
    /// Hit indices in module order.
    hits: Vec<usize>,
    /// Sum of extrapolation residuals.
    residual: f64,
}

impl Candidate {
    fn beats(&self, other: &Self) -> bool {
        self.hits.len() > other.hits.len()
            || (self.hits.len() == other.hits.len() && self.residual < other.residual)
    }
}

/// Track-following reconstruction.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackFollowing;

impl TrackFollowing {
    /// Algorithm name.
    pub const NAME: &'static str = "TrackFollowing";

    /// Creates a new track-following instance.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Reconstructs tracks with an already validated configuration.
    #[must_use]
    pub fn reconstruct_with(&self, event: &Event, config: &TrackFollowingConfig) -> TrackCollection {
        let hits = event.hits();
        let num_layers = event.num_layers();
        let mut used = vec![false; hits.len()];
        let mut tracks = Vec::new();

        for layer in 0..num_layers {
            for seed in event.layer_range(layer) {
                if used[seed] {
                    continue;
                }

                let mut best: Option<Candidate> = None;
                for next in (layer + 1)..=(layer + 1 + config.max_missed_layers) {
                    for partner in event.layer_range(next) {
                        if used[partner]
                            || !within_slopes(
                                &hits[seed],
                                &hits[partner],
                                config.max_slope_x,
                                config.max_slope_y,
                            )
                        {
                            continue;
                        }
                        let skipped = next - layer - 1;
                        let candidate = Self::follow(event, &used, seed, partner, skipped, config);
                        if best.as_ref().is_none_or(|b| candidate.beats(b)) {
                            best = Some(candidate);
                        }
                    }
                }

                if let Some(candidate) = best {
                    if candidate.hits.len() >= config.min_track_length {
                        for &i in &candidate.hits {
                            used[i] = true;
                        }
                        tracks.push(candidate.hits.iter().map(|&i| hits[i].id).collect::<Track>());
                    }
                }
            }
        }

        debug!(
            "{}: {} tracks from {} hits",
            Self::NAME,
            tracks.len(),
            hits.len()
        );
        TrackCollection::new(tracks, true)
    }

    /// Greedily extends the seed `(first, second)` through the following modules.
    fn follow(
        event: &Event,
        used: &[bool],
        first: usize,
        second: usize,
        skipped: usize,
        config: &TrackFollowingConfig,
    ) -> Candidate {
        let hits = event.hits();
        let mut path = vec![first, second];
        let mut residual = 0.0;
        let mut missed = skipped;
        let mut layer = usize::from(hits[second].module) + 1;

        while layer < event.num_layers() {
            let a = &hits[path[path.len() - 2]];
            let b = &hits[path[path.len() - 1]];

            // Hits within a module are sorted by id, so strict `<` keeps the
            // lowest id on ties.
            let mut closest: Option<(usize, f64)> = None;
            for i in event.layer_range(layer) {
                if used[i] {
                    continue;
                }
                let hit = &hits[i];
                if hit.z <= b.z {
                    continue;
                }
                let (px, py) = extrapolate(a, b, hit.z);
                let d = config.distance_metric.distance(hit.x - px, hit.y - py);
                if d <= config.max_tolerance && closest.is_none_or(|(_, best)| d < best) {
                    closest = Some((i, d));
                }
            }

            match closest {
                Some((i, d)) => {
                    path.push(i);
                    residual += d;
                }
                None => {
                    missed += 1;
                    if missed > config.max_missed_layers {
                        break;
                    }
                }
            }
            layer += 1;
        }

        Candidate {
            hits: path,
            residual,
        }
    }
}

impl ReconstructionAlgorithm for TrackFollowing {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn schema(&self) -> ParameterSchema {
        TrackFollowingConfig::schema()
    }

    fn min_hits(&self) -> usize {
        2
    }

    fn shares_hits(&self, params: &ParameterSet) -> Result<bool> {
        TrackFollowingConfig::from_params(params)?;
        Ok(false)
    }

    fn reconstruct(&self, event: &Event, params: &ParameterSet) -> Result<TrackCollection> {
        let config = TrackFollowingConfig::from_params(params)?;
        self.check_hits(event)?;
        Ok(self.reconstruct_with(event, &config))
    }
}
