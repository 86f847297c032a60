//! Search by triplet, backed by a prefix trie.
//!
//! 1. Enumerate hit triplets on successive modules (with up to
//!    `allowed_missed_modules` gaps) whose scatter stays below `max_scatter`
//!    and insert them into a [`TripletTrie`].
//! 2. Extend every triplet forward: a candidate ending in `(p, q)` can take
//!    any hit `r` for which `(p, q, r)` is itself a stored triplet. The best
//!    chain after each pair (longest, then lowest scatter) is computed once
//!    and reused by every candidate ending in that pair, so extension costs
//!    one walk per triplet rather than one per path. A walk stops before its
//!    accumulated scatter would exceed `max_residual`.
//! 3. Rank the trie leaves (longest first, then lowest residual) and accept
//!    them greedily so that no hit is used twice.
#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

use std::cmp::Ordering;

use log::debug;
use velopix_core::{
    Event, ParamSpec, ParameterSchema, ParameterSet, ReconstructionAlgorithm, Result, Track,
    TrackCollection,
};

use crate::geometry::{scatter, within_slopes};
use crate::trie::TripletTrie;

/// Search-by-triplet configuration.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TripletTrieConfig {
    /// Maximum |dx/dz| between consecutive hits.
    pub max_slope_x: f64,
    /// Maximum |dy/dz| between consecutive hits.
    pub max_slope_y: f64,
    /// Maximum scatter of a triplet.
    pub max_scatter: f64,
    /// Empty modules allowed between consecutive hits.
    pub allowed_missed_modules: usize,
    /// Maximum accumulated scatter of an extended candidate.
    pub max_residual: f64,
    /// Minimum number of hits of an accepted track.
    pub min_track_length: usize,
    /// Node limit of the trie.
    pub max_trie_nodes: usize,
}

impl Default for TripletTrieConfig {
    fn default() -> Self {
        Self {
            max_slope_x: 0.7,
            max_slope_y: 0.7,
            max_scatter: 0.1,
            allowed_missed_modules: 1,
            max_residual: 0.5,
            min_track_length: 3,
            max_trie_nodes: 1_000_000,
        }
    }
}

impl TripletTrieConfig {
    /// Parameter schema; defaults mirror [`TripletTrieConfig::default`].
    #[must_use]
    pub fn schema() -> ParameterSchema {
        let d = Self::default();
        ParameterSchema::new(
            SearchByTripletTrie::NAME,
            vec![
                ParamSpec::float("max_slope_x", 0.0, 5.0, d.max_slope_x),
                ParamSpec::float("max_slope_y", 0.0, 5.0, d.max_slope_y),
                ParamSpec::float("max_scatter", 0.0, 10.0, d.max_scatter)
                    .describe("maximum scatter of a triplet"),
                ParamSpec::int(
                    "allowed_missed_modules",
                    0,
                    5,
                    d.allowed_missed_modules as i64,
                ),
                ParamSpec::float("max_residual", 0.0, 100.0, d.max_residual)
                    .describe("maximum accumulated scatter of a candidate"),
                ParamSpec::int("min_track_length", 3, 52, d.min_track_length as i64),
                ParamSpec::int("max_trie_nodes", 16, 50_000_000, d.max_trie_nodes as i64)
                    .describe("trie node limit"),
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
            max_scatter: params.float("max_scatter")?,
            allowed_missed_modules: params.usize("allowed_missed_modules")?,
            max_residual: params.float("max_residual")?,
            min_track_length: params.usize("min_track_length")?,
            max_trie_nodes: params.usize("max_trie_nodes")?,
        })
    }

    /// Parameter set equivalent to this configuration.
    #[must_use]
    pub fn to_params(&self) -> ParameterSet {
        ParameterSet::new()
            .with("max_slope_x", self.max_slope_x)
            .with("max_slope_y", self.max_slope_y)
            .with("max_scatter", self.max_scatter)
            .with("allowed_missed_modules", self.allowed_missed_modules as i64)
            .with("max_residual", self.max_residual)
            .with("min_track_length", self.min_track_length as i64)
            .with("max_trie_nodes", self.max_trie_nodes as i64)
    }

    /// Sets the triplet scatter bound.
    #[must_use]
    pub fn with_max_scatter(mut self, scatter: f64) -> Self {
        self.max_scatter = scatter;
        self
    }

    /// Sets the accumulated residual bound.
    #[must_use]
    pub fn with_max_residual(mut self, residual: f64) -> Self {
        self.max_residual = residual;
        self
    }

    /// Sets the trie node limit.
    #[must_use]
    pub fn with_max_trie_nodes(mut self, nodes: usize) -> Self {
        self.max_trie_nodes = nodes;
        self
    }

    /// Sets the minimum track length.
    #[must_use]
    pub fn with_min_track_length(mut self, length: usize) -> Self {
        self.min_track_length = length;
        self
    }
}

/// Best extension chain after a hit pair, shared by every candidate that
/// ends in that pair.
#[derive(Clone, Copy, Default)]
struct Continuation {
    /// Hits appended after the pair.
    len: usize,
    /// Scatter accumulated by those hits.
    residual: f64,
    /// First appended hit and its triplet scatter.
    next: Option<(usize, f64)>,
}

/// Search-by-triplet reconstruction with a trie-backed candidate search.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchByTripletTrie;

impl SearchByTripletTrie {
    /// Algorithm name.
    pub const NAME: &'static str = "SearchByTripletTrie";

    /// Creates a new instance.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Builds the trie of triplets and extended candidates for `event`.
    ///
    /// # Errors
    /// Returns `AlgorithmConvergence` when the trie outgrows its node limit.
    pub fn build_trie(&self, event: &Event, config: &TripletTrieConfig) -> Result<TripletTrie> {
        let hits = event.hits();
        let gap = config.allowed_missed_modules;
        let compatible = |a: usize, b: usize| {
            within_slopes(&hits[a], &hits[b], config.max_slope_x, config.max_slope_y)
        };

        let mut trie = TripletTrie::new(config.max_trie_nodes);

        for l0 in 0..event.num_layers() {
            for i in event.layer_range(l0) {
                for l1 in (l0 + 1)..=(l0 + 1 + gap) {
                    for j in event.layer_range(l1) {
                        if !compatible(i, j) {
                            continue;
                        }
                        for l2 in (l1 + 1)..=(l1 + 1 + gap) {
                            for k in event.layer_range(l2) {
                                if !compatible(j, k) {
                                    continue;
                                }
                                let s = scatter(&hits[i], &hits[j], &hits[k]);
                                if s <= config.max_scatter {
                                    trie.insert_triplet([i, j, k], s)?;
                                }
                            }
                        }
                    }
                }
            }
        }
        let seeds: Vec<usize> = trie.nodes_at_depth(3).collect();
        let best = Self::best_continuations(&trie);

        for &node in &seeds {
            let (mut p, mut q) = trie.last_pair(node);
            let mut tip = node;
            while let Some((r, s)) = Self::continuation_of(&trie, &best, p, q).next {
                if trie.residual(tip) + s > config.max_residual {
                    break;
                }
                tip = trie.extend(tip, r, s)?;
                (p, q) = (q, r);
            }
        }

        debug!(
            "{}: {} triplets, {} trie nodes",
            Self::NAME,
            seeds.len(),
            trie.len()
        );
        Ok(trie)
    }

    /// Best continuation of every stored pair, indexed by the pair's trie
    /// node (`root → p → q`).
    ///
    /// A continuation of `(p, q)` through `r` ends in the pair `(q, r)` with
    /// `r > q`, so visiting pairs by decreasing second hit sees every tail
    /// before the pairs that lead into it.
    fn best_continuations(trie: &TripletTrie) -> Vec<Continuation> {
        let mut best = vec![Continuation::default(); trie.len()];
        let mut pairs: Vec<usize> = trie.nodes_at_depth(2).collect();
        pairs.sort_by_key(|&pair| std::cmp::Reverse(trie.hit(pair)));

        for pair in pairs {
            let (p, q) = trie.last_pair(pair);
            let mut chosen: Option<Continuation> = None;
            for (r, s) in trie.continuations(p, q) {
                let tail = Self::continuation_of(trie, &best, q, r);
                let candidate = Continuation {
                    len: tail.len + 1,
                    residual: tail.residual + s,
                    next: Some((r, s)),
                };
                if chosen.is_none_or(|c| Self::prefers(trie, &best, q, &candidate, &c)) {
                    chosen = Some(candidate);
                }
            }
            if let Some(c) = chosen {
                best[pair] = c;
            }
        }
        best
    }

    fn continuation_of(
        trie: &TripletTrie,
        best: &[Continuation],
        p: usize,
        q: usize,
    ) -> Continuation {
        trie.lookup(&[p, q])
            .and_then(|pair| best.get(pair).copied())
            .unwrap_or_default()
    }

    /// Longer, then lower residual, then lexicographically smaller hits.
    fn prefers(
        trie: &TripletTrie,
        best: &[Continuation],
        q: usize,
        a: &Continuation,
        b: &Continuation,
    ) -> bool {
        match a.len.cmp(&b.len) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => match a.residual.total_cmp(&b.residual) {
                Ordering::Less => true,
                Ordering::Greater => false,
                Ordering::Equal => {
                    Self::chain(trie, best, q, *a) < Self::chain(trie, best, q, *b)
                }
            },
        }
    }

    /// Hits appended after a pair ending in `q` when following `step`.
    fn chain(
        trie: &TripletTrie,
        best: &[Continuation],
        mut q: usize,
        mut step: Continuation,
    ) -> Vec<usize> {
        let mut hits = Vec::with_capacity(step.len);
        while let Some((r, _)) = step.next {
            hits.push(r);
            step = Self::continuation_of(trie, best, q, r);
            q = r;
        }
        hits
    }

    /// Reconstructs tracks with an already validated configuration.
    ///
    /// # Errors
    /// Returns `AlgorithmConvergence` when the trie outgrows its node limit.
    pub fn reconstruct_with(
        &self,
        event: &Event,
        config: &TripletTrieConfig,
    ) -> Result<TrackCollection> {
        let hits = event.hits();
        let trie = self.build_trie(event, config)?;

        let mut candidates: Vec<(Vec<usize>, f64)> = trie
            .leaves(config.min_track_length.max(3))
            .map(|leaf| (trie.path(leaf), trie.residual(leaf)))
            .collect();
        candidates.sort_by(|(pa, ra), (pb, rb)| {
            pb.len()
                .cmp(&pa.len())
                .then_with(|| ra.total_cmp(rb))
                .then_with(|| pa.cmp(pb))
        });

        let mut used = vec![false; hits.len()];
        let mut tracks = Vec::new();
        for (path, _) in candidates {
            if path.iter().any(|&i| used[i]) {
                continue;
            }
            for &i in &path {
                used[i] = true;
            }
            tracks.push(path.iter().map(|&i| hits[i].id).collect::<Track>());
        }

        debug!(
            "{}: {} tracks from {} hits",
            Self::NAME,
            tracks.len(),
            hits.len()
        );
        Ok(TrackCollection::new(tracks, true))
    }
}

impl ReconstructionAlgorithm for SearchByTripletTrie {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn schema(&self) -> ParameterSchema {
        TripletTrieConfig::schema()
    }

    fn min_hits(&self) -> usize {
        3
    }

    fn shares_hits(&self, params: &ParameterSet) -> Result<bool> {
        TripletTrieConfig::from_params(params)?;
        Ok(false)
    }

    fn reconstruct(&self, event: &Event, params: &ParameterSet) -> Result<TrackCollection> {
        let config = TripletTrieConfig::from_params(params)?;
        self.check_hits(event)?;
        self.reconstruct_with(event, &config)
    }
}
