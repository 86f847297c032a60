//! Graph-based reconstruction with depth-first search.
//!
//! Hits are nodes; directed edges connect hits on successive modules (up to
//! `allowed_skip_modules` apart) whose slope is within bounds. From every
//! unvisited seed, in module order, an explicit-stack DFS walks compatible
//! paths: consecutive edges may not change slope by more than `max_scatter`.
//!
//! Two search modes:
//! - `first`: keep the first maximal path long enough to be a track
//! - `all_maximal`: keep the longest maximal path. Since the scatter cut
//!   depends on the incoming edge, the best suffix is memoized per edge, so
//!   the search stays linear in the number of edges instead of enumerating
//!   every path.
//!
//! Whether tracks may share hits is a declared parameter
//! (`allow_shared_hits`); with sharing disabled the result is exclusive.
#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;

use log::debug;
use velopix_core::{
    Error, Event, Hit, ParamSpec, ParameterSchema, ParameterSet, ReconstructionAlgorithm, Result,
    Track, TrackCollection,
};

use crate::geometry::{slope_change, within_slopes};

/// DFS search mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SearchMode {
    /// Stop at the first maximal path of sufficient length.
    First,
    /// Keep the longest maximal path.
    #[default]
    AllMaximal,
}

impl SearchMode {
    /// Labels accepted by [`FromStr`].
    pub const LABELS: [&'static str; 2] = ["first", "all_maximal"];

    /// Schema label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::First => "first",
            Self::AllMaximal => "all_maximal",
        }
    }
}

impl FromStr for SearchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "first" => Ok(Self::First),
            "all_maximal" => Ok(Self::AllMaximal),
            other => Err(Error::invalid_parameter(
                "search_mode",
                format!("unknown mode `{other}`"),
            )),
        }
    }
}

/// Graph-DFS configuration.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GraphDfsConfig {
    /// Maximum |dx/dz| of an edge.
    pub max_slope_x: f64,
    /// Maximum |dy/dz| of an edge.
    pub max_slope_y: f64,
    /// Maximum slope change between consecutive edges, per axis.
    pub max_scatter: f64,
    /// Modules an edge may skip.
    pub allowed_skip_modules: usize,
    /// Minimum number of hits of an accepted track.
    pub min_track_length: usize,
    /// DFS mode.
    pub search_mode: SearchMode,
    /// Allow hits to be shared between tracks.
    pub allow_shared_hits: bool,
    /// Per-seed safety bound: maximal paths walked in `first` mode, edge
    /// states evaluated in `all_maximal` mode.
    pub max_explored_paths: usize,
}

impl Default for GraphDfsConfig {
    fn default() -> Self {
        Self {
            max_slope_x: 0.7,
            max_slope_y: 0.7,
            max_scatter: 0.1,
            allowed_skip_modules: 1,
            min_track_length: 3,
            search_mode: SearchMode::AllMaximal,
            allow_shared_hits: false,
            max_explored_paths: 100_000,
        }
    }
}

impl GraphDfsConfig {
    /// Parameter schema; defaults mirror [`GraphDfsConfig::default`].
    #[must_use]
    pub fn schema() -> ParameterSchema {
        let d = Self::default();
        ParameterSchema::new(
            GraphDfs::NAME,
            vec![
                ParamSpec::float("max_slope_x", 0.0, 5.0, d.max_slope_x),
                ParamSpec::float("max_slope_y", 0.0, 5.0, d.max_slope_y),
                ParamSpec::float("max_scatter", 0.0, 5.0, d.max_scatter)
                    .describe("maximum slope change between consecutive edges"),
                ParamSpec::int("allowed_skip_modules", 0, 5, d.allowed_skip_modules as i64),
                ParamSpec::int("min_track_length", 2, 52, d.min_track_length as i64),
                ParamSpec::choice("search_mode", &SearchMode::LABELS, d.search_mode.label()),
                ParamSpec::bool("allow_shared_hits", d.allow_shared_hits)
                    .describe("whether tracks may share hits"),
                ParamSpec::int(
                    "max_explored_paths",
                    1,
                    100_000_000,
                    d.max_explored_paths as i64,
                )
                .describe("per-seed safety bound on explored paths"),
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
            allowed_skip_modules: params.usize("allowed_skip_modules")?,
            min_track_length: params.usize("min_track_length")?,
            search_mode: params.choice("search_mode")?.parse()?,
            allow_shared_hits: params.bool("allow_shared_hits")?,
            max_explored_paths: params.usize("max_explored_paths")?,
        })
    }

    /// Parameter set equivalent to this configuration.
    #[must_use]
    pub fn to_params(&self) -> ParameterSet {
        ParameterSet::new()
            .with("max_slope_x", self.max_slope_x)
            .with("max_slope_y", self.max_slope_y)
            .with("max_scatter", self.max_scatter)
            .with("allowed_skip_modules", self.allowed_skip_modules as i64)
            .with("min_track_length", self.min_track_length as i64)
            .with("search_mode", self.search_mode.label())
            .with("allow_shared_hits", self.allow_shared_hits)
            .with("max_explored_paths", self.max_explored_paths as i64)
    }

    /// Sets the search mode.
    #[must_use]
    pub fn with_search_mode(mut self, mode: SearchMode) -> Self {
        self.search_mode = mode;
        self
    }

    /// Allows or forbids shared hits.
    #[must_use]
    pub fn with_shared_hits(mut self, allow: bool) -> Self {
        self.allow_shared_hits = allow;
        self
    }

    /// Sets the per-seed path limit.
    #[must_use]
    pub fn with_max_explored_paths(mut self, paths: usize) -> Self {
        self.max_explored_paths = paths;
        self
    }

    /// Sets the slope-change tolerance.
    #[must_use]
    pub fn with_max_scatter(mut self, scatter: f64) -> Self {
        self.max_scatter = scatter;
        self
    }
}

/// One DFS frame; `parent` indexes the frame arena.
#[derive(Clone, Copy)]
struct Frame {
    node: usize,
    parent: Option<usize>,
    depth: usize,
}

/// Longest compatible continuation after the edge `prev → node`.
#[derive(Clone, Copy, Default)]
struct Suffix {
    /// Hits after `node`.
    len: usize,
    residual: f64,
    next: Option<usize>,
}

/// Best suffixes keyed by incoming edge. Entries stay valid while the set of
/// used hits is unchanged.
type SuffixMemo = HashMap<(usize, usize), Suffix>;

fn suffix_of(memo: &SuffixMemo, prev: usize, node: usize) -> Suffix {
    memo.get(&(prev, node)).copied().unwrap_or_default()
}

/// Hits following `node` along memoized best suffixes.
fn suffix_hits(memo: &SuffixMemo, mut prev: usize, mut node: usize) -> Vec<usize> {
    let mut hits = Vec::new();
    while let Some(next) = suffix_of(memo, prev, node).next {
        hits.push(next);
        prev = node;
        node = next;
    }
    hits
}

/// Orders two continuations of `node`: longer, then smoother, then
/// lexicographically smaller hit sequence.
fn better_suffix(memo: &SuffixMemo, node: usize, a: &Suffix, b: &Suffix) -> bool {
    match a.len.cmp(&b.len) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => match a.residual.total_cmp(&b.residual) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => {
                let sequence = |s: &Suffix| {
                    s.next.map_or_else(Vec::new, |first| {
                        let mut hits = vec![first];
                        hits.extend(suffix_hits(memo, node, first));
                        hits
                    })
                };
                sequence(a) < sequence(b)
            }
        },
    }
}

/// Forward adjacency lists, indexed like `event.hits()`.
struct HitGraph {
    edges: Vec<Vec<usize>>,
}

impl HitGraph {
    fn build(event: &Event, config: &GraphDfsConfig) -> Self {
        let hits = event.hits();
        let mut edges = vec![Vec::new(); hits.len()];
        for (i, targets) in edges.iter_mut().enumerate() {
            let layer = usize::from(hits[i].module);
            for next in (layer + 1)..=(layer + 1 + config.allowed_skip_modules) {
                targets.extend(event.layer_range(next).filter(|&j| {
                    within_slopes(&hits[i], &hits[j], config.max_slope_x, config.max_slope_y)
                }));
            }
        }
        Self { edges }
    }

    /// Unused successors of `node` as `(slope change², hit)`. After an
    /// incoming edge from `prev`, successors beyond the scatter cut are
    /// dropped; the first edge of a path costs nothing.
    fn continuations(
        &self,
        hits: &[Hit],
        used: &[bool],
        prev: Option<usize>,
        node: usize,
        config: &GraphDfsConfig,
        out: &mut Vec<(f64, usize)>,
    ) {
        out.clear();
        for &next in &self.edges[node] {
            if used[next] {
                continue;
            }
            let cost = match prev {
                None => 0.0,
                Some(p) => match slope_change(&hits[p], &hits[node], &hits[next]) {
                    Some((dtx, dty)) if dtx <= config.max_scatter && dty <= config.max_scatter => {
                        dtx * dtx + dty * dty
                    }
                    _ => continue,
                },
            };
            out.push((cost, next));
        }
    }

    fn num_edges(&self) -> usize {
        self.edges.iter().map(Vec::len).sum()
    }
}

/// Graph-DFS reconstruction.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphDfs;

impl GraphDfs {
    /// Algorithm name.
    pub const NAME: &'static str = "GraphDFS";

    /// Creates a new instance.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Reconstructs tracks with an already validated configuration.
    ///
    /// # Errors
    /// Returns `AlgorithmConvergence` if a path exceeds the layer count or a
    /// seed exhausts `max_explored_paths`.
    pub fn reconstruct_with(
        &self,
        event: &Event,
        config: &GraphDfsConfig,
    ) -> Result<TrackCollection> {
        let hits = event.hits();
        let graph = HitGraph::build(event, config);
        let mut visited = vec![false; hits.len()];
        let mut used = vec![false; hits.len()];
        let mut memo = SuffixMemo::new();
        let mut tracks = Vec::new();

        for seed in 0..hits.len() {
            if visited[seed] || used[seed] {
                continue;
            }
            visited[seed] = true;

            let found = match config.search_mode {
                SearchMode::First => Self::first_path(event, &graph, &used, seed, config)?,
                SearchMode::AllMaximal => {
                    Self::longest_path(event, &graph, &used, seed, config, &mut memo)?
                }
            };
            if let Some(path) = found {
                for &i in &path {
                    visited[i] = true;
                    if !config.allow_shared_hits {
                        used[i] = true;
                    }
                }
                if !config.allow_shared_hits {
                    memo.clear();
                }
                tracks.push(path.iter().map(|&i| hits[i].id).collect::<Track>());
            }
        }

        debug!(
            "{}: {} tracks from {} hits, {} edges",
            Self::NAME,
            tracks.len(),
            hits.len(),
            graph.num_edges()
        );
        Ok(TrackCollection::new(tracks, !config.allow_shared_hits))
    }

    fn too_many_paths(config: &GraphDfsConfig, seed: &Hit) -> Error {
        Error::AlgorithmConvergence {
            algorithm: Self::NAME,
            reason: format!(
                "more than {} paths explored from hit {}",
                config.max_explored_paths, seed.id
            ),
        }
    }

    fn too_deep(depth: usize, layers: usize) -> Error {
        Error::AlgorithmConvergence {
            algorithm: Self::NAME,
            reason: format!("path depth {depth} exceeds {layers} layers"),
        }
    }

    /// Explicit-stack DFS from `seed`, smoothest continuation first. Returns
    /// the first maximal path of at least `min_track_length` hits.
    fn first_path(
        event: &Event,
        graph: &HitGraph,
        used: &[bool],
        seed: usize,
        config: &GraphDfsConfig,
    ) -> Result<Option<Vec<usize>>> {
        let hits = event.hits();
        let max_depth = event.num_layers();
        let mut arena = vec![Frame {
            node: seed,
            parent: None,
            depth: 1,
        }];
        let mut stack = vec![0usize];
        let mut explored = 0usize;
        let mut children = Vec::new();

        while let Some(index) = stack.pop() {
            let frame = arena[index];
            if frame.depth > max_depth {
                return Err(Self::too_deep(frame.depth, max_depth));
            }

            let prev = frame.parent.map(|p| arena[p].node);
            graph.continuations(hits, used, prev, frame.node, config, &mut children);

            if children.is_empty() {
                explored += 1;
                if explored > config.max_explored_paths {
                    return Err(Self::too_many_paths(config, &hits[seed]));
                }
                if frame.depth >= config.min_track_length {
                    return Ok(Some(Self::unwind(&arena, index)));
                }
                continue;
            }

            // Best continuation on top of the stack.
            children.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            for &(_, next) in children.iter().rev() {
                arena.push(Frame {
                    node: next,
                    parent: Some(index),
                    depth: frame.depth + 1,
                });
                stack.push(arena.len() - 1);
            }
        }

        Ok(None)
    }

    /// Longest compatible path from `seed` (ties: lower residual, then
    /// smaller hit indices).
    ///
    /// The best suffix after each edge is computed once, on an explicit
    /// post-order stack, and shared by every path entering that edge.
    fn longest_path(
        event: &Event,
        graph: &HitGraph,
        used: &[bool],
        seed: usize,
        config: &GraphDfsConfig,
        memo: &mut SuffixMemo,
    ) -> Result<Option<Vec<usize>>> {
        let hits = event.hits();
        let mut children = Vec::new();
        let mut evaluated = 0usize;

        graph.continuations(hits, used, None, seed, config, &mut children);
        let roots: Vec<usize> = children.iter().map(|&(_, next)| next).collect();
        let mut stack: Vec<(usize, usize, bool)> =
            roots.iter().map(|&next| (seed, next, false)).collect();

        while let Some((prev, node, expanded)) = stack.pop() {
            if memo.contains_key(&(prev, node)) {
                continue;
            }
            graph.continuations(hits, used, Some(prev), node, config, &mut children);

            if !expanded {
                stack.push((prev, node, true));
                stack.extend(
                    children
                        .iter()
                        .filter(|&&(_, next)| !memo.contains_key(&(node, next)))
                        .map(|&(_, next)| (node, next, false)),
                );
                continue;
            }

            evaluated += 1;
            if evaluated > config.max_explored_paths {
                return Err(Self::too_many_paths(config, &hits[seed]));
            }
            let mut best = Suffix::default();
            for &(cost, next) in &children {
                let tail = suffix_of(memo, node, next);
                let candidate = Suffix {
                    len: tail.len + 1,
                    residual: tail.residual + cost,
                    next: Some(next),
                };
                if best.next.is_none() || better_suffix(memo, node, &candidate, &best) {
                    best = candidate;
                }
            }
            memo.insert((prev, node), best);
        }

        let mut best = Suffix::default();
        for &next in &roots {
            let tail = suffix_of(memo, seed, next);
            let candidate = Suffix {
                len: tail.len + 1,
                residual: tail.residual,
                next: Some(next),
            };
            if best.next.is_none() || better_suffix(memo, seed, &candidate, &best) {
                best = candidate;
            }
        }

        let length = best.len + 1;
        if length > event.num_layers() {
            return Err(Self::too_deep(length, event.num_layers()));
        }
        if length < config.min_track_length {
            return Ok(None);
        }
        let mut path = vec![seed];
        if let Some(first) = best.next {
            path.push(first);
            path.extend(suffix_hits(memo, seed, first));
        }
        Ok(Some(path))
    }

    fn unwind(arena: &[Frame], mut index: usize) -> Vec<usize> {
        let mut path = vec![arena[index].node];
        while let Some(parent) = arena[index].parent {
            path.push(arena[parent].node);
            index = parent;
        }
        path.reverse();
        path
    }
}

impl ReconstructionAlgorithm for GraphDfs {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn schema(&self) -> ParameterSchema {
        GraphDfsConfig::schema()
    }

    fn min_hits(&self) -> usize {
        2
    }

    fn shares_hits(&self, params: &ParameterSet) -> Result<bool> {
        Ok(GraphDfsConfig::from_params(params)?.allow_shared_hits)
    }

    fn reconstruct(&self, event: &Event, params: &ParameterSet) -> Result<TrackCollection> {
        let config = GraphDfsConfig::from_params(params)?;
        self.check_hits(event)?;
        self.reconstruct_with(event, &config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use velopix_core::HitId;

    fn ids(tracks: &TrackCollection) -> Vec<Vec<u32>> {
        tracks
            .iter()
            .map(|t| t.iter().map(|h| h.0).collect())
            .collect()
    }

    fn line(first_id: u32, x0: f64, tx: f64, modules: std::ops::Range<u16>) -> Vec<Hit> {
        modules
            .enumerate()
            .map(|(k, m)| {
                let z = f64::from(m) * 10.0;
                Hit::new(first_id + k as u32, x0 + tx * z, 0.0, z, m)
            })
            .collect()
    }

    /// A straight line through modules 0..5 plus a stray hit on module 2
    /// that continues the first two hits with a small kink.
    fn forked_event() -> Event {
        let mut hits = line(0, 0.0, 0.0, 0..5);
        hits.push(Hit::new(50, 0.5, 0.0, 20.0, 2));
        Event::new(hits, None).unwrap()
    }

    #[test]
    fn test_straight_line() {
        let event = Event::new(line(0, 0.0, 0.02, 0..4), None).unwrap();
        let tracks = GraphDfs::new()
            .reconstruct(&event, &GraphDfsConfig::schema().defaults())
            .unwrap();
        assert_eq!(ids(&tracks), vec![vec![0, 1, 2, 3]]);
        assert!(tracks.exclusive);
    }

    #[test]
    fn test_all_maximal_prefers_longest() {
        let tracks = GraphDfs::new()
            .reconstruct(&forked_event(), &GraphDfsConfig::default().to_params())
            .unwrap();
        assert_eq!(ids(&tracks)[0], vec![0, 1, 2, 3, 4]);
    }

    /// A straight stub over modules 0..3 whose smooth end (id 3) stops
    /// there, and a gently bending branch (ids 10..12) reaching module 5.
    fn early_end_event() -> Event {
        let mut hits = line(0, 0.0, 0.0, 0..4);
        hits.push(Hit::new(10, 0.8, 0.0, 30.0, 3));
        hits.push(Hit::new(11, 1.6, 0.0, 40.0, 4));
        hits.push(Hit::new(12, 2.4, 0.0, 50.0, 5));
        Event::new(hits, None).unwrap()
    }

    #[test]
    fn test_first_mode_stops_at_first_sufficient_path() {
        let event = early_end_event();
        let first = GraphDfsConfig::default()
            .with_search_mode(SearchMode::First)
            .to_params();
        let tracks = GraphDfs::new().reconstruct(&event, &first).unwrap();
        assert_eq!(ids(&tracks), vec![vec![0, 1, 2, 3], vec![10, 11, 12]]);

        let all = GraphDfsConfig::default()
            .with_search_mode(SearchMode::AllMaximal)
            .to_params();
        let tracks = GraphDfs::new().reconstruct(&event, &all).unwrap();
        assert_eq!(ids(&tracks), vec![vec![0, 1, 2, 10, 11, 12]]);
    }

    #[test]
    fn test_full_detector_line_with_defaults() {
        let event = Event::new(line(0, 0.5, 0.01, 0..52), None).unwrap();
        for mode in [SearchMode::AllMaximal, SearchMode::First] {
            let params = GraphDfsConfig::default().with_search_mode(mode).to_params();
            let tracks = GraphDfs::new().reconstruct(&event, &params).unwrap();
            assert_eq!(tracks.len(), 1, "{mode:?}");
            assert_eq!(tracks.tracks[0].len(), 52, "{mode:?}");
        }
    }

    /// Two lines crossing at hit 2 on module 2.
    fn crossing_event() -> Event {
        let mut hits = Vec::new();
        for m in 0..5u16 {
            let z = f64::from(m) * 10.0;
            let x = 0.02 * (z - 20.0);
            hits.push(Hit::new(u32::from(m), x, 0.0, z, m));
            if m != 2 {
                hits.push(Hit::new(100 + u32::from(m), -x, 0.0, z, m));
            }
        }
        Event::new(hits, None).unwrap()
    }

    #[test]
    fn test_shared_hits_follow_flag() {
        let event = crossing_event();

        let exclusive = GraphDfsConfig::default().to_params();
        let tracks = GraphDfs::new().reconstruct(&event, &exclusive).unwrap();
        assert!(tracks.exclusive);
        assert!(!GraphDfs::new().shares_hits(&exclusive).unwrap());
        assert_eq!(
            ids(&tracks),
            vec![vec![0, 1, 2, 3, 4], vec![100, 101, 103, 104]]
        );
        assert!(tracks.shared_hits().is_empty());

        let shared = GraphDfsConfig::default().with_shared_hits(true).to_params();
        let tracks = GraphDfs::new().reconstruct(&event, &shared).unwrap();
        assert!(!tracks.exclusive);
        assert!(GraphDfs::new().shares_hits(&shared).unwrap());
        assert_eq!(
            ids(&tracks),
            vec![vec![0, 1, 2, 3, 4], vec![100, 101, 2, 103, 104]]
        );
        assert_eq!(tracks.shared_hits(), vec![HitId(2)]);
    }

    #[test]
    fn test_explored_path_limit() {
        // Three hits per module on a straight band: many maximal paths.
        let mut hits = Vec::new();
        let mut id = 0;
        for m in 0..6u16 {
            for k in 0..3 {
                let z = f64::from(m) * 10.0;
                hits.push(Hit::new(id, f64::from(k) * 0.1, 0.0, z, m));
                id += 1;
            }
        }
        let event = Event::new(hits, None).unwrap();
        let params = GraphDfsConfig::default()
            .with_max_explored_paths(2)
            .to_params();
        assert!(matches!(
            GraphDfs::new().reconstruct(&event, &params),
            Err(Error::AlgorithmConvergence { .. })
        ));
    }

    #[test]
    fn test_deterministic() {
        let event = forked_event();
        let params = GraphDfsConfig::default().to_params();
        let first = GraphDfs::new().reconstruct(&event, &params).unwrap();
        for _ in 0..5 {
            assert_eq!(GraphDfs::new().reconstruct(&event, &params).unwrap(), first);
        }
    }
}
