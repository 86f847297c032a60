//! Event metrics: scoring reconstructed tracks against ground truth.
//!
//! Matching rule: a reconstructed track is matched to the truth track that
//! contributes the largest fraction of its hits, provided that fraction is
//! strictly above [`MetricsConfig::match_threshold`]. Ties between truth
//! tracks go to the lowest truth id. Unmatched reconstructed tracks are
//! ghosts; every match to an already matched truth track is a clone.
#![allow(clippy::cast_precision_loss)]

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Add;

use log::debug;

use crate::error::{Error, Result};
use crate::event::{Event, TruthTrack};
use crate::hit::HitId;
use crate::track::TrackCollection;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for the metrics calculator.
///
/// The defaults count only reconstructible truth tracks (at least
/// `min_truth_hits` hits) in the efficiency denominator.
/// `with_min_truth_hits(0)` counts every truth track, giving the plain
/// matched-truth / all-truth efficiency. Clone rate is always taken over
/// matched reconstructed tracks, which keeps it within `[0, 1]`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MetricsConfig {
    /// Minimum shared-hit fraction (exclusive) for a match.
    pub match_threshold: f64,
    /// Truth tracks with fewer hits are not reconstructible and do not
    /// count toward efficiency.
    pub min_truth_hits: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.7,
            min_truth_hits: 3,
        }
    }
}

impl MetricsConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the matching threshold.
    #[must_use]
    pub fn with_match_threshold(mut self, threshold: f64) -> Self {
        self.match_threshold = threshold;
        self
    }

    /// Sets the minimum hit count of a reconstructible truth track.
    #[must_use]
    pub fn with_min_truth_hits(mut self, hits: usize) -> Self {
        self.min_truth_hits = hits;
        self
    }
}

/// Raw counts behind a [`MetricReport`]; additive across events.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MetricCounts {
    /// Reconstructible truth tracks.
    pub truth_tracks: usize,
    /// Reconstructible truth tracks matched at least once.
    pub truth_matched: usize,
    /// Reconstructed tracks.
    pub reconstructed: usize,
    /// Reconstructed tracks matched to a truth track.
    pub matched: usize,
    /// Reconstructed tracks without a match.
    pub ghosts: usize,
    /// Matches beyond the first for a truth track.
    pub clones: usize,
    /// Sum of shared-hit fractions over matched tracks.
    pub purity_sum: f64,
    /// Sum of found truth-hit fractions over matched tracks.
    pub hit_efficiency_sum: f64,
}

impl Add for MetricCounts {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            truth_tracks: self.truth_tracks + rhs.truth_tracks,
            truth_matched: self.truth_matched + rhs.truth_matched,
            reconstructed: self.reconstructed + rhs.reconstructed,
            matched: self.matched + rhs.matched,
            ghosts: self.ghosts + rhs.ghosts,
            clones: self.clones + rhs.clones,
            purity_sum: self.purity_sum + rhs.purity_sum,
            hit_efficiency_sum: self.hit_efficiency_sum + rhs.hit_efficiency_sum,
        }
    }
}

fn ratio(num: f64, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num / den as f64
    }
}

/// Quality measures for one reconstruction (or a merge of several).
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MetricReport {
    /// Underlying counts.
    pub counts: MetricCounts,
    /// Matched reconstructible truth tracks / reconstructible truth tracks.
    pub efficiency: f64,
    /// Ghosts / reconstructed tracks.
    pub ghost_rate: f64,
    /// Clones / matched reconstructed tracks.
    pub clone_rate: f64,
    /// Mean shared-hit fraction of matched tracks.
    pub hit_purity: f64,
    /// Mean fraction of the truth track's hits found by matched tracks.
    pub hit_efficiency: f64,
}

impl MetricReport {
    /// Derives the rates from raw counts.
    #[must_use]
    pub fn from_counts(counts: MetricCounts) -> Self {
        Self {
            counts,
            efficiency: ratio(counts.truth_matched as f64, counts.truth_tracks),
            ghost_rate: ratio(counts.ghosts as f64, counts.reconstructed),
            clone_rate: ratio(counts.clones as f64, counts.matched),
            hit_purity: ratio(counts.purity_sum, counts.matched),
            hit_efficiency: ratio(counts.hit_efficiency_sum, counts.matched),
        }
    }

    /// Combines two reports by summing their counts.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        Self::from_counts(self.counts + other.counts)
    }

    /// Combines any number of reports.
    pub fn aggregate<'a>(reports: impl IntoIterator<Item = &'a MetricReport>) -> Self {
        let counts = reports
            .into_iter()
            .fold(MetricCounts::default(), |acc, r| acc + r.counts);
        Self::from_counts(counts)
    }

    /// Number of reconstructed tracks.
    #[must_use]
    pub fn reconstructed(&self) -> usize {
        self.counts.reconstructed
    }
}

impl fmt::Display for MetricReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.counts;
        writeln!(f, "reconstructed tracks : {}", c.reconstructed)?;
        writeln!(
            f,
            "efficiency           : {:6.2}% ({}/{})",
            100.0 * self.efficiency,
            c.truth_matched,
            c.truth_tracks
        )?;
        writeln!(
            f,
            "ghost rate           : {:6.2}% ({})",
            100.0 * self.ghost_rate,
            c.ghosts
        )?;
        writeln!(
            f,
            "clone rate           : {:6.2}% ({})",
            100.0 * self.clone_rate,
            c.clones
        )?;
        writeln!(f, "hit purity           : {:6.2}%", 100.0 * self.hit_purity)?;
        write!(f, "hit efficiency       : {:6.2}%", 100.0 * self.hit_efficiency)
    }
}

/// Compares reconstructed tracks to ground truth.
#[derive(Debug, Clone, Default)]
pub struct EventMetricsCalculator {
    config: MetricsConfig,
}

impl EventMetricsCalculator {
    /// Creates a calculator with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a calculator with custom configuration.
    #[must_use]
    pub fn with_config(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Scores a reconstruction against the event's own truth.
    ///
    /// # Errors
    /// Returns [`Error::MissingGroundTruth`] if the event has no truth.
    pub fn compute_event(
        &self,
        event: &Event,
        reconstructed: &TrackCollection,
    ) -> Result<MetricReport> {
        let truth = event.truth().ok_or(Error::MissingGroundTruth)?;
        Ok(self.compute(truth, reconstructed))
    }

    /// Scores reconstructed tracks against truth tracks.
    #[must_use]
    pub fn compute(
        &self,
        truth_tracks: &[TruthTrack],
        reconstructed: &TrackCollection,
    ) -> MetricReport {
        let mut owners: HashMap<HitId, Vec<usize>> = HashMap::new();
        for (t, truth) in truth_tracks.iter().enumerate() {
            for hit in &truth.hits {
                owners.entry(*hit).or_default().push(t);
            }
        }

        let mut counts = MetricCounts {
            reconstructed: reconstructed.len(),
            ..MetricCounts::default()
        };
        // truth index -> number of reconstructed tracks matched to it
        let mut matches: BTreeMap<usize, usize> = BTreeMap::new();

        for track in reconstructed {
            let mut shared: HashMap<usize, usize> = HashMap::new();
            for hit in track.iter() {
                for &t in owners.get(hit).map_or(&[][..], Vec::as_slice) {
                    *shared.entry(t).or_default() += 1;
                }
            }

            let best = shared.into_iter().max_by(|(ta, na), (tb, nb)| {
                na.cmp(nb)
                    .then_with(|| truth_tracks[*tb].id.cmp(&truth_tracks[*ta].id))
            });

            match best {
                Some((t, n)) if ratio(n as f64, track.len()) > self.config.match_threshold => {
                    counts.matched += 1;
                    counts.purity_sum += ratio(n as f64, track.len());
                    counts.hit_efficiency_sum += ratio(n as f64, truth_tracks[t].len());
                    *matches.entry(t).or_default() += 1;
                }
                _ => counts.ghosts += 1,
            }
        }

        for (t, truth) in truth_tracks.iter().enumerate() {
            let n = matches.get(&t).copied().unwrap_or(0);
            counts.clones += n.saturating_sub(1);
            if truth.len() >= self.config.min_truth_hits {
                counts.truth_tracks += 1;
                if n > 0 {
                    counts.truth_matched += 1;
                }
            }
        }

        debug!(
            "metrics: {} reconstructed, {} matched, {} ghosts, {} clones",
            counts.reconstructed, counts.matched, counts.ghosts, counts.clones
        );

        MetricReport::from_counts(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::Track;
    use approx::assert_abs_diff_eq;

    fn reco(tracks: &[&[u32]]) -> TrackCollection {
        TrackCollection::new(
            tracks
                .iter()
                .map(|ids| ids.iter().copied().map(HitId).collect::<Track>())
                .collect(),
            true,
        )
    }

    #[test]
    fn test_perfect_reconstruction() {
        let truth = vec![TruthTrack::new(0, [1, 2, 3]), TruthTrack::new(1, [4, 5, 6])];
        let report = EventMetricsCalculator::new().compute(&truth, &reco(&[&[1, 2, 3], &[4, 5, 6]]));
        assert_abs_diff_eq!(report.efficiency, 1.0);
        assert_abs_diff_eq!(report.ghost_rate, 0.0);
        assert_abs_diff_eq!(report.clone_rate, 0.0);
        assert_abs_diff_eq!(report.hit_purity, 1.0);
        assert_abs_diff_eq!(report.hit_efficiency, 1.0);
    }

    #[test]
    fn test_ghosts_and_clones() {
        let truth = vec![
            TruthTrack::new(0, [1, 2, 3, 4]),
            TruthTrack::new(1, [5, 6, 7, 8]),
        ];
        // Two matches for truth 0 (one clone), one mixed ghost.
        let report = EventMetricsCalculator::new().compute(
            &truth,
            &reco(&[&[1, 2, 3, 4], &[1, 2, 3], &[4, 5, 6, 9]]),
        );
        assert_eq!(report.counts.matched, 2);
        assert_eq!(report.counts.ghosts, 1);
        assert_eq!(report.counts.clones, 1);
        assert_abs_diff_eq!(report.efficiency, 0.5);
        assert_abs_diff_eq!(report.ghost_rate, 1.0 / 3.0);
        assert_abs_diff_eq!(report.clone_rate, 0.5);
        assert_abs_diff_eq!(report.hit_efficiency, (1.0 + 0.75) / 2.0);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let truth = vec![TruthTrack::new(0, (0..10).collect::<Vec<u32>>())];
        // 7 of 10 hits shared: exactly at threshold, not above it.
        let track: Vec<u32> = (0..7).chain(100..103).collect();
        let report = EventMetricsCalculator::new().compute(&truth, &reco(&[&track]));
        assert_eq!(report.counts.ghosts, 1);

        let relaxed = EventMetricsCalculator::with_config(MetricsConfig::new().with_match_threshold(0.6));
        assert_eq!(relaxed.compute(&truth, &reco(&[&track])).counts.matched, 1);
    }

    #[test]
    fn test_tie_breaks_to_lowest_truth_id() {
        let truth = vec![TruthTrack::new(9, [1, 2, 3]), TruthTrack::new(4, [1, 2, 3])];
        let calc = EventMetricsCalculator::new();
        let report = calc.compute(&truth, &reco(&[&[1, 2, 3]]));
        assert_eq!(report.counts.matched, 1);
        // Only the winner (id 4) is matched; the other truth track is missed.
        assert_eq!(report.counts.truth_matched, 1);
        assert_abs_diff_eq!(report.efficiency, 0.5);
    }

    #[test]
    fn test_short_truth_not_reconstructible() {
        let truth = vec![TruthTrack::new(0, [1, 2]), TruthTrack::new(1, [3, 4, 5])];
        let report = EventMetricsCalculator::new().compute(&truth, &reco(&[&[3, 4, 5]]));
        assert_eq!(report.counts.truth_tracks, 1);
        assert_abs_diff_eq!(report.efficiency, 1.0);

        let plain = EventMetricsCalculator::with_config(MetricsConfig::new().with_min_truth_hits(0));
        let report = plain.compute(&truth, &reco(&[&[3, 4, 5]]));
        assert_eq!(report.counts.truth_tracks, 2);
        assert_abs_diff_eq!(report.efficiency, 0.5);
    }

    #[test]
    fn test_empty_inputs() {
        let report = EventMetricsCalculator::new().compute(&[], &TrackCollection::default());
        assert_abs_diff_eq!(report.efficiency, 0.0);
        assert_abs_diff_eq!(report.ghost_rate, 0.0);
        assert_abs_diff_eq!(report.clone_rate, 0.0);
    }

    #[test]
    fn test_merge_recomputes_rates() {
        let truth = vec![TruthTrack::new(0, [1, 2, 3])];
        let calc = EventMetricsCalculator::new();
        let hit = calc.compute(&truth, &reco(&[&[1, 2, 3]]));
        let miss = calc.compute(&truth, &reco(&[&[7, 8, 9]]));
        let merged = hit.merge(&miss);
        assert_abs_diff_eq!(merged.efficiency, 0.5);
        assert_abs_diff_eq!(merged.ghost_rate, 0.5);
        assert_eq!(MetricReport::aggregate([&hit, &miss]), merged);
    }

    #[test]
    fn test_compute_event_requires_truth() {
        let event = Event::new(Vec::new(), None).unwrap();
        let err = EventMetricsCalculator::new()
            .compute_event(&event, &TrackCollection::default())
            .unwrap_err();
        assert_eq!(err, Error::MissingGroundTruth);
    }

    #[test]
    fn test_summary_display() {
        let truth = vec![TruthTrack::new(0, [1, 2, 3])];
        let report = EventMetricsCalculator::new().compute(&truth, &reco(&[&[1, 2, 3]]));
        let text = report.to_string();
        assert!(text.contains("efficiency"));
        assert!(text.contains("100.00%"));
    }
}
