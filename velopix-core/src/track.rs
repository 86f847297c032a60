//! Reconstructed tracks.

use std::collections::HashMap;

use crate::hit::HitId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An ordered sequence of hits inferred to belong to one particle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Track {
    /// Hits along the trajectory, in layer order.
    pub hits: Vec<HitId>,
}

impl Track {
    /// Creates a track from hit ids.
    #[must_use]
    pub fn new(hits: Vec<HitId>) -> Self {
        Self { hits }
    }

    /// Returns the number of hits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Returns true if the track has no hits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Returns an iterator over the hit ids.
    pub fn iter(&self) -> impl Iterator<Item = &HitId> {
        self.hits.iter()
    }
}

impl FromIterator<HitId> for Track {
    fn from_iter<I: IntoIterator<Item = HitId>>(iter: I) -> Self {
        Self {
            hits: iter.into_iter().collect(),
        }
    }
}

/// Tracks produced by one reconstruction run over one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackCollection {
    /// Reconstructed tracks.
    pub tracks: Vec<Track>,
    /// Whether the producing algorithm guarantees that no hit appears in
    /// more than one track.
    pub exclusive: bool,
}

impl TrackCollection {
    /// Creates a collection, declaring its hit exclusivity.
    #[must_use]
    pub fn new(tracks: Vec<Track>, exclusive: bool) -> Self {
        Self { tracks, exclusive }
    }

    /// Returns the number of tracks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Returns true if no track was reconstructed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Returns an iterator over the tracks.
    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    /// Hits used by more than one track, sorted by id.
    #[must_use]
    pub fn shared_hits(&self) -> Vec<HitId> {
        let mut counts: HashMap<HitId, usize> = HashMap::new();
        for hit in self.tracks.iter().flat_map(|t| t.hits.iter()) {
            *counts.entry(*hit).or_default() += 1;
        }
        let mut shared: Vec<HitId> = counts
            .into_iter()
            .filter_map(|(hit, n)| (n > 1).then_some(hit))
            .collect();
        shared.sort_unstable();
        shared
    }

    /// Returns true if any hit appears in more than one track.
    #[must_use]
    pub fn has_shared_hits(&self) -> bool {
        !self.shared_hits().is_empty()
    }
}

impl<'a> IntoIterator for &'a TrackCollection {
    type Item = &'a Track;
    type IntoIter = std::slice::Iter<'a, Track>;

    fn into_iter(self) -> Self::IntoIter {
        self.tracks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(ids: &[u32]) -> Track {
        ids.iter().copied().map(HitId).collect()
    }

    #[test]
    fn test_track_operations() {
        let t = track(&[1, 2, 3]);
        assert_eq!(t.len(), 3);
        assert!(!t.is_empty());
        assert_eq!(t.iter().next(), Some(&HitId(1)));
    }

    #[test]
    fn test_shared_hits() {
        let exclusive = TrackCollection::new(vec![track(&[1, 2, 3]), track(&[4, 5, 6])], true);
        assert!(!exclusive.has_shared_hits());

        let shared = TrackCollection::new(vec![track(&[1, 2, 3]), track(&[3, 7, 2])], false);
        assert_eq!(shared.shared_hits(), vec![HitId(2), HitId(3)]);
    }
}
