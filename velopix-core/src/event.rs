//! Events: the hits of one detector readout plus optional ground truth.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::hit::{Hit, HitId, Module};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A ground-truth particle trajectory, given as the hits it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TruthTrack {
    /// Particle identifier; lower ids win matching ties.
    pub id: u32,
    /// Hits produced by the particle.
    pub hits: Vec<HitId>,
}

impl TruthTrack {
    /// Creates a truth track from raw hit ids.
    pub fn new(id: u32, hits: impl IntoIterator<Item = u32>) -> Self {
        Self {
            id,
            hits: hits.into_iter().map(HitId).collect(),
        }
    }

    /// Returns the number of hits on the track.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Returns true if the track has no hits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Hits of one event, indexed by module.
///
/// Hits are stored sorted by `(module, id)` so that every module occupies a
/// contiguous slice. The event is immutable once built.
#[derive(Debug, Clone)]
pub struct Event {
    hits: Vec<Hit>,
    /// `module_offsets[m]..module_offsets[m + 1]` is the hit range of module `m`.
    module_offsets: Vec<usize>,
    index: HashMap<HitId, usize>,
    truth: Option<Vec<TruthTrack>>,
}

impl Event {
    /// Builds an event, validating hit and truth invariants.
    ///
    /// # Errors
    /// Returns [`Error::InvalidEvent`] on duplicate hit ids, non-finite
    /// coordinates, duplicate truth ids, or truth tracks referencing unknown
    /// hits.
    pub fn new(mut hits: Vec<Hit>, truth: Option<Vec<TruthTrack>>) -> Result<Self> {
        for hit in &hits {
            if !(hit.x.is_finite() && hit.y.is_finite() && hit.z.is_finite()) {
                return Err(Error::InvalidEvent(format!(
                    "hit {} has non-finite coordinates",
                    hit.id
                )));
            }
        }

        hits.sort_by(|a, b| a.module.cmp(&b.module).then(a.id.cmp(&b.id)));

        let mut index = HashMap::with_capacity(hits.len());
        for (i, hit) in hits.iter().enumerate() {
            if index.insert(hit.id, i).is_some() {
                return Err(Error::InvalidEvent(format!("duplicate hit id {}", hit.id)));
            }
        }

        let num_layers = hits.last().map_or(0, |hit| usize::from(hit.module) + 1);
        let mut module_offsets = vec![0; num_layers + 1];
        for hit in &hits {
            module_offsets[usize::from(hit.module) + 1] += 1;
        }
        for m in 0..num_layers {
            module_offsets[m + 1] += module_offsets[m];
        }

        if let Some(tracks) = &truth {
            let mut seen = HashSet::with_capacity(tracks.len());
            for track in tracks {
                if !seen.insert(track.id) {
                    return Err(Error::InvalidEvent(format!(
                        "duplicate truth track id {}",
                        track.id
                    )));
                }
                if let Some(missing) = track.hits.iter().find(|id| !index.contains_key(id)) {
                    return Err(Error::InvalidEvent(format!(
                        "truth track {} references unknown hit {missing}",
                        track.id
                    )));
                }
            }
        }

        Ok(Self {
            hits,
            module_offsets,
            index,
            truth,
        })
    }

    /// Returns all hits, sorted by module then id.
    #[must_use]
    pub fn hits(&self) -> &[Hit] {
        &self.hits
    }

    /// Returns the number of hits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Returns true if the event has no hits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Number of detector layers spanned by the event (highest module + 1).
    #[must_use]
    pub fn num_layers(&self) -> usize {
        self.module_offsets.len() - 1
    }

    /// Index range of the hits on module `m`; empty past the last module.
    #[must_use]
    pub fn layer_range(&self, m: usize) -> std::ops::Range<usize> {
        if m >= self.num_layers() {
            return 0..0;
        }
        self.module_offsets[m]..self.module_offsets[m + 1]
    }

    /// Hits on module `m`.
    #[must_use]
    pub fn layer(&self, m: usize) -> &[Hit] {
        &self.hits[self.layer_range(m)]
    }

    /// Per-module view of the event.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn modules(&self) -> impl Iterator<Item = Module> + '_ {
        (0..self.num_layers()).map(move |m| {
            let hit_range = self.layer_range(m);
            let hits = &self.hits[hit_range.clone()];
            let z = if hits.is_empty() {
                0.0
            } else {
                hits.iter().map(|h| h.z).sum::<f64>() / hits.len() as f64
            };
            Module {
                number: m as u16,
                z,
                hit_range,
            }
        })
    }

    /// Position of a hit in [`Event::hits`].
    #[must_use]
    pub fn index_of(&self, id: HitId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    /// Looks up a hit by id.
    #[must_use]
    pub fn hit(&self, id: HitId) -> Option<&Hit> {
        self.index_of(id).map(|i| &self.hits[i])
    }

    /// Ground-truth tracks, if the event carries them.
    #[must_use]
    pub fn truth(&self) -> Option<&[TruthTrack]> {
        self.truth.as_deref()
    }

    /// Returns true if the event carries ground truth.
    #[must_use]
    pub fn has_truth(&self) -> bool {
        self.truth.is_some()
    }
}
