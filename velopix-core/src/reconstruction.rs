//! Reconstruction algorithm trait.

use crate::error::{Error, Result};
use crate::event::Event;
use crate::params::{ParameterSchema, ParameterSet};
use crate::track::TrackCollection;

/// Trait for track reconstruction algorithms.
///
/// Implementations turn the hits of one event into candidate tracks. A
/// call to [`reconstruct`](Self::reconstruct) must be a pure function of
/// the event and the parameter set: no state is carried between calls, so
/// the same inputs always produce the same collection and independent calls
/// may run concurrently.
pub trait ReconstructionAlgorithm: Send + Sync {
    /// Returns the name of the algorithm.
    fn name(&self) -> &'static str;

    /// Parameters the algorithm reads.
    fn schema(&self) -> ParameterSchema;

    /// Minimum number of hits an event must carry.
    fn min_hits(&self) -> usize;

    /// Whether the produced tracks may share hits under `params`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidParameter`] if `params` violates the schema.
    fn shares_hits(&self, params: &ParameterSet) -> Result<bool>;

    /// Reconstructs tracks from the event's hits.
    ///
    /// # Errors
    /// - [`Error::InvalidParameter`] if `params` violates the schema.
    /// - [`Error::EmptyEvent`] if the event has fewer than
    ///   [`min_hits`](Self::min_hits) hits.
    /// - [`Error::AlgorithmConvergence`] if an internal safety bound is hit.
    fn reconstruct(&self, event: &Event, params: &ParameterSet) -> Result<TrackCollection>;

    /// Rejects events with fewer than [`min_hits`](Self::min_hits) hits.
    ///
    /// Parameter validation belongs to the algorithm's configuration
    /// builder; call this once the configuration is built.
    ///
    /// # Errors
    /// Returns [`Error::EmptyEvent`] for undersized events.
    fn check_hits(&self, event: &Event) -> Result<()> {
        if event.len() < self.min_hits() {
            return Err(Error::EmptyEvent {
                hits: event.len(),
                required: self.min_hits(),
            });
        }
        Ok(())
    }
}
