//! Algorithm selection and batch reconstruction.

use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use velopix_core::{
    Error, Event, ParameterSchema, ParameterSet, ReconstructionAlgorithm, Result,
    TrackCollection,
};

use crate::{GraphDfs, SearchByTripletTrie, TrackFollowing};

/// Reconstruction algorithm selected at runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Algorithm {
    /// [`TrackFollowing`]
    TrackFollowing,
    /// [`GraphDfs`]
    GraphDfs,
    /// [`SearchByTripletTrie`]
    SearchByTripletTrie,
}

impl Algorithm {
    /// All algorithms, in a stable order.
    pub const ALL: [Self; 3] = [Self::TrackFollowing, Self::GraphDfs, Self::SearchByTripletTrie];

    fn as_dyn(self) -> &'static dyn ReconstructionAlgorithm {
        match self {
            Self::TrackFollowing => &TrackFollowing,
            Self::GraphDfs => &GraphDfs,
            Self::SearchByTripletTrie => &SearchByTripletTrie,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "trackfollowing" | "tf" => Ok(Self::TrackFollowing),
            "graphdfs" | "dfs" | "graph" => Ok(Self::GraphDfs),
            "searchbytriplettrie" | "triplettrie" | "triplet" | "sbt" => {
                Ok(Self::SearchByTripletTrie)
            }
            _ => Err(Error::invalid_parameter(
                "algorithm",
                format!("unknown algorithm `{s}`"),
            )),
        }
    }
}

impl ReconstructionAlgorithm for Algorithm {
    fn name(&self) -> &'static str {
        self.as_dyn().name()
    }

    fn schema(&self) -> ParameterSchema {
        self.as_dyn().schema()
    }

    fn min_hits(&self) -> usize {
        self.as_dyn().min_hits()
    }

    fn shares_hits(&self, params: &ParameterSet) -> Result<bool> {
        self.as_dyn().shares_hits(params)
    }

    fn reconstruct(&self, event: &Event, params: &ParameterSet) -> Result<TrackCollection> {
        self.as_dyn().reconstruct(event, params)
    }
}

/// Reconstructs every event with the same parameters, in parallel.
///
/// Output order matches `events`. The first failing event aborts the batch.
///
/// # Errors
/// Propagates the first reconstruction error.
pub fn reconstruct_events<A>(
    algorithm: &A,
    events: &[Event],
    params: &ParameterSet,
) -> Result<Vec<TrackCollection>>
where
    A: ReconstructionAlgorithm + ?Sized,
{
    events
        .par_iter()
        .map(|event| algorithm.reconstruct(event, params))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use velopix_core::Hit;

    #[test]
    fn test_parse_aliases() {
        assert_eq!(
            "TrackFollowing".parse::<Algorithm>().unwrap(),
            Algorithm::TrackFollowing
        );
        assert_eq!("graph-dfs".parse::<Algorithm>().unwrap(), Algorithm::GraphDfs);
        assert_eq!(
            "search_by_triplet_trie".parse::<Algorithm>().unwrap(),
            Algorithm::SearchByTripletTrie
        );
        assert!("kalman".parse::<Algorithm>().is_err());
        for algorithm in Algorithm::ALL {
            assert_eq!(algorithm.name().parse::<Algorithm>().unwrap(), algorithm);
        }
    }

    #[test]
    fn test_dispatch_matches_concrete() {
        assert_eq!(Algorithm::GraphDfs.name(), GraphDfs::NAME);
        assert_eq!(Algorithm::SearchByTripletTrie.min_hits(), 3);
        assert_eq!(
            Algorithm::TrackFollowing.schema().defaults(),
            TrackFollowing.schema().defaults()
        );
    }

    #[test]
    fn test_batch_preserves_order() {
        let events: Vec<Event> = (0..4u32)
            .map(|n| {
                let hits = (0..=n + 2)
                    .map(|m| {
                        let z = f64::from(m) * 10.0;
                        Hit::new(m, 0.0, 0.0, z, m as u16)
                    })
                    .collect();
                Event::new(hits, None).unwrap()
            })
            .collect();
        let algorithm = Algorithm::TrackFollowing;
        let params = algorithm.schema().defaults();
        let results = reconstruct_events(&algorithm, &events, &params).unwrap();
        let lengths: Vec<usize> = results.iter().map(|t| t.iter().next().unwrap().len()).collect();
        assert_eq!(lengths, vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_batch_propagates_errors() {
        let events = vec![Event::new(Vec::new(), None).unwrap()];
        let algorithm = Algorithm::GraphDfs;
        let params = algorithm.schema().defaults();
        assert!(matches!(
            reconstruct_events(&algorithm, &events, &params),
            Err(Error::EmptyEvent { .. })
        ));
    }
}
