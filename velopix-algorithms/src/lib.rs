//! velopix-algorithms: Track reconstruction for the VELO pixel detector.
//!
//! This crate provides three reconstruction algorithms:
//! - **Track following** - seed pairs extended greedily by extrapolation
//! - **Graph DFS** - depth-first search over a layered hit graph
//! - **Search by triplet** - triplets and extensions stored in a prefix trie
//!
//! All of them implement [`ReconstructionAlgorithm`]; [`Algorithm`] selects one
//! at runtime and [`reconstruct_events`] runs a batch in parallel.
#![warn(missing_docs)]

pub mod geometry;
mod graph_dfs;
mod processing;
mod track_following;
pub mod trie;
mod triplet_trie;

pub use geometry::DistanceMetric;
pub use graph_dfs::{GraphDfs, GraphDfsConfig, SearchMode};
pub use processing::{reconstruct_events, Algorithm};
pub use track_following::{TrackFollowing, TrackFollowingConfig};
pub use trie::TripletTrie;
pub use triplet_trie::{SearchByTripletTrie, TripletTrieConfig};

// Re-export the core algorithm trait
pub use velopix_core::ReconstructionAlgorithm;
