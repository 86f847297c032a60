//! velopix-core: Core types for pixel-detector track reconstruction.
//!
//! This crate provides the foundational abstractions shared by the
//! reconstruction algorithms and the optimizer: hits and events,
//! reconstructed tracks, parameter schemas, and the event metrics
//! calculator that scores a reconstruction against ground truth.
//!

pub mod error;
pub mod event;
pub mod hit;
pub mod metrics;
pub mod params;
pub mod reconstruction;
pub mod track;

pub use error::{Error, Result};
pub use event::{Event, TruthTrack};
pub use hit::{Hit, HitId, Module};
pub use metrics::{EventMetricsCalculator, MetricReport, MetricsConfig};
pub use params::{ParamKind, ParamSpec, ParamValue, ParameterSchema, ParameterSet};
pub use reconstruction::ReconstructionAlgorithm;
pub use track::{Track, TrackCollection};
