//! velopix-optim: Pipelines and hyperparameter optimizers.
//!
//! - [`PipelineBase`] wraps a reconstruction algorithm behind
//!   configure/run/evaluate.
//! - [`BaseOptimizer`] drives a [`SearchStrategy`] (grid, random or local
//!   search) through propose/update/done, tracking the best trial.
//! - [`run_optimization`] ties the two together over a set of events.
#![warn(missing_docs)]

pub mod error;
mod objective;
mod optimizer;
mod pipeline;
mod runner;
mod space;
mod strategy;

pub use error::{Error, Result};
pub use objective::Objective;
pub use optimizer::{
    BaseOptimizer, OptimizationResult, OptimizerConfig, OptimizerState, StopSignal,
    TerminationReason, TrialOutcome, TrialRecord,
};
pub use pipeline::{
    GraphDfsPipeline, PipelineBase, SearchByTripletTriePipeline, TrackFollowingPipeline,
};
pub use runner::run_optimization;
pub use space::{Dimension, SearchSpace};
pub use strategy::{GridSearch, LocalSearch, RandomSearch, SearchStrategy};
