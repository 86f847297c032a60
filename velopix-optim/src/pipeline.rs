//! Reconstruction pipelines: one algorithm, its active parameters and a
//! metrics calculator behind a configure/run/evaluate contract.

use log::debug;
use rayon::prelude::*;
use velopix_algorithms::{GraphDfs, SearchByTripletTrie, TrackFollowing};
use velopix_core::{
    Error, Event, EventMetricsCalculator, MetricReport, ParameterSet, ReconstructionAlgorithm,
    Result, TrackCollection,
};

/// Pipeline around a reconstruction algorithm.
///
/// The active parameter set starts at the algorithm's schema defaults and is
/// replaced wholesale by [`configure`](Self::configure). `run` and `evaluate`
/// take `&self`, so one configured pipeline can score many events at once.
#[derive(Debug, Clone)]
pub struct PipelineBase<A> {
    algorithm: A,
    params: ParameterSet,
    metrics: EventMetricsCalculator,
}

/// Track-following pipeline.
pub type TrackFollowingPipeline = PipelineBase<TrackFollowing>;
/// Graph-DFS pipeline.
pub type GraphDfsPipeline = PipelineBase<GraphDfs>;
/// Search-by-triplet-trie pipeline.
pub type SearchByTripletTriePipeline = PipelineBase<SearchByTripletTrie>;

impl<A: ReconstructionAlgorithm> PipelineBase<A> {
    /// Creates a pipeline configured with the algorithm's defaults.
    pub fn new(algorithm: A) -> Self {
        let params = algorithm.schema().defaults();
        Self {
            algorithm,
            params,
            metrics: EventMetricsCalculator::new(),
        }
    }

    /// Replaces the metrics calculator.
    #[must_use]
    pub fn with_metrics(mut self, metrics: EventMetricsCalculator) -> Self {
        self.metrics = metrics;
        self
    }

    /// The wrapped algorithm.
    pub fn algorithm(&self) -> &A {
        &self.algorithm
    }

    /// Name of the wrapped algorithm.
    pub fn name(&self) -> &'static str {
        self.algorithm.name()
    }

    /// Active parameters.
    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    /// Metrics calculator used by `evaluate`.
    pub fn metrics(&self) -> &EventMetricsCalculator {
        &self.metrics
    }

    /// Validates `params` against the schema and makes them active.
    ///
    /// The previous set is overwritten, never merged.
    ///
    /// # Errors
    /// Returns `InvalidParameter` and keeps the previous set if validation
    /// fails.
    pub fn configure(&mut self, params: ParameterSet) -> Result<()> {
        self.algorithm.schema().validate(&params)?;
        debug!("{}: configured {params}", self.name());
        self.params = params;
        Ok(())
    }

    /// Reconstructs one event with the active parameters.
    ///
    /// # Errors
    /// Algorithm errors are returned unmodified.
    pub fn run(&self, event: &Event) -> Result<TrackCollection> {
        self.algorithm.reconstruct(event, &self.params)
    }

    /// Reconstructs one event and scores it against its ground truth.
    ///
    /// # Errors
    /// Returns `MissingGroundTruth` before reconstructing if the event carries
    /// no truth; otherwise the errors of [`run`](Self::run).
    pub fn evaluate(&self, event: &Event) -> Result<MetricReport> {
        if !event.has_truth() {
            return Err(Error::MissingGroundTruth);
        }
        let tracks = self.run(event)?;
        self.metrics.compute_event(event, &tracks)
    }

    /// Evaluates every event in parallel and merges the reports.
    ///
    /// # Errors
    /// Returns the first error raised by any event.
    pub fn evaluate_events(&self, events: &[Event]) -> Result<MetricReport> {
        let reports = events
            .par_iter()
            .map(|event| self.evaluate(event))
            .collect::<Result<Vec<_>>>()?;
        Ok(MetricReport::aggregate(&reports))
    }
}

impl<A: ReconstructionAlgorithm + Default> Default for PipelineBase<A> {
    fn default() -> Self {
        Self::new(A::default())
    }
}
