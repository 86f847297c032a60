//! Sequential propose -> evaluate -> update loop.

use log::{info, warn};
use velopix_core::{Event, ReconstructionAlgorithm};

use crate::error::{Error, Result};
use crate::optimizer::{BaseOptimizer, OptimizationResult};
use crate::pipeline::PipelineBase;
use crate::strategy::SearchStrategy;

/// Runs `optimizer` against `pipeline` until it terminates.
///
/// Each proposal configures the pipeline and is scored over all `events`
/// (in parallel, merged into one report). Trials failing with
/// `AlgorithmConvergence` or `EmptyEvent` are recorded as failed trials and
/// the search continues. On return the pipeline holds the best parameters
/// found, if any trial completed.
///
/// # Errors
/// Any other evaluation or configuration error aborts the run.
pub fn run_optimization<A, S>(
    pipeline: &mut PipelineBase<A>,
    optimizer: &mut BaseOptimizer<S>,
    events: &[Event],
) -> Result<OptimizationResult>
where
    A: ReconstructionAlgorithm,
    S: SearchStrategy,
{
    info!(
        "optimizing {} with {} search over {} events",
        pipeline.name(),
        optimizer.strategy().name(),
        events.len()
    );

    while !optimizer.done() {
        let params = match optimizer.propose() {
            Ok(params) => params,
            Err(e) if e.is_terminal() => break,
            Err(e) => return Err(e),
        };

        let evaluation = pipeline
            .configure(params.clone())
            .and_then(|()| pipeline.evaluate_events(events));

        match evaluation {
            Ok(report) => optimizer.update(&params, &report)?,
            Err(e) if e.is_trial_failure() => {
                warn!("trial {} failed: {e}", optimizer.history().len());
                optimizer.record_failure(&params, e.to_string())?;
            }
            Err(e) => return Err(Error::Core(e)),
        }
    }

    let result = optimizer.result();
    if let Some(best) = result.best_params() {
        pipeline.configure(best.clone())?;
    }
    Ok(result)
}
