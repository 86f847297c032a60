//! Optimizer state machine and trial bookkeeping.
//!
//! ```text
//! Init -> Proposing -> Evaluating -> Updating -> (Proposing | Terminated)
//! ```
//!
//! The optimizer never runs a reconstruction itself: the caller evaluates
//! each proposal and reports back through [`BaseOptimizer::update`] or
//! [`BaseOptimizer::record_failure`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info};
use velopix_core::{MetricReport, ParameterSet};

use crate::error::{Error, Result};
use crate::objective::Objective;
use crate::strategy::SearchStrategy;

/// Optimizer settings.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptimizerConfig {
    /// Maximum number of recorded trials.
    pub max_trials: usize,
    /// Stop after this many consecutive trials without improvement.
    pub patience: Option<usize>,
    /// Objective used to rank trials.
    pub objective: Objective,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_trials: 100,
            patience: None,
            objective: Objective::MaximizeEfficiency,
        }
    }
}

impl OptimizerConfig {
    /// Sets the trial budget.
    #[must_use]
    pub fn with_max_trials(mut self, max_trials: usize) -> Self {
        self.max_trials = max_trials;
        self
    }

    /// Sets the no-improvement patience.
    #[must_use]
    pub fn with_patience(mut self, patience: usize) -> Self {
        self.patience = Some(patience);
        self
    }

    /// Sets the objective.
    #[must_use]
    pub fn with_objective(mut self, objective: Objective) -> Self {
        self.objective = objective;
        self
    }
}

/// Cooperative cancellation flag, shared between clones.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Creates an unset signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True once [`stop`](Self::stop) was called on any clone.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptimizerState {
    /// Nothing proposed yet.
    Init,
    /// Ready to propose.
    Proposing,
    /// A proposal is outstanding.
    Evaluating,
    /// Recording a trial.
    Updating,
    /// A stopping criterion was met.
    Terminated,
}

/// Why an optimization ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TerminationReason {
    /// `max_trials` trials were recorded.
    BudgetExhausted,
    /// `patience` trials passed without improvement.
    PatienceExceeded,
    /// The strategy has no candidates left.
    SearchSpaceExhausted,
    /// The stop signal was raised.
    Stopped,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::BudgetExhausted => "trial budget exhausted",
            Self::PatienceExceeded => "no improvement within patience",
            Self::SearchSpaceExhausted => "search space exhausted",
            Self::Stopped => "stopped",
        };
        f.write_str(text)
    }
}

/// Result of one trial.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TrialOutcome {
    /// Evaluation succeeded.
    Completed(MetricReport),
    /// Evaluation failed; scored as `-inf`.
    Failed(String),
}

/// One recorded trial.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrialRecord {
    /// Position in the history.
    pub id: usize,
    /// Evaluated parameters.
    pub params: ParameterSet,
    /// Report or failure reason.
    pub outcome: TrialOutcome,
    /// Objective score.
    pub score: f64,
}

impl TrialRecord {
    /// The metric report of a completed trial.
    #[must_use]
    pub fn report(&self) -> Option<&MetricReport> {
        match &self.outcome {
            TrialOutcome::Completed(report) => Some(report),
            TrialOutcome::Failed(_) => None,
        }
    }
}

/// Read-only outcome of an optimization run.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptimizationResult {
    /// Best completed trial.
    pub best: Option<TrialRecord>,
    /// Every recorded trial, in order.
    pub history: Vec<TrialRecord>,
    /// Set once the optimizer terminated.
    pub termination: Option<TerminationReason>,
}

impl OptimizationResult {
    /// Parameters of the best trial.
    #[must_use]
    pub fn best_params(&self) -> Option<&ParameterSet> {
        self.best.as_ref().map(|t| &t.params)
    }

    /// Report of the best trial.
    #[must_use]
    pub fn best_report(&self) -> Option<&MetricReport> {
        self.best.as_ref().and_then(TrialRecord::report)
    }

    /// Number of failed trials.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.history
            .iter()
            .filter(|t| matches!(t.outcome, TrialOutcome::Failed(_)))
            .count()
    }
}

/// Optimizer driving a [`SearchStrategy`].
#[derive(Debug)]
pub struct BaseOptimizer<S> {
    strategy: S,
    config: OptimizerConfig,
    state: OptimizerState,
    history: Vec<TrialRecord>,
    best: Option<usize>,
    pending: Option<ParameterSet>,
    since_improvement: usize,
    stop: StopSignal,
    termination: Option<TerminationReason>,
}

impl<S: SearchStrategy> BaseOptimizer<S> {
    /// Creates an optimizer.
    pub fn new(strategy: S, config: OptimizerConfig) -> Self {
        Self {
            strategy,
            config,
            state: OptimizerState::Init,
            history: Vec::new(),
            best: None,
            pending: None,
            since_improvement: 0,
            stop: StopSignal::new(),
            termination: None,
        }
    }

    /// Uses `stop` as the cancellation flag.
    #[must_use]
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// A handle that stops this optimizer when raised.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Current state.
    pub fn state(&self) -> OptimizerState {
        self.state
    }

    /// Settings.
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// The strategy.
    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Recorded trials.
    pub fn history(&self) -> &[TrialRecord] {
        &self.history
    }

    /// Best completed trial so far.
    pub fn best(&self) -> Option<&TrialRecord> {
        self.best.map(|i| &self.history[i])
    }

    /// Score of the best trial, `-inf` before any completed trial.
    pub fn best_score(&self) -> f64 {
        self.best().map_or(f64::NEG_INFINITY, |t| t.score)
    }

    /// Why the optimizer terminated, if it did.
    pub fn termination(&self) -> Option<TerminationReason> {
        self.termination
    }

    /// Returns the next candidate to evaluate.
    ///
    /// While a proposal is outstanding the same candidate is returned again.
    ///
    /// # Errors
    /// - `ExhaustedSearchSpace` once a finite strategy has run out of points.
    /// - `OptimizerTerminated` after any other stopping criterion.
    pub fn propose(&mut self) -> Result<ParameterSet> {
        if let Some(pending) = &self.pending {
            if self.state == OptimizerState::Evaluating {
                return Ok(pending.clone());
            }
        }
        if self.done() {
            return Err(self.terminal_error());
        }
        self.state = OptimizerState::Proposing;
        let Some(params) = self.strategy.next_candidate() else {
            self.terminate(TerminationReason::SearchSpaceExhausted);
            return Err(Error::ExhaustedSearchSpace);
        };
        debug!("trial {}: proposing {params}", self.history.len());
        self.pending = Some(params.clone());
        self.state = OptimizerState::Evaluating;
        Ok(params)
    }

    /// Records the report of the outstanding proposal.
    ///
    /// Replaying the most recent `(params, report)` pair is a no-op.
    ///
    /// # Errors
    /// - `UnexpectedTrial` if `params` is not the outstanding proposal.
    /// - `OptimizerTerminated` if the optimizer stopped before the update.
    pub fn update(&mut self, params: &ParameterSet, report: &MetricReport) -> Result<()> {
        if self.is_replay(params, |outcome| {
            matches!(outcome, TrialOutcome::Completed(r) if r == report)
        }) {
            return Ok(());
        }
        self.accept(params)?;
        let score = self.config.objective.score(report);
        self.record(params, TrialOutcome::Completed(report.clone()), score);
        Ok(())
    }

    /// Records the outstanding proposal as failed, with score `-inf`.
    ///
    /// # Errors
    /// As [`update`](Self::update).
    pub fn record_failure(&mut self, params: &ParameterSet, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        if self.is_replay(params, |outcome| {
            matches!(outcome, TrialOutcome::Failed(r) if *r == reason)
        }) {
            return Ok(());
        }
        self.accept(params)?;
        self.record(params, TrialOutcome::Failed(reason), f64::NEG_INFINITY);
        Ok(())
    }

    /// True once a stopping criterion holds; the optimizer then stays
    /// terminated.
    pub fn done(&mut self) -> bool {
        if self.state == OptimizerState::Terminated {
            return true;
        }
        let reason = if self.stop.is_stopped() {
            Some(TerminationReason::Stopped)
        } else if self.history.len() >= self.config.max_trials {
            Some(TerminationReason::BudgetExhausted)
        } else if self
            .config
            .patience
            .is_some_and(|p| self.since_improvement >= p)
        {
            Some(TerminationReason::PatienceExceeded)
        } else if self.pending.is_none() && self.strategy.is_exhausted() {
            Some(TerminationReason::SearchSpaceExhausted)
        } else {
            None
        };
        if let Some(reason) = reason {
            self.terminate(reason);
        }
        self.state == OptimizerState::Terminated
    }

    /// Snapshot of the result so far.
    pub fn result(&self) -> OptimizationResult {
        OptimizationResult {
            best: self.best().cloned(),
            history: self.history.clone(),
            termination: self.termination,
        }
    }

    /// Consumes the optimizer, returning its result.
    pub fn into_result(self) -> OptimizationResult {
        OptimizationResult {
            best: self.best.map(|i| self.history[i].clone()),
            history: self.history,
            termination: self.termination,
        }
    }

    fn is_replay(&self, params: &ParameterSet, same: impl Fn(&TrialOutcome) -> bool) -> bool {
        self.pending.is_none()
            && self
                .history
                .last()
                .is_some_and(|last| last.params == *params && same(&last.outcome))
    }

    fn accept(&mut self, params: &ParameterSet) -> Result<()> {
        match &self.pending {
            Some(pending) if pending == params => {}
            _ if self.state == OptimizerState::Terminated => {
                return Err(Error::OptimizerTerminated)
            }
            _ => return Err(Error::UnexpectedTrial),
        }
        self.pending = None;
        self.state = OptimizerState::Updating;
        Ok(())
    }

    fn record(&mut self, params: &ParameterSet, outcome: TrialOutcome, score: f64) {
        let id = self.history.len();
        self.history.push(TrialRecord {
            id,
            params: params.clone(),
            outcome,
            score,
        });
        self.strategy.observe(params, score);

        if score > self.best_score() {
            self.best = Some(id);
            self.since_improvement = 0;
            info!("trial {id}: new best score {score:.4} with {params}");
        } else {
            self.since_improvement += 1;
            debug!("trial {id}: score {score:.4}");
        }

        self.state = OptimizerState::Proposing;
        self.done();
    }

    fn terminate(&mut self, reason: TerminationReason) {
        if self.termination.is_none() {
            info!(
                "optimizer terminated after {} trials: {reason}",
                self.history.len()
            );
            self.termination = Some(reason);
        }
        self.pending = None;
        self.state = OptimizerState::Terminated;
    }

    fn terminal_error(&self) -> Error {
        match self.termination {
            Some(TerminationReason::SearchSpaceExhausted) => Error::ExhaustedSearchSpace,
            _ => Error::OptimizerTerminated,
        }
    }
}
