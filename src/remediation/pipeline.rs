use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

use super::step::{RemediationStep, StepContext, StepOutcome};
use crate::error::{AuditError, AuditResult};

/// Position of a remediation run in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RemediationState {
    Started,
    Step { index: usize, name: String },
    Reporting,
    Done,
    Failed,
}

impl fmt::Display for RemediationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemediationState::Started => write!(f, "started"),
            RemediationState::Step { index, name } => write!(f, "step {} ({})", index, name),
            RemediationState::Reporting => write!(f, "reporting"),
            RemediationState::Done => write!(f, "done"),
            RemediationState::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub name: String,
    pub outcome: StepOutcome,
}

/// Steps executed by one pipeline run and the states it went through
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineRun {
    pub steps: Vec<StepRecord>,
    /// Reason given by the step that found the resource already remediated
    pub already_remediated: Option<String>,
    pub history: Vec<RemediationState>,
}

impl PipelineRun {
    pub fn completed_steps(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.name.clone()).collect()
    }

    pub(crate) fn transition(&mut self, state: RemediationState) {
        self.history.push(state);
    }
}

#[derive(Debug, Default)]
struct ProgressState {
    completed: Vec<String>,
    abandoned: bool,
    reporting: bool,
}

/// Progress of one run, shared between the thread executing it and the
/// caller waiting on it.
///
/// A waiter that gives up calls [`RunProgress::abandon`]; a run about to
/// report calls [`RunProgress::begin_reporting`]. Exactly one of the two
/// succeeds, so an abandoned run never archives its finding.
#[derive(Debug, Default)]
pub struct RunProgress {
    state: Mutex<ProgressState>,
}

impl RunProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Steps finished so far, in order
    pub fn completed_steps(&self) -> Vec<String> {
        self.lock().completed.clone()
    }

    pub fn is_abandoned(&self) -> bool {
        self.lock().abandoned
    }

    /// Mark the run abandoned. Returns false when it already started
    /// reporting, in which case its result still stands.
    pub fn abandon(&self) -> bool {
        let mut state = self.lock();
        if state.reporting {
            return false;
        }
        state.abandoned = true;
        true
    }

    /// Commit to reporting. Returns false when the run was abandoned.
    pub fn begin_reporting(&self) -> bool {
        let mut state = self.lock();
        if state.abandoned {
            return false;
        }
        state.reporting = true;
        true
    }

    fn record_step(&self, name: &str) {
        self.lock().completed.push(name.to_string());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fixed, ordered sequence of steps.
///
/// Fail-stop: the first failing step aborts the run and nothing already
/// applied is undone.
pub struct RemediationPipeline {
    steps: Vec<Box<dyn RemediationStep>>,
}

impl RemediationPipeline {
    pub fn new(steps: Vec<Box<dyn RemediationStep>>) -> Self {
        Self { steps }
    }

    pub fn step_names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Cleanup hints for the steps that ran before a failure
    pub fn compensations_for(&self, completed: &[String]) -> Vec<String> {
        self.steps
            .iter()
            .filter(|s| completed.iter().any(|c| c == s.name()))
            .filter_map(|s| s.compensating_action())
            .collect()
    }

    /// Execute the steps in order.
    ///
    /// Before each step the deadline and the credential lifetime are
    /// checked; either running out aborts the run.
    pub fn execute(&self, ctx: &mut StepContext, deadline: Option<Instant>) -> AuditResult<PipelineRun> {
        self.execute_tracked(ctx, deadline, &RunProgress::new())
    }

    /// Like [`execute`](Self::execute), publishing each finished step to
    /// `progress` and stopping at the next step boundary once it is
    /// abandoned
    pub fn execute_tracked(
        &self,
        ctx: &mut StepContext,
        deadline: Option<Instant>,
        progress: &RunProgress,
    ) -> AuditResult<PipelineRun> {
        let mut run = PipelineRun::default();
        run.transition(RemediationState::Started);

        for (index, step) in self.steps.iter().enumerate() {
            if progress.is_abandoned() || deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(AuditError::RemediationTimedOut {
                    finding_id: ctx.request().finding_id.clone(),
                    completed: run.completed_steps(),
                });
            }

            ctx.identity().ensure_valid_at(Utc::now())?;

            run.transition(RemediationState::Step {
                index: index + 1,
                name: step.name().to_string(),
            });

            match step.apply(ctx) {
                Ok(StepOutcome::AlreadyRemediated(reason)) => {
                    run.steps.push(StepRecord {
                        name: step.name().to_string(),
                        outcome: StepOutcome::AlreadyRemediated(reason.clone()),
                    });
                    progress.record_step(step.name());
                    run.already_remediated = Some(reason);
                    return Ok(run);
                }
                Ok(outcome) => {
                    run.steps.push(StepRecord {
                        name: step.name().to_string(),
                        outcome,
                    });
                    progress.record_step(step.name());
                }
                Err(source) => {
                    return Err(AuditError::StepExecution {
                        step: step.name().to_string(),
                        completed: run.completed_steps(),
                        source,
                    });
                }
            }
        }

        Ok(run)
    }
}
