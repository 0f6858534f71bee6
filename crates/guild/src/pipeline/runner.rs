use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, info_span};

use super::cancel::CancelToken;
use super::context::{ResearchContext, ResearchResult};
use super::error::PipelineError;
use super::progress::{ProgressEvent, ProgressReporter};
use super::stage::{Stage, StageKind, StageScope, StageSet};

/// Where a pipeline run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    NotStarted,
    Running(StageKind),
    Completed,
    Aborted,
}

impl PipelineState {
    pub fn is_finished(self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Aborted)
    }
}

/// Outcome of driving one context through all stages.
#[derive(Debug)]
pub struct PipelineRun {
    pub state: PipelineState,
    pub outcome: Result<ResearchResult, PipelineError>,
    /// Context after the last stage that succeeded.
    pub context: ResearchContext,
}

/// Fixed, strictly sequential five-stage pipeline.
pub struct Pipeline {
    stages: [Stage; 5],
}

impl Pipeline {
    pub fn new(set: StageSet) -> Self {
        let StageSet {
            fetch,
            summarize,
            critique,
            analyze_trends,
            plan,
        } = set;

        Self {
            stages: [
                Stage::new(StageKind::Fetch, fetch),
                Stage::new(StageKind::Summarize, summarize),
                Stage::new(StageKind::Critique, critique),
                Stage::new(StageKind::AnalyzeTrends, analyze_trends),
                Stage::new(StageKind::Plan, plan),
            ],
        }
    }

    pub fn stage_kinds(&self) -> impl Iterator<Item = StageKind> + '_ {
        self.stages.iter().map(Stage::kind)
    }

    /// Run every stage in order. The first failure aborts the run; later
    /// stages never execute and the returned context is the one produced by
    /// the last successful stage.
    pub fn run(
        &self,
        mut ctx: ResearchContext,
        progress: &dyn ProgressReporter,
        cancel: &CancelToken,
    ) -> PipelineRun {
        let _pipeline_span = info_span!("pipeline", query = %ctx.input.query).entered();
        let mut state = PipelineState::NotStarted;

        for stage in &self.stages {
            let kind = stage.kind();

            if cancel.is_cancelled() {
                progress.report(ProgressEvent::Cancelled { next: kind });
                transition(&mut state, PipelineState::Aborted);
                return PipelineRun {
                    state,
                    outcome: Err(PipelineError::Cancelled { stage: kind }),
                    context: ctx,
                };
            }

            let _step = info_span!("stage", name = kind.name()).entered();
            transition(&mut state, PipelineState::Running(kind));
            progress.report(ProgressEvent::StageStarted(kind));

            let scope = StageScope::new(kind, cancel, progress);
            match execute_guarded(stage, &ctx, &scope) {
                Ok(next) => {
                    ctx = next;
                    progress.report(ProgressEvent::StageCompleted(kind));
                }
                Err(err) => {
                    progress.report(ProgressEvent::StageFailed {
                        stage: kind,
                        reason: err.reason(),
                    });
                    transition(&mut state, PipelineState::Aborted);
                    return PipelineRun {
                        state,
                        outcome: Err(err),
                        context: ctx,
                    };
                }
            }
        }

        transition(&mut state, PipelineState::Completed);
        let result = ResearchResult::from_context(&ctx);
        PipelineRun {
            state,
            outcome: Ok(result),
            context: ctx,
        }
    }
}

fn transition(state: &mut PipelineState, next: PipelineState) {
    debug!(from = ?*state, to = ?next, "pipeline transition");
    *state = next;
}

/// Run one stage, turning a panic inside the handler into `InternalFault`.
fn execute_guarded(
    stage: &Stage,
    ctx: &ResearchContext,
    scope: &StageScope<'_>,
) -> Result<ResearchContext, PipelineError> {
    let kind = stage.kind();
    match panic::catch_unwind(AssertUnwindSafe(|| stage.execute(ctx, scope))) {
        Ok(Ok(next)) => Ok(next),
        Ok(Err(err)) => Err(PipelineError::from_stage(kind, err)),
        Err(payload) => Err(PipelineError::InternalFault {
            stage: Some(kind),
            detail: panic_message(payload.as_ref()),
        }),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "stage panicked".to_string()
    }
}
