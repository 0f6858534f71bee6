use std::sync::Arc;

use crate::config::CritiqueConfig;
use crate::pipeline::{
    with_retry, Critique, ResearchContext, RetryPolicy, StageError, StageHandler, StageScope,
};

use super::{clamp_score, Reviewer};

/// Scores every summary and decides which papers are accepted.
///
/// Summaries shorter than `min_summary_len` characters are rejected without
/// calling the reviewer. A paper is accepted when its relevance score reaches
/// `accept_threshold`.
pub struct CritiqueStage {
    reviewer: Arc<dyn Reviewer>,
    min_summary_len: usize,
    accept_threshold: u8,
    retry: RetryPolicy,
}

impl CritiqueStage {
    pub fn new(reviewer: Arc<dyn Reviewer>, min_summary_len: usize, accept_threshold: u8) -> Self {
        Self {
            reviewer,
            min_summary_len,
            accept_threshold,
            retry: RetryPolicy::none(),
        }
    }

    pub fn from_config(reviewer: Arc<dyn Reviewer>, config: &CritiqueConfig) -> Self {
        Self::new(reviewer, config.min_summary_len, config.accept_threshold)
            .with_retry(config.retry)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn too_short(paper_id: &str) -> Critique {
        Critique {
            paper_id: paper_id.to_string(),
            novelty: 0,
            methodology: 0,
            relevance: 0,
            rationale: "summary too short to review".to_string(),
            accepted: false,
        }
    }
}

impl StageHandler for CritiqueStage {
    fn execute(
        &self,
        ctx: &ResearchContext,
        scope: &StageScope<'_>,
    ) -> Result<ResearchContext, StageError> {
        if ctx.summaries.is_empty() {
            return Err(StageError::failed("no summaries to critique"));
        }

        let mut critiques = Vec::with_capacity(ctx.summaries.len());
        for summary in &ctx.summaries {
            scope.checkpoint()?;

            let Some(paper) = ctx.paper(&summary.paper_id) else {
                scope.warn(format!(
                    "skipping summary for unknown paper {}",
                    summary.paper_id
                ));
                continue;
            };

            if summary.text.chars().count() < self.min_summary_len {
                critiques.push(Self::too_short(&paper.paper_id));
                continue;
            }

            let what = format!("review {}", paper.paper_id);
            let review = with_retry(&self.retry, scope, &what, || {
                self.reviewer.review(&ctx.input.query, paper, &summary.text)
            })?;

            let relevance = clamp_score(review.relevance);
            critiques.push(Critique {
                paper_id: paper.paper_id.clone(),
                novelty: clamp_score(review.novelty),
                methodology: clamp_score(review.methodology),
                relevance,
                rationale: review.rationale,
                accepted: relevance >= self.accept_threshold,
            });
        }

        let accepted = critiques.iter().filter(|c| c.accepted).count();
        scope.info(format!(
            "accepted {} of {} papers",
            accepted,
            critiques.len()
        ));

        let mut next = ctx.clone();
        next.critiques = critiques;
        Ok(next)
    }
}
