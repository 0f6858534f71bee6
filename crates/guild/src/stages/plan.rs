use std::cmp::Ordering;
use std::sync::Arc;

use crate::config::PlanConfig;
use crate::pipeline::{
    with_retry, CritiquedPaper, Recommendation, ResearchContext, RetryPolicy, StageError,
    StageHandler, StageScope,
};

use super::PlanWriter;

/// Builds the ranked reading plan.
///
/// Accepted papers are ranked by
/// `novelty_weight * novelty + relevance_weight * relevance`, ties broken by
/// paper id, and the first `top_n` get an action line from the writer.
pub struct PlanStage {
    writer: Arc<dyn PlanWriter>,
    top_n: usize,
    novelty_weight: f64,
    relevance_weight: f64,
    retry: RetryPolicy,
}

impl PlanStage {
    pub fn new(writer: Arc<dyn PlanWriter>, top_n: usize) -> Self {
        Self {
            writer,
            top_n,
            novelty_weight: 0.4,
            relevance_weight: 0.6,
            retry: RetryPolicy::none(),
        }
    }

    pub fn from_config(writer: Arc<dyn PlanWriter>, config: &PlanConfig) -> Self {
        Self {
            writer,
            top_n: config.top_n,
            novelty_weight: config.novelty_weight,
            relevance_weight: config.relevance_weight,
            retry: config.retry,
        }
    }

    pub fn with_weights(mut self, novelty_weight: f64, relevance_weight: f64) -> Self {
        self.novelty_weight = novelty_weight;
        self.relevance_weight = relevance_weight;
        self
    }

    fn score(&self, paper: &CritiquedPaper) -> f64 {
        self.novelty_weight * f64::from(paper.critique.novelty)
            + self.relevance_weight * f64::from(paper.critique.relevance)
    }

    fn rank(&self, mut papers: Vec<CritiquedPaper>) -> Vec<CritiquedPaper> {
        papers.sort_by(|a, b| {
            self.score(b)
                .partial_cmp(&self.score(a))
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.paper.paper_id.cmp(&b.paper.paper_id))
        });
        papers.truncate(self.top_n);
        papers
    }
}

impl StageHandler for PlanStage {
    fn execute(
        &self,
        ctx: &ResearchContext,
        scope: &StageScope<'_>,
    ) -> Result<ResearchContext, StageError> {
        let ranked = self.rank(ctx.accepted_papers());
        if ranked.is_empty() {
            return Err(StageError::failed("nothing to plan: no accepted papers"));
        }

        let mut plan = Vec::with_capacity(ranked.len());
        for (i, paper) in ranked.iter().enumerate() {
            scope.checkpoint()?;
            let what = format!("plan action for {}", paper.paper.paper_id);
            let action = with_retry(&self.retry, scope, &what, || {
                self.writer.action(paper, &ctx.trends)
            })?;
            plan.push(Recommendation {
                rank: i + 1,
                paper_id: Some(paper.paper.paper_id.clone()),
                title: paper.paper.title.clone(),
                action,
            });
        }

        let mut next = ctx.clone();
        next.plan = plan;
        Ok(next)
    }
}
