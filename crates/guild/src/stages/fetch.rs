use std::collections::HashSet;
use std::sync::Arc;

use crate::config::FetchConfig;
use crate::pipeline::{
    with_retry, ResearchContext, RetryPolicy, StageError, StageHandler, StageScope,
};

use super::PaperSource;

/// Queries every source in order and merges the results.
///
/// Papers are de-duplicated by `paper_id`, keeping the first one seen, and
/// capped at the job's `max_results`. A source that fails permanently is
/// logged and skipped; the stage only fails when no paper was found at all.
pub struct FetchStage {
    sources: Vec<Arc<dyn PaperSource>>,
    retry: RetryPolicy,
}

impl FetchStage {
    pub fn new(sources: Vec<Arc<dyn PaperSource>>, retry: RetryPolicy) -> Self {
        Self { sources, retry }
    }

    pub fn from_config(sources: Vec<Arc<dyn PaperSource>>, config: &FetchConfig) -> Self {
        Self::new(sources, config.retry)
    }
}

impl StageHandler for FetchStage {
    fn execute(
        &self,
        ctx: &ResearchContext,
        scope: &StageScope<'_>,
    ) -> Result<ResearchContext, StageError> {
        let input = &ctx.input;
        let limit = input.max_results as usize;
        let mut seen: HashSet<String> = ctx.papers.iter().map(|p| p.paper_id.clone()).collect();
        let mut papers = ctx.papers.clone();
        let mut source_errors = Vec::new();

        for source in &self.sources {
            if papers.len() >= limit {
                break;
            }
            scope.checkpoint()?;

            let what = format!("search {}", source.name());
            let found = match with_retry(&self.retry, scope, &what, || source.search(input)) {
                Ok(found) => found,
                Err(StageError::Cancelled) => return Err(StageError::Cancelled),
                Err(e) => {
                    scope.warn(format!("source {} failed: {}", source.name(), e));
                    source_errors.push(format!("{}: {}", source.name(), e));
                    continue;
                }
            };

            let before = papers.len();
            for paper in found {
                if papers.len() >= limit {
                    break;
                }
                if seen.insert(paper.paper_id.clone()) {
                    papers.push(paper);
                }
            }
            scope.info(format!(
                "{} returned {} new papers",
                source.name(),
                papers.len() - before
            ));
        }

        if papers.is_empty() {
            let mut reason = format!("no papers found for '{}'", input.query);
            if !source_errors.is_empty() {
                reason.push_str(&format!(" ({})", source_errors.join("; ")));
            }
            return Err(StageError::Failed(reason));
        }

        let mut next = ctx.clone();
        next.papers = papers;
        Ok(next)
    }
}
