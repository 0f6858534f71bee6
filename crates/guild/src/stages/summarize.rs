use std::sync::Arc;

use crate::config::SummarizeConfig;
use crate::pipeline::{
    with_retry, PaperSummary, ResearchContext, RetryPolicy, StageError, StageHandler, StageScope,
};

use super::Summarizer;

/// Ideas kept per paper; extra ones are dropped.
const MAX_IDEAS: usize = 5;

/// One summary per fetched paper, in paper order.
pub struct SummarizeStage {
    summarizer: Arc<dyn Summarizer>,
    retry: RetryPolicy,
}

impl SummarizeStage {
    pub fn new(summarizer: Arc<dyn Summarizer>, retry: RetryPolicy) -> Self {
        Self { summarizer, retry }
    }

    pub fn from_config(summarizer: Arc<dyn Summarizer>, config: &SummarizeConfig) -> Self {
        Self::new(summarizer, config.retry)
    }
}

impl StageHandler for SummarizeStage {
    fn execute(
        &self,
        ctx: &ResearchContext,
        scope: &StageScope<'_>,
    ) -> Result<ResearchContext, StageError> {
        if ctx.papers.is_empty() {
            return Err(StageError::failed("no papers to summarize"));
        }

        let mut summaries = Vec::with_capacity(ctx.papers.len());
        for paper in &ctx.papers {
            scope.checkpoint()?;
            let what = format!("summarize {}", paper.paper_id);
            let summary = with_retry(&self.retry, scope, &what, || {
                self.summarizer.summarize(paper)
            })?;
            summaries.push(PaperSummary {
                paper_id: paper.paper_id.clone(),
                text: summary.text.trim().to_string(),
                ideas: summary
                    .ideas
                    .iter()
                    .map(|idea| idea.trim())
                    .filter(|idea| !idea.is_empty())
                    .take(MAX_IDEAS)
                    .map(str::to_string)
                    .collect(),
            });
        }

        scope.info(format!("summarized {} papers", summaries.len()));

        let mut next = ctx.clone();
        next.summaries = summaries;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{CancelToken, NoopProgress, PaperRecord, StageKind};
    use crate::stages::Summary;
    use crate::worker::job::JobInput;
    use std::sync::Mutex;

    /// Fails with a transient error the first `flaky` calls.
    struct TitleSummarizer {
        flaky: Mutex<u32>,
    }

    impl Summarizer for TitleSummarizer {
        fn summarize(&self, paper: &PaperRecord) -> Result<Summary, StageError> {
            let mut flaky = self.flaky.lock().unwrap();
            if *flaky > 0 {
                *flaky -= 1;
                return Err(StageError::transient("429 Too Many Requests"));
            }
            let ideas = (1..=7).map(|n| format!(" idea {} ", n));
            Ok(Summary::new(format!("  About {}.  ", paper.title))
                .with_ideas(std::iter::once(String::new()).chain(ideas)))
        }
    }

    fn context(ids: &[&str]) -> ResearchContext {
        let mut ctx = ResearchContext::new(JobInput::new("q"));
        ctx.papers = ids
            .iter()
            .map(|id| PaperRecord::new(*id, format!("title {}", id), "arXiv"))
            .collect();
        ctx
    }

    fn stage(flaky: u32, retry: RetryPolicy) -> SummarizeStage {
        SummarizeStage::new(
            Arc::new(TitleSummarizer {
                flaky: Mutex::new(flaky),
            }),
            retry,
        )
    }

    #[test]
    fn test_one_summary_per_paper() {
        let cancel = CancelToken::new();
        let scope = StageScope::new(StageKind::Summarize, &cancel, &NoopProgress);

        let next = stage(0, RetryPolicy::none())
            .execute(&context(&["a", "b"]), &scope)
            .unwrap();

        assert_eq!(next.summaries.len(), 2);
        assert_eq!(next.summaries[0].paper_id, "a");
        assert_eq!(next.summaries[1].text, "About title b.");
    }

    #[test]
    fn test_ideas_are_trimmed_and_capped() {
        let cancel = CancelToken::new();
        let scope = StageScope::new(StageKind::Summarize, &cancel, &NoopProgress);

        let next = stage(0, RetryPolicy::none())
            .execute(&context(&["a"]), &scope)
            .unwrap();

        let ideas = &next.summaries[0].ideas;
        assert_eq!(ideas.len(), MAX_IDEAS);
        assert_eq!(ideas[0], "idea 1");
        assert_eq!(ideas[4], "idea 5");
    }

    #[test]
    fn test_retries_rate_limited_call() {
        let cancel = CancelToken::new();
        let scope = StageScope::new(StageKind::Summarize, &cancel, &NoopProgress);

        let next = stage(1, RetryPolicy::new(2, 0))
            .execute(&context(&["a"]), &scope)
            .unwrap();
        assert_eq!(next.summaries.len(), 1);
    }

    #[test]
    fn test_failure_leaves_input_untouched() {
        let cancel = CancelToken::new();
        let scope = StageScope::new(StageKind::Summarize, &cancel, &NoopProgress);
        let ctx = context(&["a", "b"]);

        let result = stage(5, RetryPolicy::none()).execute(&ctx, &scope);

        assert!(matches!(result, Err(StageError::Failed(_))));
        assert!(ctx.summaries.is_empty());
    }

    #[test]
    fn test_empty_paper_list_fails() {
        let cancel = CancelToken::new();
        let scope = StageScope::new(StageKind::Summarize, &cancel, &NoopProgress);

        let result = stage(0, RetryPolicy::none()).execute(&context(&[]), &scope);
        assert_eq!(result, Err(StageError::failed("no papers to summarize")));
    }
}
