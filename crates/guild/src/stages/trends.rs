use std::sync::Arc;

use crate::config::TrendsConfig;
use crate::pipeline::{
    with_retry, ResearchContext, RetryPolicy, StageError, StageHandler, StageScope,
};

use super::TrendDetector;

/// Detects cross-paper trends over the accepted set only.
pub struct TrendStage {
    detector: Arc<dyn TrendDetector>,
    top_k: usize,
    min_papers: usize,
    retry: RetryPolicy,
}

impl TrendStage {
    pub fn new(detector: Arc<dyn TrendDetector>, top_k: usize, min_papers: usize) -> Self {
        Self {
            detector,
            top_k,
            min_papers,
            retry: RetryPolicy::none(),
        }
    }

    pub fn from_config(detector: Arc<dyn TrendDetector>, config: &TrendsConfig) -> Self {
        Self {
            retry: config.retry,
            ..Self::new(detector, config.top_k, config.min_papers)
        }
    }
}

impl StageHandler for TrendStage {
    fn execute(
        &self,
        ctx: &ResearchContext,
        scope: &StageScope<'_>,
    ) -> Result<ResearchContext, StageError> {
        let accepted = ctx.accepted_papers();
        if accepted.len() < self.min_papers.max(1) {
            return Err(StageError::Failed(format!(
                "{} accepted papers, need at least {}",
                accepted.len(),
                self.min_papers.max(1)
            )));
        }

        scope.checkpoint()?;
        let mut trends = with_retry(&self.retry, scope, "detect trends", || {
            self.detector.detect(&ctx.input.query, &accepted)
        })?;

        if trends.len() > self.top_k {
            scope.info(format!(
                "keeping top {} of {} trends",
                self.top_k,
                trends.len()
            ));
            trends.truncate(self.top_k);
        }
        if trends.is_empty() {
            scope.warn("no trends detected");
        }

        let mut next = ctx.clone();
        next.trends = trends;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{
        CancelToken, Critique, CritiquedPaper, NoopProgress, PaperRecord, StageKind, Trend,
    };
    use crate::worker::job::JobInput;

    /// One trend per accepted paper.
    struct PerPaperDetector;

    impl TrendDetector for PerPaperDetector {
        fn detect(&self, _query: &str, papers: &[CritiquedPaper]) -> Result<Vec<Trend>, StageError> {
            Ok(papers
                .iter()
                .map(|p| Trend {
                    label: p.paper.title.clone(),
                    statement: format!("more work like {}", p.paper.title),
                    paper_ids: vec![p.paper.paper_id.clone()],
                    growth: None,
                })
                .collect())
        }
    }

    fn context(accepted: &[bool]) -> ResearchContext {
        let mut ctx = ResearchContext::new(JobInput::new("q"));
        for (i, accepted) in accepted.iter().enumerate() {
            let id = format!("p{}", i);
            ctx.papers.push(PaperRecord::new(id.clone(), id.clone(), "arXiv"));
            ctx.critiques.push(Critique {
                paper_id: id,
                novelty: 5,
                methodology: 5,
                relevance: 7,
                rationale: String::new(),
                accepted: *accepted,
            });
        }
        ctx
    }

    fn run(stage: &TrendStage, ctx: &ResearchContext) -> Result<ResearchContext, StageError> {
        let cancel = CancelToken::new();
        let scope = StageScope::new(StageKind::AnalyzeTrends, &cancel, &NoopProgress);
        stage.execute(ctx, &scope)
    }

    #[test]
    fn test_uses_accepted_papers_only() {
        let stage = TrendStage::new(Arc::new(PerPaperDetector), 5, 1);

        let next = run(&stage, &context(&[true, false, true])).unwrap();

        let ids: Vec<&str> = next.trends.iter().map(|t| t.paper_ids[0].as_str()).collect();
        assert_eq!(ids, vec!["p0", "p2"]);
    }

    #[test]
    fn test_keeps_top_k() {
        let stage = TrendStage::new(Arc::new(PerPaperDetector), 2, 1);

        let next = run(&stage, &context(&[true, true, true, true])).unwrap();
        assert_eq!(next.trends.len(), 2);
    }

    #[test]
    fn test_too_few_accepted_papers() {
        let stage = TrendStage::new(Arc::new(PerPaperDetector), 5, 2);

        match run(&stage, &context(&[true, false])) {
            Err(StageError::Failed(reason)) => assert!(reason.contains("need at least 2")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
