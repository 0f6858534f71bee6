//! Standard stage handlers.
//!
//! Each handler holds the deterministic part of a stage (ordering,
//! de-duplication, thresholds, ranking) and delegates the external work to a
//! narrow collaborator trait. HTTP and language-model implementations of
//! those traits live outside this crate.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::StagesConfig;
use crate::pipeline::{CritiquedPaper, PaperRecord, StageError, StageSet, Trend};
use crate::worker::job::JobInput;

pub mod critique;
pub mod fetch;
pub mod plan;
pub mod summarize;
pub mod trends;

pub use critique::CritiqueStage;
pub use fetch::FetchStage;
pub use plan::PlanStage;
pub use summarize::SummarizeStage;
pub use trends::TrendStage;

/// A paper-retrieval backend such as arXiv or Semantic Scholar.
pub trait PaperSource: Send + Sync {
    fn name(&self) -> &str;

    fn search(&self, input: &JobInput) -> Result<Vec<PaperRecord>, StageError>;
}

/// What a summarizer returns for one paper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub text: String,
    /// Suggested future-improvement ideas, usually three to five.
    #[serde(default)]
    pub ideas: Vec<String>,
}

impl Summary {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ideas: Vec::new(),
        }
    }

    pub fn with_ideas<I, S>(mut self, ideas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ideas = ideas.into_iter().map(Into::into).collect();
        self
    }
}

pub trait Summarizer: Send + Sync {
    fn summarize(&self, paper: &PaperRecord) -> Result<Summary, StageError>;
}

/// Raw reviewer verdict. Scores are clamped to 0..=10 by [`CritiqueStage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub novelty: u8,
    pub methodology: u8,
    pub relevance: u8,
    pub rationale: String,
}

pub trait Reviewer: Send + Sync {
    fn review(&self, query: &str, paper: &PaperRecord, summary: &str)
        -> Result<Review, StageError>;
}

pub trait TrendDetector: Send + Sync {
    fn detect(&self, query: &str, papers: &[CritiquedPaper]) -> Result<Vec<Trend>, StageError>;
}

pub trait PlanWriter: Send + Sync {
    /// One next-step line for a paper that made it into the reading plan.
    fn action(&self, paper: &CritiquedPaper, trends: &[Trend]) -> Result<String, StageError>;
}

/// The collaborators the standard handlers are built on.
#[derive(Clone)]
pub struct Collaborators {
    pub sources: Vec<Arc<dyn PaperSource>>,
    pub summarizer: Arc<dyn Summarizer>,
    pub reviewer: Arc<dyn Reviewer>,
    pub detector: Arc<dyn TrendDetector>,
    pub writer: Arc<dyn PlanWriter>,
}

/// Builds the five standard handlers with their per-stage config.
pub fn standard_stages(collaborators: Collaborators, config: &StagesConfig) -> StageSet {
    let Collaborators {
        sources,
        summarizer,
        reviewer,
        detector,
        writer,
    } = collaborators;

    StageSet {
        fetch: Arc::new(FetchStage::from_config(sources, &config.fetch)),
        summarize: Arc::new(SummarizeStage::from_config(summarizer, &config.summarize)),
        critique: Arc::new(CritiqueStage::from_config(reviewer, &config.critique)),
        analyze_trends: Arc::new(TrendStage::from_config(detector, &config.trends)),
        plan: Arc::new(PlanStage::from_config(writer, &config.plan)),
    }
}

pub(crate) fn clamp_score(score: u8) -> u8 {
    score.min(10)
}
