//! Scripted collaborators and builders for creating test scenarios.
//!
//! The collaborators are deterministic stand-ins for the retrieval APIs and
//! language models, so every pipeline run is reproducible.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use guild::config::StagesConfig;
use guild::pipeline::{CritiquedPaper, PaperRecord, ResearchContext, StageScope, Trend};
use guild::stages::{
    standard_stages, Collaborators, PaperSource, PlanWriter, Review, Reviewer, Summarizer,
    Summary, TrendDetector,
};
use guild::{JobInput, StageError, StageHandler, StageSet};

pub fn paper(id: &str, title: &str) -> PaperRecord {
    PaperRecord::new(id, title, "arXiv")
}

/// Returns the same papers for every query.
pub struct StaticSource {
    pub name: String,
    pub papers: Vec<PaperRecord>,
}

impl PaperSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn search(&self, _input: &JobInput) -> Result<Vec<PaperRecord>, StageError> {
        Ok(self.papers.clone())
    }
}

pub struct FailingSource;

impl PaperSource for FailingSource {
    fn name(&self) -> &str {
        "broken"
    }

    fn search(&self, _input: &JobInput) -> Result<Vec<PaperRecord>, StageError> {
        Err(StageError::failed("503 Service Unavailable"))
    }
}

/// Produces a summary long enough to pass the default length check, plus
/// two ideas and a blank one the stage drops.
pub struct TitleSummarizer;

impl Summarizer for TitleSummarizer {
    fn summarize(&self, paper: &PaperRecord) -> Result<Summary, StageError> {
        Ok(Summary::new(format!(
            "{} proposes a method and evaluates it on standard benchmarks with ablations.",
            paper.title
        ))
        .with_ideas([
            format!("extend {} to multilingual data", paper.paper_id),
            "  ".to_string(),
            format!("release code for {}", paper.paper_id),
        ]))
    }
}

/// Relevance per paper id, everything else gets `default`.
pub struct TableReviewer {
    pub relevance: HashMap<String, u8>,
    pub default: u8,
}

impl Reviewer for TableReviewer {
    fn review(&self, _query: &str, paper: &PaperRecord, _summary: &str) -> Result<Review, StageError> {
        let relevance = self
            .relevance
            .get(&paper.paper_id)
            .copied()
            .unwrap_or(self.default);
        Ok(Review {
            novelty: relevance / 2 + 1,
            methodology: 6,
            relevance,
            rationale: format!("relevance {}", relevance),
        })
    }
}

/// One trend named after the query, backed by every accepted paper.
pub struct QueryTrendDetector;

impl TrendDetector for QueryTrendDetector {
    fn detect(&self, query: &str, papers: &[CritiquedPaper]) -> Result<Vec<Trend>, StageError> {
        Ok(vec![Trend {
            label: query.to_string(),
            statement: format!("{} papers push on {}", papers.len(), query),
            paper_ids: papers.iter().map(|p| p.paper.paper_id.clone()).collect(),
            growth: Some(papers.len() as f64),
        }])
    }
}

pub struct ReadingWriter;

impl PlanWriter for ReadingWriter {
    fn action(&self, paper: &CritiquedPaper, _trends: &[Trend]) -> Result<String, StageError> {
        Ok(format!("read {}", paper.paper.title))
    }
}

/// Builder for a `StageSet` made of the standard handlers and scripted
/// collaborators.
pub struct ScenarioBuilder {
    papers: Vec<PaperRecord>,
    relevance: HashMap<String, u8>,
    default_relevance: u8,
    broken_source: bool,
    config: StagesConfig,
}

impl ScenarioBuilder {
    pub fn new() -> Self {
        Self {
            papers: Vec::new(),
            relevance: HashMap::new(),
            default_relevance: 5,
            broken_source: false,
            config: StagesConfig::default(),
        }
    }

    pub fn paper(mut self, id: &str, title: &str) -> Self {
        self.papers.push(paper(id, title));
        self
    }

    pub fn relevance(mut self, id: &str, score: u8) -> Self {
        self.relevance.insert(id.to_string(), score);
        self
    }

    /// Put a failing source in front of the static one.
    pub fn with_broken_source(mut self) -> Self {
        self.broken_source = true;
        self
    }

    pub fn config(mut self, config: StagesConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> StageSet {
        let mut sources: Vec<Arc<dyn PaperSource>> = Vec::new();
        if self.broken_source {
            sources.push(Arc::new(FailingSource));
        }
        sources.push(Arc::new(StaticSource {
            name: "static".to_string(),
            papers: self.papers,
        }));

        standard_stages(
            Collaborators {
                sources,
                summarizer: Arc::new(TitleSummarizer),
                reviewer: Arc::new(TableReviewer {
                    relevance: self.relevance,
                    default: self.default_relevance,
                }),
                detector: Arc::new(QueryTrendDetector),
                writer: Arc::new(ReadingWriter),
            },
            &self.config,
        )
    }
}

/// The usual three-paper scenario: two relevant papers, one off-topic.
pub fn transformer_scenario() -> StageSet {
    ScenarioBuilder::new()
        .paper("2401.00001", "Sparse Attention at Scale")
        .paper("2401.00002", "Linear Transformers Revisited")
        .paper("2401.00003", "Protein Folding with Diffusion")
        .relevance("2401.00001", 9)
        .relevance("2401.00002", 7)
        .relevance("2401.00003", 2)
        .build()
}

/// A handler that counts how often it started and then blocks until the
/// job is cancelled. Gives up after `limit` and returns the context as-is.
pub fn blocking_stage(started: Arc<AtomicUsize>, limit: Duration) -> Arc<dyn StageHandler> {
    Arc::new(
        move |ctx: &ResearchContext, scope: &StageScope<'_>| -> Result<ResearchContext, StageError> {
            started.fetch_add(1, Ordering::SeqCst);
            let deadline = Instant::now() + limit;
            while Instant::now() < deadline {
                scope.checkpoint()?;
                thread::sleep(Duration::from_millis(2));
            }
            Ok(ctx.clone())
        },
    )
}

/// Builder for config JSON documents.
pub struct ConfigBuilder {
    value: Value,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            value: json!({ "version": "1.0" }),
        }
    }

    pub fn set(mut self, key: &str, value: Value) -> Self {
        self.value[key] = value;
        self
    }

    pub fn stage(mut self, stage: &str, value: Value) -> Self {
        if self.value.get("stages").is_none() {
            self.value["stages"] = json!({});
        }
        self.value["stages"][stage] = value;
        self
    }

    pub fn build(&self) -> String {
        self.value.to_string()
    }
}
