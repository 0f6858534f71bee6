use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::worker::job::JobInput;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub paper_id: String,
    pub title: String,
    /// Retrieval source, e.g. "arXiv" or "Semantic Scholar".
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
}

impl PaperRecord {
    pub fn new(paper_id: impl Into<String>, title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            paper_id: paper_id.into(),
            title: title.into(),
            source: source.into(),
            doi: None,
            pdf_url: None,
            published: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperSummary {
    pub paper_id: String,
    pub text: String,
    /// Future-work ideas suggested alongside the summary.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ideas: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Critique {
    pub paper_id: String,
    /// Scores are 0..=10.
    pub novelty: u8,
    pub methodology: u8,
    pub relevance: u8,
    pub rationale: String,
    pub accepted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub label: String,
    pub statement: String,
    #[serde(default)]
    pub paper_ids: Vec<String>,
    /// Week-over-week growth of the topic, when the detector measures it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub growth: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// 1-based position in the reading plan.
    pub rank: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paper_id: Option<String>,
    pub title: String,
    pub action: String,
}

/// A paper that made it through critique, joined with its summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CritiquedPaper {
    pub paper: PaperRecord,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ideas: Vec<String>,
    pub critique: Critique,
}

/// State accumulated from stage to stage within one job.
///
/// Stages receive it by shared reference and hand back a replacement, so a
/// stage that fails halfway leaves the previous value untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchContext {
    pub input: JobInput,
    // Fetch
    pub papers: Vec<PaperRecord>,
    // Summarize
    pub summaries: Vec<PaperSummary>,
    // Critique
    pub critiques: Vec<Critique>,
    // AnalyzeTrends
    pub trends: Vec<Trend>,
    // Plan
    pub plan: Vec<Recommendation>,
}

impl ResearchContext {
    pub fn new(input: JobInput) -> Self {
        Self {
            input,
            papers: Vec::new(),
            summaries: Vec::new(),
            critiques: Vec::new(),
            trends: Vec::new(),
            plan: Vec::new(),
        }
    }

    pub fn paper(&self, paper_id: &str) -> Option<&PaperRecord> {
        self.papers.iter().find(|p| p.paper_id == paper_id)
    }

    /// Accepted papers in critique order, joined with paper record and summary.
    /// Critiques that reference an unknown paper are skipped.
    pub fn accepted_papers(&self) -> Vec<CritiquedPaper> {
        let summaries: HashMap<&str, &PaperSummary> = self
            .summaries
            .iter()
            .map(|s| (s.paper_id.as_str(), s))
            .collect();

        self.critiques
            .iter()
            .filter(|c| c.accepted)
            .filter_map(|critique| {
                let paper = self.paper(&critique.paper_id)?;
                let summary = summaries.get(critique.paper_id.as_str());
                Some(CritiquedPaper {
                    paper: paper.clone(),
                    summary: summary.map(|s| s.text.clone()).unwrap_or_default(),
                    ideas: summary.map(|s| s.ideas.clone()).unwrap_or_default(),
                    critique: critique.clone(),
                })
            })
            .collect()
    }

    pub fn rejected_count(&self) -> usize {
        self.critiques.iter().filter(|c| !c.accepted).count()
    }
}

/// Final output of a job that reached `Done`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    pub query: String,
    pub papers: Vec<CritiquedPaper>,
    pub rejected_count: usize,
    pub trends: Vec<Trend>,
    pub recommendations: Vec<Recommendation>,
}

impl ResearchResult {
    pub fn from_context(ctx: &ResearchContext) -> Self {
        Self {
            query: ctx.input.query.clone(),
            papers: ctx.accepted_papers(),
            rejected_count: ctx.rejected_count(),
            trends: ctx.trends.clone(),
            recommendations: ctx.plan.clone(),
        }
    }
}
