use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::pipeline::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// SQLite file for finished results. Unset means results are only kept
    /// in memory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub stages: StagesConfig,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_queue_capacity() -> usize {
    64
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            database_path: None,
            logging: LoggingConfig::default(),
            stages: StagesConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `"info"` or `"guild=debug,warn"`.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StagesConfig {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub summarize: SummarizeConfig,
    #[serde(default)]
    pub critique: CritiqueConfig,
    #[serde(default)]
    pub trends: TrendsConfig,
    #[serde(default)]
    pub plan: PlanConfig,
}

impl StagesConfig {
    /// Every per-stage retry policy, labelled for error messages.
    pub fn retry_policies(&self) -> [(&'static str, &RetryPolicy); 5] {
        [
            ("fetch", &self.fetch.retry),
            ("summarize", &self.summarize.retry),
            ("critique", &self.critique.retry),
            ("trends", &self.trends.retry),
            ("plan", &self.plan.retry),
        ]
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default)]
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummarizeConfig {
    #[serde(default)]
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CritiqueConfig {
    /// Summaries shorter than this are rejected without review.
    #[serde(default = "default_min_summary_len")]
    pub min_summary_len: usize,
    /// Minimum relevance score (0..=10) for a paper to be accepted.
    #[serde(default = "default_accept_threshold")]
    pub accept_threshold: u8,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_min_summary_len() -> usize {
    50
}

fn default_accept_threshold() -> u8 {
    6
}

impl Default for CritiqueConfig {
    fn default() -> Self {
        Self {
            min_summary_len: default_min_summary_len(),
            accept_threshold: default_accept_threshold(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendsConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_min_papers")]
    pub min_papers: usize,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_top_k() -> usize {
    5
}

fn default_min_papers() -> usize {
    1
}

impl Default for TrendsConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_papers: default_min_papers(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_novelty_weight")]
    pub novelty_weight: f64,
    #[serde(default = "default_relevance_weight")]
    pub relevance_weight: f64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_top_n() -> usize {
    5
}

fn default_novelty_weight() -> f64 {
    0.4
}

fn default_relevance_weight() -> f64 {
    0.6
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            novelty_weight: default_novelty_weight(),
            relevance_weight: default_relevance_weight(),
            retry: RetryPolicy::default(),
        }
    }
}
