pub mod cancel;
pub mod context;
pub mod error;
pub mod progress;
pub mod retry;
pub mod runner;
pub mod stage;

pub use cancel::CancelToken;
pub use context::{
    Critique, CritiquedPaper, PaperRecord, PaperSummary, Recommendation, ResearchContext,
    ResearchResult, Trend,
};
pub use error::{PipelineError, StageError};
pub use progress::{JobProgress, NoopProgress, ProgressEvent, ProgressReporter};
pub use retry::{with_retry, RetryPolicy};
pub use runner::{Pipeline, PipelineRun, PipelineState};
pub use stage::{Stage, StageHandler, StageKind, StageScope, StageSet};
