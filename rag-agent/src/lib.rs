//! Retrieval and answer synthesis over PKU Treehole posts.
//!
//! [`TreeholeAgent`] drives three query modes: a single keyword search, an
//! engine-directed iterative search, and course review with optional
//! comparison across instructors.

pub mod agent;
pub mod comment_store;
pub mod comparison;
pub mod context;
pub mod orchestrator;
pub mod progress;
pub mod prompts;
pub mod review_extractor;
pub mod search;

pub use agent::TreeholeAgent;
pub use comment_store::CommentStore;
pub use comparison::{ComparisonAggregator, ComparisonLimits, ComparisonPayload};
pub use context::CommentLimit;
pub use orchestrator::{OrchestratorSettings, SearchOrchestrator, SearchRun};
pub use progress::{ProgressSink, RecordingProgress};
pub use review_extractor::ReviewExtractor;
pub use search::{PostSearcher, SearchOutcome};
