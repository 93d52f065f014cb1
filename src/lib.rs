#[path = "core/batch.rs"]
pub mod batch;

#[path = "core/choice.rs"]
pub mod choice;

#[path = "core/config.rs"]
pub mod config;

#[path = "core/error.rs"]
pub mod error;

#[path = "core/frame.rs"]
pub mod frame;

#[path = "core/length_effects.rs"]
pub mod length_effects;

#[path = "core/progress.rs"]
pub mod progress;

#[path = "core/relatedness.rs"]
pub mod relatedness;

#[path = "core/report.rs"]
pub mod report;

#[path = "core/scorer.rs"]
pub mod scorer;

#[path = "core/selector.rs"]
pub mod selector;

#[path = "core/trial.rs"]
pub mod trial;

pub use batch::{BatchProcessor, RunState, RunSummary};
pub use config::{AlignmentMode, AnalysisConfig, MalformedPolicy};
pub use error::{AnalysisError, Result};
