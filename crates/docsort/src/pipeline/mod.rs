pub mod config;
pub mod error;
pub mod progress;
pub mod runner;
pub mod task;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use progress::{LogProgress, NoopProgress, ProgressEvent, ProgressReporter};
pub use runner::Pipeline;
pub use task::{DocumentTask, InvalidTransition, Stage, TaskError, TaskState};
