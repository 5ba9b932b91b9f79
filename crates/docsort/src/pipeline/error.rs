use thiserror::Error;

use super::task::{InvalidTransition, Stage};
use crate::error::{ClassificationError, ExtractionError, RoutingError, StorageError};

/// A failure inside one pipeline step.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Classification(#[from] ClassificationError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Organize(#[from] StorageError),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

impl PipelineError {
    /// The stage the error belongs to. Transition errors belong to whichever step raised them.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Extraction(_) => Some(Stage::Extraction),
            Self::Classification(_) => Some(Stage::Classification),
            Self::Routing(_) => Some(Stage::Routing),
            Self::Organize(_) => Some(Stage::Organize),
            Self::Transition(_) => None,
        }
    }
}
