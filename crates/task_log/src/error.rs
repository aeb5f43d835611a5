//! Pipeline error types

use dispatcher::DispatcherError;
use thiserror::Error;

/// Errors raised while assembling the pipeline
///
/// The record and flush paths themselves never fail.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required collaborator was not supplied to the builder
    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    /// Sink or dispatcher construction failed
    #[error("dispatcher error: {0}")]
    Dispatcher(#[from] DispatcherError),
}
