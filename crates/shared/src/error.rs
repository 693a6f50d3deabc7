use thiserror::Error;

/// A newsletter document was built with an empty required field.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("newsletter {0} is required")]
pub struct DocumentError(pub &'static str);

/// Summarization was requested for zero newsletters.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("newsletters list cannot be empty")]
pub struct EmptyInputError;

/// One AI summarization request failed. Never retried by the requester.
#[derive(Debug, Error)]
pub enum AiRequestError {
    #[error("AI request failed: {0}")]
    Transport(String),
    #[error("AI returned an empty response")]
    EmptyResponse,
    #[error("AI response is not a valid summary: {0}")]
    MalformedResponse(String),
}

impl AiRequestError {
    /// Stable identifier used when recording the failure.
    pub fn kind(&self) -> &'static str {
        match self {
            AiRequestError::Transport(_) => "transport",
            AiRequestError::EmptyResponse => "empty_response",
            AiRequestError::MalformedResponse(_) => "malformed_response",
        }
    }
}

/// A digest email could not be constructed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EmailError {
    #[error("recipient must be a valid email address: {0:?}")]
    InvalidRecipient(String),
    #[error("email {0} is required")]
    MissingField(&'static str),
}
