//! Item-level failures at each collaborator boundary.
//!
//! None of these abort a cohort run: the batch runner records them as item
//! outcomes and moves on. Errors that are allowed to end the run travel as
//! `anyhow::Error` instead.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("malformed trial link {0:?}: no path segment")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("record source returned status {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unreadable record body: {0}")]
    Body(String),
}

impl FetchError {
    /// HTTP status, when the source answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status(code) => Some(*code),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generator request failed: {0}")]
    Transport(String),
    #[error("generator returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("generator response carried no text")]
    EmptyResponse,
    #[error("undecodable generator response: {0}")]
    Decode(String),
}
