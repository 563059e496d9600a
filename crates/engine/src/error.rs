// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for the engine.

use berth_core::ValidationError;
use berth_storage::{CiStateError, StoreError};
use thiserror::Error;

/// Errors surfaced by the engine facade.
///
/// `status_code` gives the user-visible mapping; the HTTP layer above
/// this crate translates directly.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("project not found: {0}")]
    ProjectNotFound(String),
    #[error("op not found: {0}")]
    OpNotFound(String),
    #[error("conflict: another operation in progress for project {0}")]
    Conflict(String),
    #[error("timeout waiting for workers")]
    Timeout,
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("store error: {0}")]
    Store(StoreError),
    #[error("ci state error: {0}")]
    CiState(#[from] CiStateError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// User-visible status for this failure.
    ///
    /// Accepted-but-async outcomes are not errors and map to 202 at the
    /// boundary; everything here is a refusal or a failure.
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::Validation(_) => 400,
            EngineError::ProjectNotFound(_) | EngineError::OpNotFound(_) => 404,
            EngineError::Conflict(_) => 409,
            EngineError::Timeout
            | EngineError::Publish(_)
            | EngineError::Store(_)
            | EngineError::CiState(_)
            | EngineError::Internal(_) => 500,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ProjectNotFound(id) => EngineError::ProjectNotFound(id),
            StoreError::OpNotFound(id) => EngineError::OpNotFound(id),
            other => EngineError::Store(other),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
