//! Workflow error taxonomy
//!
//! Every policy violation is a typed, caller-facing outcome; the engine
//! never panics for them. Only `Store` wraps conditions the caller
//! cannot act on (database unavailability, a lost guarded update, a
//! broken invariant) and is surfaced opaquely.

use thiserror::Error;

use tontine_core::{ActionKind, ReasonError, ResourceRef};

use crate::request::RequestStatus;
use crate::store::StoreError;

/// Caller-facing outcomes of workflow operations
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A non-terminal request already exists for this action + resource
    #[error("A {action} request is already pending for resource {resource_id}")]
    DuplicatePending {
        action: ActionKind,
        resource_id: String,
    },

    #[error("Validation request not found: {0}")]
    RequestNotFound(String),

    /// The resource resolver has no such resource
    #[error("Resource not found: {0}")]
    ResourceNotFound(ResourceRef),

    /// The resource directory could not answer at all
    #[error("Resource directory unavailable: {0}")]
    ResolverUnavailable(String),

    /// The caller is not the right party for this operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The request is terminal, or the caller's stage is not active
    #[error("Request is {status}; operation not applicable")]
    WrongState { status: RequestStatus },

    /// Wrong code; one attempt was consumed
    #[error("Invalid code ({attempts_remaining} attempt(s) remaining)")]
    InvalidCode { attempts_remaining: u32 },

    /// The code window or the overall deadline has passed
    #[error("Request or code has expired")]
    Expired,

    /// The slot's attempt budget is spent; the request cannot be resumed
    #[error("Attempt limit reached; the request must be re-created")]
    AttemptsExceeded,

    /// The completed request already authorized its action once
    #[error("Authorization already consumed")]
    AlreadyConsumed,

    #[error("Invalid reason: {0}")]
    InvalidReason(#[from] ReasonError),

    /// Store-layer failure or broken invariant (opaque to callers)
    #[error("Internal storage error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for workflow operations
pub type ValidationResult<T> = Result<T, ValidationError>;
