//! Centralized error types for the Flowmesh core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

/// Application-wide error type for graph edits and pipeline control.
///
/// Graph edits are validate-then-apply: any of these returned from an edit
/// operation means state was left untouched.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum FlowError {
    /// The named component is not in the registry.
    #[error("Component not found: {0}")]
    ComponentNotFound(String),

    /// Constructor arguments failed schema validation.
    #[error("Invalid init args: {0}")]
    InvalidArgs(String),

    /// A node with the requested id already exists.
    #[error("Duplicate node id: {0}")]
    DuplicateId(String),

    /// The referenced node does not exist.
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// The referenced slot does not exist on the node's component.
    #[error("Unknown slot: {0}")]
    UnknownSlot(String),

    /// Source output type and target input type differ.
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// An edge with the same four-tuple already exists.
    #[error("Duplicate edge: {0}")]
    DuplicateEdge(String),

    /// Adding the edge would close a cycle.
    #[error("Cycle detected: {0}")]
    CycleDetected(String),

    /// The referenced edge does not exist.
    #[error("Edge not found: {0}")]
    EdgeNotFound(String),

    /// `start_all` was called while a session is already active.
    #[error("Pipeline already running")]
    AlreadyRunning,

    /// The subscriber id is already attached to the channel.
    #[error("Already subscribed: {0}")]
    AlreadySubscribed(String),

    /// The channel was closed.
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FlowError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ComponentNotFound(_) => "ComponentNotFound",
            Self::InvalidArgs(_) => "InvalidArgs",
            Self::DuplicateId(_) => "DuplicateId",
            Self::NodeNotFound(_) => "NodeNotFound",
            Self::UnknownSlot(_) => "UnknownSlot",
            Self::TypeMismatch(_) => "TypeMismatch",
            Self::DuplicateEdge(_) => "DuplicateEdge",
            Self::CycleDetected(_) => "CycleDetected",
            Self::EdgeNotFound(_) => "EdgeNotFound",
            Self::AlreadyRunning => "AlreadyRunning",
            Self::AlreadySubscribed(_) => "AlreadySubscribed",
            Self::ChannelClosed(_) => "ChannelClosed",
            Self::Internal(_) => "Internal",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NodeNotFound(_) | Self::EdgeNotFound(_) | Self::ComponentNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::InvalidArgs(_)
            | Self::UnknownSlot(_)
            | Self::TypeMismatch(_)
            | Self::DuplicateEdge(_)
            | Self::CycleDetected(_) => StatusCode::BAD_REQUEST,
            Self::DuplicateId(_) | Self::AlreadyRunning => StatusCode::CONFLICT,
            Self::AlreadySubscribed(_) | Self::ChannelClosed(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl ErrorCode for FlowError {
    fn code(&self) -> &'static str {
        FlowError::code(self)
    }
}

/// Convenient Result alias for application-wide operations.
pub type FlowResult<T> = Result<T, FlowError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    detail: String,
}

impl IntoResponse for FlowError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Component errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors raised from inside a component's `start`/`step`.
///
/// These never surface to the control API caller; the scheduler records the
/// message on the node and moves it to `error` status.
#[derive(Debug, Error)]
pub enum ComponentError {
    /// Constructor arguments could not be parsed into the component's config.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The component's work function failed.
    #[error("{0}")]
    Failed(String),
}

impl ComponentError {
    /// Shorthand for a runtime failure with a formatted message.
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

impl From<serde_json::Error> for ComponentError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result alias for component implementations.
pub type ComponentResult<T> = Result<T, ComponentError>;
