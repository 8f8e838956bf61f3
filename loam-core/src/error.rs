//! Error types for the loam core library.
//!
//! Defines error enums exposed by the public API and a convenient result alias.
//! Module-specific failures (`ConfigError`, `SerializeError`, `BackendError`)
//! live next to the code that raises them and are wrapped into [`CoreError`]
//! at the contract surface.

use std::fmt;

use thiserror::Error;

use crate::{backend::BackendError, config::ConfigError, serialize::SerializeError};

/// Stable codes describing [`GraphError`] variants.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum GraphErrorCode {
    /// A referenced layer is not materialised on the graph.
    LayerNotFound,
    /// A referenced vertex id is not present in the vertex index.
    VertexNotFound,
    /// A vertex id was added twice.
    DuplicateVertex,
}

impl GraphErrorCode {
    /// Return the stable machine-readable representation of this error code.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LayerNotFound => "GRAPH_LAYER_NOT_FOUND",
            Self::VertexNotFound => "GRAPH_VERTEX_NOT_FOUND",
            Self::DuplicateVertex => "GRAPH_DUPLICATE_VERTEX",
        }
    }
}

impl fmt::Display for GraphErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error produced by structural graph operations.
///
/// Absence of an *optional* input is never a `GraphError`: models downgrade
/// to an empty result and read queries return a miss record. These variants
/// cover the operations where absence is a precondition violation.
#[non_exhaustive]
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum GraphError {
    /// A referenced layer is not materialised on the graph.
    #[error("layer `{layer}` not found; available layers: [{}]", available.join(", "))]
    LayerNotFound {
        /// The layer tag the caller asked for.
        layer: String,
        /// Layers that are materialised on the graph.
        available: Vec<String>,
    },
    /// A referenced vertex id is not present in the vertex index.
    #[error("vertex `{vertex}` is not indexed on this graph")]
    VertexNotFound {
        /// The vertex id the caller asked for.
        vertex: String,
    },
    /// A vertex id was added twice.
    #[error("vertex `{vertex}` is already indexed on this graph")]
    DuplicateVertex {
        /// The duplicated vertex id.
        vertex: String,
    },
}

impl GraphError {
    /// Retrieve the stable [`GraphErrorCode`] for this error.
    pub const fn code(&self) -> GraphErrorCode {
        match self {
            Self::LayerNotFound { .. } => GraphErrorCode::LayerNotFound,
            Self::VertexNotFound { .. } => GraphErrorCode::VertexNotFound,
            Self::DuplicateVertex { .. } => GraphErrorCode::DuplicateVertex,
        }
    }
}

/// Stable codes describing [`CoreError`] variants.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum CoreErrorCode {
    /// A structural graph operation failed.
    GraphFailure,
    /// The farm configuration was malformed.
    ConfigInvalid,
    /// Serialized graph state could not be rehydrated.
    DeserializeFailure,
    /// An explicit backend operation was unavailable.
    BackendUnavailable,
    /// A numeric routine failed (singular system, non-finite input).
    NumericFailure,
}

impl CoreErrorCode {
    /// Return the stable machine-readable representation of this error code.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GraphFailure => "LOAM_GRAPH_FAILURE",
            Self::ConfigInvalid => "LOAM_CONFIG_INVALID",
            Self::DeserializeFailure => "LOAM_DESERIALIZE_FAILURE",
            Self::BackendUnavailable => "LOAM_BACKEND_UNAVAILABLE",
            Self::NumericFailure => "LOAM_NUMERIC_FAILURE",
        }
    }
}

impl fmt::Display for CoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type produced by the contract surface in `api`.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CoreError {
    /// A structural graph operation failed.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// The farm configuration was malformed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Serialized graph state could not be rehydrated.
    #[error(transparent)]
    Deserialize(#[from] SerializeError),
    /// An explicit backend operation was unavailable.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// A numeric routine failed.
    #[error("numeric failure while {context}")]
    Numeric {
        /// Human-readable context describing the failing routine.
        context: &'static str,
    },
}

impl CoreError {
    /// Retrieve the stable [`CoreErrorCode`] for this error.
    pub const fn code(&self) -> CoreErrorCode {
        match self {
            Self::Graph(_) => CoreErrorCode::GraphFailure,
            Self::Config(_) => CoreErrorCode::ConfigInvalid,
            Self::Deserialize(_) => CoreErrorCode::DeserializeFailure,
            Self::Backend(_) => CoreErrorCode::BackendUnavailable,
            Self::Numeric { .. } => CoreErrorCode::NumericFailure,
        }
    }

    /// Retrieve the inner [`GraphErrorCode`] when the error originated in the
    /// graph engine.
    pub const fn graph_code(&self) -> Option<GraphErrorCode> {
        match self {
            Self::Graph(error) => Some(error.code()),
            _ => None,
        }
    }
}

/// Convenient alias for results returned by the core API.
pub type Result<T> = core::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_not_found_lists_alternatives() {
        let err = GraphError::LayerNotFound {
            layer: "npk".to_owned(),
            available: vec!["soil".to_owned(), "weather".to_owned()],
        };
        assert_eq!(
            err.to_string(),
            "layer `npk` not found; available layers: [soil, weather]"
        );
        assert_eq!(err.code().as_str(), "GRAPH_LAYER_NOT_FOUND");
    }

    #[test]
    fn core_error_exposes_graph_code() {
        let err = CoreError::from(GraphError::DuplicateVertex {
            vertex: "bed-1".to_owned(),
        });
        assert_eq!(err.code(), CoreErrorCode::GraphFailure);
        assert_eq!(err.graph_code(), Some(GraphErrorCode::DuplicateVertex));
    }
}
