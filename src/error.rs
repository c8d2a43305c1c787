//! Error types for cortex-morph.
//!
//! This module defines all error types used throughout the library.

use thiserror::Error;

/// Result type alias using [`MorphError`].
pub type Result<T> = std::result::Result<T, MorphError>;

/// Errors that can occur while building or applying a morph.
#[derive(Error, Debug)]
pub enum MorphError {
    /// Invalid combination of requested options.
    #[error("invalid morph configuration: {message}")]
    Configuration {
        /// What was wrong with the configuration.
        message: String,
    },

    /// Data does not have the vertex layout or shape the operator expects.
    #[error("data shape mismatch: {message}")]
    DataShape {
        /// Description of the mismatch.
        message: String,
    },

    /// Icosahedral vertex resolution mapped several reference vertices onto the
    /// same subject vertex.
    #[error(
        "cannot use icosahedral grade {grade} with subject {subject}, mapping {n_vertices} \
         vertices onto the high-resolution mesh yields repeated vertices, use a lower grade \
         or a list of vertices from an existing source space"
    )]
    DegenerateMapping {
        /// The requested subdivision level.
        grade: u32,
        /// The subject whose sphere was searched.
        subject: String,
        /// Number of reference vertices that were mapped.
        n_vertices: usize,
    },

    /// No hemisphere contributed any source vertex.
    #[error("empty morph-matrix: no hemisphere has source vertices")]
    EmptyMorph,

    /// A surface, morph map, volume or file is not available.
    #[error("missing {kind}: {name}")]
    MissingResource {
        /// Kind of resource (sphere surface, morph map, ...).
        kind: &'static str,
        /// Identifier of the resource.
        name: String,
    },

    /// A triangle references an invalid vertex index.
    #[error("face {face} references invalid vertex index {vertex}")]
    InvalidVertexIndex {
        /// The face index.
        face: usize,
        /// The invalid vertex index.
        vertex: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },

    /// An injected volume transform failed.
    #[error("volume transform failed: {message}")]
    Transform {
        /// Message reported by the collaborator.
        message: String,
    },

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MorphError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        MorphError::Configuration {
            message: message.into(),
        }
    }

    /// Create a data shape error.
    pub fn shape(message: impl Into<String>) -> Self {
        MorphError::DataShape {
            message: message.into(),
        }
    }

    /// Create a missing resource error.
    pub fn missing(kind: &'static str, name: impl Into<String>) -> Self {
        MorphError::MissingResource {
            kind,
            name: name.into(),
        }
    }

    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        MorphError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }
}
