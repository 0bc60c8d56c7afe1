//! Error types for ent operations.

use ent_codec::CodecError;
use thiserror::Error;

/// Result type for ent operations.
pub type EntResult<T> = Result<T, EntError>;

/// Errors surfaced by entity CRUD, lookups and storage backends.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntError {
    /// No entity (or index entry) exists for the requested id or key.
    #[error("ent not found")]
    NotFound,

    /// Save called on an entity without unsaved changes.
    #[error("ent not changed")]
    NotChanged,

    /// The stored version differs from the version the writer last saw.
    #[error("version conflict: expected version {expected}")]
    VersionConflict {
        /// Version the writer expected to replace.
        expected: u64,
    },

    /// A unique index already maps the key to a different entity.
    #[error("unique index conflict on {type_name}.{index}")]
    UniqueConflict {
        /// Entity type owning the index.
        type_name: String,
        /// Name of the unique index.
        index: String,
    },

    /// The entity is not attached to a storage.
    #[error("no ent storage")]
    NoStorage,

    /// Create called on an entity that already has an id.
    #[error("duplicate ent: already has id {id}")]
    DuplicateEnt {
        /// The existing id.
        id: u64,
    },

    /// Two snapshots of different entity types were compared.
    #[error("different ent types ({expected}, {actual})")]
    TypeMismatch {
        /// Type that was expected.
        expected: String,
        /// Type that was found.
        actual: String,
    },

    /// Encoding or decoding failed.
    #[error("encoding error: {0}")]
    Encoding(#[from] CodecError),

    /// Opaque failure reported by a storage backend or its transport.
    #[error("backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },

    /// A stored posting list could not be parsed.
    #[error("invalid id set {data:?}: {reason}")]
    InvalidIdSet {
        /// The offending bytes, lossily rendered.
        data: String,
        /// What was wrong with them.
        reason: String,
    },
}

impl EntError {
    /// Create a unique conflict error.
    pub fn unique_conflict(type_name: impl Into<String>, index: impl Into<String>) -> Self {
        Self::UniqueConflict {
            type_name: type_name.into(),
            index: index.into(),
        }
    }

    /// Create a type mismatch error.
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Returns true for [`EntError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Returns true for [`EntError::VersionConflict`].
    #[must_use]
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    /// Returns true for [`EntError::UniqueConflict`].
    #[must_use]
    pub fn is_unique_conflict(&self) -> bool {
        matches!(self, Self::UniqueConflict { .. })
    }
}
