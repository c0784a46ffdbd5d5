//! Error types for the diff/sync engine.

use thiserror::Error;

/// Result type for engine operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Result type returned by record lifecycle hooks.
///
/// `Ok(None)` is a soft failure: nothing went wrong badly enough to abort,
/// but descendants of the affected record must not be synced.
pub type HookResult<T> = Result<Option<T>, CrudError>;

/// Failures raised by record lifecycle hooks while applying a diff.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CrudError {
    /// A create operation failed.
    #[error("object not created: {0}")]
    NotCreated(String),

    /// An update operation failed.
    #[error("object not updated: {0}")]
    NotUpdated(String),

    /// A delete operation failed.
    #[error("object not deleted: {0}")]
    NotDeleted(String),

    /// Any other failure of an external side effect.
    #[error("CRUD operation failed: {0}")]
    Other(String),
}

impl CrudError {
    /// Returns the message carried by this error.
    pub fn message(&self) -> &str {
        match self {
            CrudError::NotCreated(msg)
            | CrudError::NotUpdated(msg)
            | CrudError::NotDeleted(msg)
            | CrudError::Other(msg) => msg,
        }
    }
}

/// Errors that can occur in store, diff and sync operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A model descriptor or store definition is inconsistent.
    #[error("invalid schema for {model}: {message}")]
    InvalidSchema {
        /// Model (or store) being defined.
        model: String,
        /// What is wrong with it.
        message: String,
    },

    /// An identifier value needed to build a unique id is missing.
    #[error("malformed identifier for {model}: missing value for {field}")]
    MalformedIdentifier {
        /// Model type name.
        model: String,
        /// Identifier field without a value.
        field: String,
    },

    /// A field name that the model does not declare.
    #[error("{model} has no field named {field}")]
    UnknownField {
        /// Model type name.
        model: String,
        /// Offending field name.
        field: String,
    },

    /// Attempt to overwrite an identifier field of an existing record.
    #[error("identifier field {field} of {model} cannot be modified")]
    ImmutableField {
        /// Model type name.
        model: String,
        /// Identifier field name.
        field: String,
    },

    /// Two records paired by unique id report different types.
    #[error("type mismatch: {source_type} vs {dest_type}")]
    TypeMismatch {
        /// Type on the source side.
        source_type: String,
        /// Type on the destination side.
        dest_type: String,
    },

    /// Two records paired by unique id report different shortnames.
    #[error("shortname mismatch: {source_name} vs {dest_name}")]
    ShortnameMismatch {
        /// Shortname on the source side.
        source_name: String,
        /// Shortname on the destination side.
        dest_name: String,
    },

    /// Two records paired by unique id report different identifier values.
    #[error("keys mismatch: {source_keys} vs {dest_keys}")]
    KeysMismatch {
        /// Rendered identifiers of the source record.
        source_keys: String,
        /// Rendered identifiers of the destination record.
        dest_keys: String,
    },

    /// The store has no model registered under this name.
    #[error("store {store} has no model named {model}")]
    UnknownModel {
        /// Store display name.
        store: String,
        /// Requested model name.
        model: String,
    },

    /// A record cannot hold children of the given type.
    #[error("unable to store {child} as a child of {parent}; valid types are {valid:?}")]
    WrongChildType {
        /// Parent model name.
        parent: String,
        /// Child model name.
        child: String,
        /// Child types the parent accepts.
        valid: Vec<String>,
    },

    /// An object with the same type and id is already stored.
    #[error("{model} {id} already present")]
    AlreadyExists {
        /// Model type name (or diff group).
        model: String,
        /// Unique id (or diff element name).
        id: String,
    },

    /// The referenced object is not stored.
    #[error("{model} {id} not present")]
    NotFound {
        /// Model type name.
        model: String,
        /// Unique id.
        id: String,
    },

    /// A record lifecycle hook failed.
    #[error(transparent)]
    Crud(#[from] CrudError),
}

impl CoreError {
    /// Creates an invalid schema error.
    pub fn invalid_schema(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Creates an already-exists error.
    pub fn already_exists(model: impl Into<String>, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            model: model.into(),
            id: id.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(model: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            model: model.into(),
            id: id.into(),
        }
    }

    /// Returns true for model-definition bugs that can never succeed on retry.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidSchema { .. }
                | CoreError::MalformedIdentifier { .. }
                | CoreError::UnknownField { .. }
                | CoreError::ImmutableField { .. }
                | CoreError::TypeMismatch { .. }
                | CoreError::ShortnameMismatch { .. }
                | CoreError::KeysMismatch { .. }
                | CoreError::UnknownModel { .. }
                | CoreError::WrongChildType { .. }
        )
    }

    /// Returns true if the store contents disagree with the requested change.
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            CoreError::AlreadyExists { .. } | CoreError::NotFound { .. }
        )
    }

    /// Returns true if a lifecycle hook failed.
    pub fn is_crud(&self) -> bool {
        matches!(self, CoreError::Crud(_))
    }
}
