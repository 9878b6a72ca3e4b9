//! Error types shared by the aggregate, persistence and export layers.

use thiserror::Error;

use crate::storage::StorageError;

/// Which kind of entity a lookup failed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Task,
    Category,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Task => write!(f, "Task"),
            EntityKind::Category => write!(f, "Category"),
        }
    }
}

#[derive(Error, Debug)]
pub enum TaskflowError {
    /// Entity fields break one or more rules; every violated rule is listed.
    #[error("Invalid {subject}: {}", .errors.join(", "))]
    Validation {
        subject: &'static str,
        errors: Vec<String>,
    },

    #[error("{kind} not found")]
    NotFound { kind: EntityKind, key: String },

    #[error("{kind} already exists")]
    AlreadyExists { kind: EntityKind, key: String },

    #[error("Failed to {action}: {source}")]
    Storage {
        action: &'static str,
        #[source]
        source: StorageError,
    },

    #[error("Failed to {action}: {reason}")]
    Format { action: &'static str, reason: String },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Failed to initialize logging: {reason}")]
    Logging { reason: String },
}

impl TaskflowError {
    pub fn task_not_found(id: &str) -> Self {
        TaskflowError::NotFound {
            kind: EntityKind::Task,
            key: id.to_string(),
        }
    }

    pub fn category_not_found(name: &str) -> Self {
        TaskflowError::NotFound {
            kind: EntityKind::Category,
            key: name.to_string(),
        }
    }

    /// Validation messages when this is a validation failure, empty otherwise.
    pub fn validation_errors(&self) -> &[String] {
        match self {
            TaskflowError::Validation { errors, .. } => errors,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, TaskflowError>;
