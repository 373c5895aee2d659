//! Error surface of layout use-cases.

use crate::model::layout::{LayoutId, LayoutValidationError};
use crate::repo::layout_store::{LayoutConflict, RepoError};
use crate::service::template::ContentValidationError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type LayoutResult<T> = Result<T, LayoutError>;

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutErrorKind {
    NotFound,
    Conflict,
    InvalidOperation,
    /// Safe to retry.
    Transient,
    Validation,
    Internal,
}

/// Operations refused by layout business rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidOperation {
    DeleteDefault(LayoutId),
    DeleteInUse(LayoutId),
}

impl Display for InvalidOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeleteDefault(id) => write!(f, "cannot delete the default layout: {id}"),
            Self::DeleteInUse(id) => write!(f, "cannot delete a layout that is in use: {id}"),
        }
    }
}

/// Error returned by `LayoutService` operations.
#[derive(Debug)]
pub enum LayoutError {
    NotFound(LayoutId),
    Conflict(LayoutConflict),
    InvalidOperation(InvalidOperation),
    Validation(LayoutValidationError),
    InvalidContent(ContentValidationError),
    /// Storage busy or unavailable; nothing was committed.
    Transient(RepoError),
    /// The default kept moving under concurrent writers.
    DefaultContention { attempts: u32 },
    /// Non-retryable storage failure or corrupt persisted data.
    Repo(RepoError),
}

impl LayoutError {
    pub fn kind(&self) -> LayoutErrorKind {
        match self {
            Self::NotFound(_) => LayoutErrorKind::NotFound,
            Self::Conflict(_) => LayoutErrorKind::Conflict,
            Self::InvalidOperation(_) => LayoutErrorKind::InvalidOperation,
            Self::Validation(_) | Self::InvalidContent(_) => LayoutErrorKind::Validation,
            Self::Transient(_) | Self::DefaultContention { .. } => LayoutErrorKind::Transient,
            Self::Repo(_) => LayoutErrorKind::Internal,
        }
    }

    /// Stable snake_case code for logs and adapters.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "layout_not_found",
            Self::Conflict(_) => "layout_conflict",
            Self::InvalidOperation(InvalidOperation::DeleteDefault(_)) => "layout_is_default",
            Self::InvalidOperation(InvalidOperation::DeleteInUse(_)) => "layout_in_use",
            Self::Validation(_) => "layout_invalid",
            Self::InvalidContent(_) => "layout_content_invalid",
            Self::Transient(_) => "storage_unavailable",
            Self::DefaultContention { .. } => "default_contention",
            Self::Repo(_) => "storage_error",
        }
    }
}

impl Display for LayoutError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "layout not found: {id}"),
            Self::Conflict(conflict) => write!(f, "{conflict}"),
            Self::InvalidOperation(operation) => write!(f, "{operation}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::InvalidContent(err) => write!(f, "{err}"),
            Self::Transient(err) => write!(f, "{err}"),
            Self::DefaultContention { attempts } => write!(
                f,
                "default layout changed concurrently; gave up after {attempts} attempts"
            ),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for LayoutError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::InvalidContent(err) => Some(err),
            Self::Transient(err) | Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for LayoutError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id),
            RepoError::Conflict(conflict) => Self::Conflict(conflict),
            RepoError::DefaultLayout(id) => {
                Self::InvalidOperation(InvalidOperation::DeleteDefault(id))
            }
            RepoError::Validation(err) => Self::Validation(err),
            transient @ RepoError::Transient(_) => Self::Transient(transient),
            other => Self::Repo(other),
        }
    }
}

impl From<LayoutValidationError> for LayoutError {
    fn from(value: LayoutValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<ContentValidationError> for LayoutError {
    fn from(value: ContentValidationError) -> Self {
        Self::InvalidContent(value)
    }
}
