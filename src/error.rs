//! Error types for the isarest conversion service.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`ArenaError`] - Request-scoped working directory allocation errors
//! - [`ArchiveError`] - Zip extraction / packing / entry-point location errors
//! - [`ConvertError`] - External tool (converter/validator/generator) errors
//! - [`ImportError`] - External repository import errors
//! - [`ServiceError`] - Top-level taxonomy mapped to HTTP statuses
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries. [`ServiceError`] is the
//! only type that crosses the HTTP boundary; the response mapper in
//! [`crate::api::types`] turns it into a uniform error record.

use thiserror::Error;

use crate::design::ValidationReport;

// =============================================================================
// Resource Arena Errors
// =============================================================================

/// Errors while allocating or removing request-scoped storage.
#[derive(Debug, Error)]
pub enum ArenaError {
    /// Could not create the working directory.
    #[error("failed to allocate working directory: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Archive Codec Errors
// =============================================================================

/// Errors from the archive codec (extraction, packing, entry-point location).
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The payload was not a valid zip archive when one was requested,
    /// or an entry would escape the extraction directory.
    #[error("malformed archive: {0}")]
    Malformed(String),

    /// Zero or more than one file matched the entry-point convention.
    #[error("expected exactly one file matching {pattern}, found {matches}")]
    AmbiguousEntryPoint { pattern: String, matches: usize },

    /// Filesystem error while extracting or packing.
    #[error("archive IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Zip encoding error while packing.
    #[error("zip write error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

// =============================================================================
// External Tool Errors
// =============================================================================

/// Errors from the external format tools (converter, validator, generator).
///
/// All three collaborators share the same subprocess contract, so they
/// share an error type.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The external command could not be launched.
    #[error("failed to launch '{command}': {message}")]
    Spawn { command: String, message: String },

    /// The external command ran but reported failure.
    #[error("tool exited with status {code:?}")]
    Failed { code: Option<i32>, stderr: String },

    /// The tool produced output that could not be read back.
    #[error("unreadable tool output: {0}")]
    BadOutput(String),

    /// IO error around the tool invocation.
    #[error("tool IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Import Errors
// =============================================================================

/// Errors while importing a study from an external repository.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Transport-level failure.
    #[error("import request failed: {0}")]
    Request(String),

    /// The repository answered with a non-success status.
    #[error("external repository returned status {0}")]
    Status(u16),
}

// =============================================================================
// Service Errors (top-level taxonomy)
// =============================================================================

/// Top-level error taxonomy for every request pipeline.
///
/// Each variant corresponds to one status class in the HTTP surface:
/// client errors (`UnsupportedMediaType`, `MissingField`, `ValidationFailed`)
/// and server errors (everything else). The response mapper never lets
/// arena filesystem paths reach the client; message strings here must stay
/// path-free or be sanitized at construction.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Declared mimetype is not in the accepted set for this operation.
    #[error("unsupported media type '{declared}', expected {accepted}")]
    UnsupportedMediaType {
        declared: String,
        accepted: &'static str,
    },

    /// A required JSON key was absent from the request body.
    #[error("missing key in request JSON payload: {0}")]
    MissingField(String),

    /// The study design exceeds configured combinatorial limits.
    #[error("study design exceeds configured limits")]
    ValidationFailed(ValidationReport),

    /// Uploaded data could not be materialized (bad archive, empty input).
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Entry-point disambiguation failed on the extracted input.
    #[error("ambiguous entry point: expected exactly one file matching {pattern}, found {matches}")]
    AmbiguousEntryPoint { pattern: String, matches: usize },

    /// Output disambiguation failed after conversion.
    #[error("ambiguous converter output: expected exactly one document, found {matches}")]
    AmbiguousOutput { matches: usize },

    /// The external converter reported failure.
    #[error("conversion failed")]
    ConversionFailed(Vec<String>),

    /// Temporary storage could not be allocated or written.
    #[error("resource allocation failure: {0}")]
    ResourceAllocation(String),

    /// The external repository import failed.
    #[error("import failed: {0}")]
    ImportFailed(String),
}

impl ServiceError {
    /// Stable category name carried in error response bodies.
    pub fn category(&self) -> &'static str {
        match self {
            Self::UnsupportedMediaType { .. } => "unsupportedMediaType",
            Self::MissingField(_) => "missingField",
            Self::ValidationFailed(_) => "validationFailed",
            Self::MalformedInput(_) => "malformedInput",
            Self::AmbiguousEntryPoint { .. } => "ambiguousEntryPoint",
            Self::AmbiguousOutput { .. } => "ambiguousOutput",
            Self::ConversionFailed(_) => "conversionFailed",
            Self::ResourceAllocation(_) => "resourceAllocationFailure",
            Self::ImportFailed(_) => "importFailed",
        }
    }

    /// Messages carried in the response body alongside the category.
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::ConversionFailed(messages) => messages.clone(),
            other => vec![other.to_string()],
        }
    }
}

impl From<ArenaError> for ServiceError {
    fn from(err: ArenaError) -> Self {
        ServiceError::ResourceAllocation(err.to_string())
    }
}

impl From<ArchiveError> for ServiceError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::Malformed(msg) => ServiceError::MalformedInput(msg),
            ArchiveError::AmbiguousEntryPoint { pattern, matches } => {
                ServiceError::AmbiguousEntryPoint { pattern, matches }
            }
            ArchiveError::Io(e) => ServiceError::ResourceAllocation(e.to_string()),
            ArchiveError::Zip(e) => ServiceError::ResourceAllocation(e.to_string()),
        }
    }
}

impl From<ConvertError> for ServiceError {
    fn from(err: ConvertError) -> Self {
        let mut messages = vec![err.to_string()];
        if let ConvertError::Failed { stderr, .. } = &err {
            messages.extend(stderr.lines().map(str::to_owned));
        }
        ServiceError::ConversionFailed(messages)
    }
}

impl From<ImportError> for ServiceError {
    fn from(err: ImportError) -> Self {
        ServiceError::ImportFailed(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for arena operations.
pub type ArenaResult<T> = Result<T, ArenaError>;

/// Result type for archive codec operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Result type for external tool invocations.
pub type ConvertResult<T> = Result<T, ConvertError>;

/// Result type for import operations.
pub type ImportResult<T> = Result<T, ImportError>;

/// Result type for whole request pipelines.
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_error_conversion() {
        let err = ArchiveError::Malformed("not a zip".into());
        let service: ServiceError = err.into();
        assert_eq!(service.category(), "malformedInput");

        let err = ArchiveError::AmbiguousEntryPoint {
            pattern: "i_*.txt".into(),
            matches: 3,
        };
        let service: ServiceError = err.into();
        assert_eq!(service.category(), "ambiguousEntryPoint");
        assert!(service.to_string().contains("found 3"));
    }

    #[test]
    fn test_convert_error_carries_stderr_lines() {
        let err = ConvertError::Failed {
            code: Some(2),
            stderr: "first line\nsecond line".into(),
        };
        let service: ServiceError = err.into();
        let messages = service.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1], "first line");
        assert_eq!(messages[2], "second line");
    }

    #[test]
    fn test_category_names_are_stable() {
        let err = ServiceError::UnsupportedMediaType {
            declared: "text/html".into(),
            accepted: "application/zip",
        };
        assert_eq!(err.category(), "unsupportedMediaType");
        assert_eq!(
            ServiceError::MissingField("studyDesignConfig".into()).category(),
            "missingField"
        );
    }
}
