//! Error taxonomy for the worker compiler.
//!
//! Four categories, each carrying a machine-checkable code:
//! - `CodeParse`: malformed or structurally invalid worker source. Carries
//!   the offending file name and a message. Always fatal to the compile
//!   request, never partially applied.
//! - `BusinessLogic`: caller-level misuse, symbolic code only.
//! - `Platform`: internal invariant violations, symbolic code only.
//! - `External`: failures reported by the execution engine itself, either
//!   a raw numeric status code or a script-level exception with stack.
//!
//! Errors cross the native boundary as one of two serialized shapes:
//! `{type:"code", category, error}` or
//! `{type:"script_exception", category, message, stack}`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for pipeline operations.
pub type CompilerResult<T> = std::result::Result<T, CompileError>;

/// Which bucket of the taxonomy an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    CodeParse,
    BusinessLogic,
    Platform,
    External,
}

/// Caller-level misuse codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessLogicErrorCode {
    UnknownParserError,
    MissingCurrentWorkerVersion,
    InvalidWorkerVersion,
    InvalidWorkerLanguage,
    MissingWorkerId,
    MissingWorkerName,
    MissingWorkerFiles,
    MissingTypeDefinitions,
    DuplicateWorkerClassMapping,
    InvalidLogContext,
}

/// Internal invariant violation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformErrorCode {
    ClassIdCapacityExceeded,
    FileIdCapacityExceeded,
    InternalCommunicationFailure,
    SerializationFailure,
}

/// Errors produced by the compile pipeline and the engine boundary.
#[derive(Debug, Error)]
pub enum CompileError {
    /// Structural problem in worker source. Extraction is all-or-nothing,
    /// so this always aborts the whole compile request.
    #[error("in file {file}: {message}")]
    CodeParse { file: String, message: String },

    #[error("business logic error: {0:?}")]
    BusinessLogic(BusinessLogicErrorCode),

    #[error("platform error: {0:?}")]
    Platform(PlatformErrorCode),

    /// The engine returned a bare numeric status with no further detail.
    #[error("engine error code {code}")]
    External { code: u16 },

    /// The engine raised a script-level exception while applying the deploy.
    #[error("engine script exception: {message}")]
    ScriptException { message: String, stack: String },

    /// Buffer-level encode/decode failure. Writing to an in-memory buffer
    /// cannot fail, so in practice this only surfaces from decoders fed
    /// truncated or foreign bytes.
    #[error("serialization failure: {0}")]
    Serialization(#[from] std::io::Error),
}

impl CompileError {
    pub fn code_parse(file: impl Into<String>, message: impl Into<String>) -> Self {
        CompileError::CodeParse {
            file: file.into(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            CompileError::CodeParse { .. } => ErrorCategory::CodeParse,
            CompileError::BusinessLogic(_) => ErrorCategory::BusinessLogic,
            CompileError::Platform(_) | CompileError::Serialization(_) => ErrorCategory::Platform,
            CompileError::External { .. } | CompileError::ScriptException { .. } => {
                ErrorCategory::External
            }
        }
    }
}

/// The serialized form errors take across the native boundary. Script
/// exceptions keep their stack; everything else flattens to a code string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorShape {
    Code {
        category: ErrorCategory,
        error: String,
    },
    ScriptException {
        category: ErrorCategory,
        message: String,
        stack: String,
    },
}

impl From<&CompileError> for ErrorShape {
    fn from(err: &CompileError) -> Self {
        match err {
            CompileError::ScriptException { message, stack } => ErrorShape::ScriptException {
                category: err.category(),
                message: message.clone(),
                stack: stack.clone(),
            },
            other => ErrorShape::Code {
                category: other.category(),
                error: other.to_string(),
            },
        }
    }
}
