//! Error types for registration, resolution and test execution.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Structural misuse caught while registering.
    Registration,
    /// No fixture produces a requested type.
    MissingFixture,
    /// The fixture graph for a test contains a cycle.
    DependencyCycle,
    /// A fixture body failed or panicked.
    FixtureFailure,
    /// A before/after hook failed or panicked.
    HookFailure,
    /// The test body itself failed or panicked.
    TestFailure,
}

/// Errors raised by the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A fixture declared the test handle as its result.
    #[error("fixture `{fixture}` cannot produce the test handle type")]
    HandleFixture { fixture: String },

    /// Registration rejected for another structural reason.
    #[error("cannot register `{name}`: {message}")]
    Registration { name: String, message: String },

    /// No registered fixture produces the requested type.
    #[error("no fixture provides `{type_name}` (required by `{required_by}`)")]
    MissingFixture {
        type_name: String,
        required_by: String,
    },

    /// Resolving a type required that same type again.
    #[error("dependency cycle: {}", path.join(" -> "))]
    DependencyCycle { path: Vec<String> },

    /// A resolved value could not be downcast to the parameter type.
    #[error("value for `{type_name}` has an unexpected type")]
    TypeMismatch { type_name: String },

    /// A fixture body failed.
    #[error("fixture `{fixture}` failed: {message}")]
    FixtureFailure { fixture: String, message: String },

    /// A before/after hook failed.
    #[error("{stage} hook `{hook}` failed: {message}")]
    HookFailure {
        stage: HookStage,
        hook: String,
        message: String,
    },

    /// The test body failed.
    #[error("{message}")]
    TestFailure { message: String },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::HandleFixture { .. } | Error::Registration { .. } => ErrorKind::Registration,
            Error::MissingFixture { .. } => ErrorKind::MissingFixture,
            Error::DependencyCycle { .. } => ErrorKind::DependencyCycle,
            Error::TypeMismatch { .. } | Error::FixtureFailure { .. } => ErrorKind::FixtureFailure,
            Error::HookFailure { .. } => ErrorKind::HookFailure,
            Error::TestFailure { .. } => ErrorKind::TestFailure,
        }
    }
}

/// Which side of the test body a hook runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    Before,
    After,
}

impl std::fmt::Display for HookStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookStage::Before => f.write_str("before"),
            HookStage::After => f.write_str("after"),
        }
    }
}
