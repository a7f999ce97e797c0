use std::fmt;

use crate::format::FormatError;
use crate::store::StoreError;

/// An error raised while normalizing a single function argument.
///
/// These errors never surface to callers directly. The resolver catches them exactly once and
/// re-raises them as [`SearchError`] annotated with the function and argument name.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ArgumentError {
    /// The argument failed validation: wrong type, out of range, unknown column, bad enum value
    /// or wrong quoting.
    #[error("{0}")]
    InvalidFunctionArgument(String),

    /// The argument is well-formed but cannot be queried from the metrics dataset.
    #[error("{0}")]
    IncompatibleMetricsQuery(String),
}

impl ArgumentError {
    /// Creates an [`ArgumentError::InvalidFunctionArgument`] from a message.
    pub fn invalid(message: impl fmt::Display) -> Self {
        Self::InvalidFunctionArgument(message.to_string())
    }
}

impl From<SearchError> for ArgumentError {
    fn from(error: SearchError) -> Self {
        match error {
            SearchError::IncompatibleMetricsQuery(message) => {
                Self::IncompatibleMetricsQuery(message)
            }
            other => Self::invalid(other),
        }
    }
}

/// The query-level error returned from field and function resolution.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The search query is invalid.
    ///
    /// Raised for unknown functions, arity mismatches, access control denials, invalid
    /// arguments and result-set overflows of collaborator lookups.
    #[error("{0}")]
    InvalidSearchQuery(String),

    /// A metric argument is not accessible in the metrics dataset.
    #[error("{0}")]
    IncompatibleMetricsQuery(String),

    /// A collaborator lookup failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SearchError {
    /// Creates a [`SearchError::InvalidSearchQuery`] from a message.
    pub fn invalid(message: impl fmt::Display) -> Self {
        Self::InvalidSearchQuery(message.to_string())
    }

    /// Wraps an argument error with the function name and the argument name.
    pub(crate) fn for_argument(field: &str, argument: &str, error: ArgumentError) -> Self {
        match error {
            ArgumentError::InvalidFunctionArgument(message) => Self::InvalidSearchQuery(format!(
                "{field}: {argument} argument invalid: {message}"
            )),
            ArgumentError::IncompatibleMetricsQuery(message) => {
                Self::IncompatibleMetricsQuery(message)
            }
        }
    }

    /// Wraps a template formatting error with the function name.
    pub(crate) fn for_template(field: &str, error: FormatError) -> Self {
        Self::InvalidSearchQuery(format!("{field}: {error}"))
    }
}

/// An error in the declaration of a function signature.
///
/// Signatures are declared once when a registry is built, so these errors indicate a programming
/// error rather than invalid user input.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum SignatureError {
    /// None of column, aggregate, transform or conditional transform was declared.
    #[error("{0}: exactly one of column, aggregate, transform or conditional transform is required")]
    MissingShape(String),

    /// More than one of column, aggregate, transform or conditional transform was declared.
    #[error("{0}: only one of column, aggregate, transform or conditional transform is allowed")]
    DuplicateShape(String),

    /// An optional argument does not provide a default value.
    #[error("{function}: optional argument at index {index} does not have a default")]
    MissingDefault {
        /// The name of the function.
        function: String,
        /// The index of the argument within the optional arguments.
        index: usize,
    },

    /// An argument name is used more than once.
    #[error("{function}: argument {argument} specified more than once")]
    DuplicateArgument {
        /// The name of the function.
        function: String,
        /// The duplicated argument name.
        argument: String,
    },

    /// The conditional transform refers to an argument that does not exist.
    #[error("{function}: condition argument {argument} is not declared")]
    UnknownCondition {
        /// The name of the function.
        function: String,
        /// The undeclared argument name.
        argument: String,
    },
}
