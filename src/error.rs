//! Error types for the aggregation library

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid bucketizer parameters, field paths or configuration files
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Streaming aggregator used out of order
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Datapoint rejected because a decomposition field could not be resolved
    #[error("Missing field: {path}")]
    MissingField {
        /// The decomposition path that failed to resolve
        path: String,
    },

    /// A bucketized field resolved to something other than a finite number
    #[error("Invalid bucket value for {path}: {value}")]
    InvalidBucketValue {
        /// The decomposition path being bucketized
        path: String,
        /// Display form of the offending value
        value: String,
    },

    /// Rows passed to `ordinal_to_bounds` were not `(ordinal, sum)` pairs
    #[error("Invalid row shape: {0}")]
    InvalidRowShape(String),

    /// JSON or TOML (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lifecycle violations of a streaming aggregator
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    /// `write` called after `end`
    #[error("write after end")]
    WriteAfterEnd,

    /// `result` called before `end`
    #[error("result requested before end")]
    ResultBeforeEnd,

    /// `end` called twice
    #[error("aggregator already ended")]
    AlreadyEnded,
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl Error {
    /// Returns the state error if this is a lifecycle violation
    pub fn as_state(&self) -> Option<StateError> {
        match self {
            Error::State(e) => Some(*e),
            _ => None,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_error_display() {
        let err: Error = StateError::WriteAfterEnd.into();
        assert_eq!(err.to_string(), "State error: write after end");
        assert_eq!(err.as_state(), Some(StateError::WriteAfterEnd));
    }

    #[test]
    fn test_missing_field_display() {
        let err = Error::MissingField {
            path: "data.state".to_string(),
        };
        assert_eq!(err.to_string(), "Missing field: data.state");
        assert!(err.as_state().is_none());
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
