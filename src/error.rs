//! Error types shared across the cache, view and mutation layers.
//!
//! Application-level failures (config files, CLI wiring) use `color_eyre`;
//! these typed errors are what the library surfaces to callers.

use thiserror::Error;

/// Failure reported by the remote issue service.
///
/// The service only hands back an opaque code/message pair; there is no
/// structured retry metadata.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct RemoteError {
  pub code: String,
  pub message: String,
}

impl RemoteError {
  pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      code: code.into(),
      message: message.into(),
    }
  }

  /// Transport-level failure (connection refused, timeout, bad body).
  pub fn network(message: impl Into<String>) -> Self {
    Self::new("network", message)
  }

  pub fn not_found(what: impl std::fmt::Display) -> Self {
    Self::new("404", format!("{} not found", what))
  }
}

/// A cache key that cannot address anything.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
  #[error("missing {field} for {scope} scope")]
  MissingIdentifier {
    scope: &'static str,
    field: &'static str,
  },
}

/// Unrecognised group-by, order-by, priority or filter literal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} '{value}'")]
pub struct ParseError {
  pub kind: &'static str,
  pub value: String,
}

impl ParseError {
  pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
    Self {
      kind,
      value: value.into(),
    }
  }
}

/// A `field=value` assignment that could not be turned into a patch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
  #[error("unknown field '{0}'")]
  Unknown(String),

  /// A prefix shared by several fields.
  #[error("field '{input}' is ambiguous, did you mean one of: {}", .candidates.join(", "))]
  Ambiguous {
    input: String,
    candidates: Vec<&'static str>,
  },

  #[error(transparent)]
  Value(#[from] ParseError),
}

/// Outcome of a failed optimistic mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
  /// Rejected locally before any cache write or dispatch.
  #[error("validation failed: {0}")]
  Validation(String),

  /// Rejected by the remote service after the optimistic write was applied.
  #[error("remote write failed: {0}")]
  Remote(#[from] RemoteError),

  /// The dispatch task panicked or was aborted.
  #[error("mutation task failed: {0}")]
  Join(String),
}

impl MutationError {
  pub fn validation(message: impl Into<String>) -> Self {
    Self::Validation(message.into())
  }
}

impl From<KeyError> for MutationError {
  fn from(err: KeyError) -> Self {
    Self::Validation(err.to_string())
  }
}

impl From<ParseError> for MutationError {
  fn from(err: ParseError) -> Self {
    Self::Validation(err.to_string())
  }
}

/// Failure of a cache load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
  #[error(transparent)]
  Key(#[from] KeyError),

  /// Nothing cached and the remote read failed.
  #[error(transparent)]
  Remote(#[from] RemoteError),
}
