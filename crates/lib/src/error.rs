//! Errors raised while evaluating build descriptions.
//!
//! [`InterpError`] is the single error type flowing through the interpreter.
//! It is `Clone` so that a failed optional subproject can keep its exception on
//! the handle while the same error is reported elsewhere, and `Send + Sync` so
//! it can travel through the Lua VM as an external error and be recovered
//! intact at the project boundary.

use crate::sandbox::SandboxViolation;
use crate::subproject::wrap::WrapError;
use crate::target::RegistryError;

/// Error produced by any interpreter operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InterpError {
  /// A builtin was called with arguments of the wrong shape or value.
  #[error("{0}")]
  InvalidArguments(String),

  /// The build description is structurally wrong.
  #[error("{0}")]
  InvalidCode(String),

  /// Target registration was rejected.
  #[error(transparent)]
  Registry(#[from] RegistryError),

  /// A file reference crossed a (sub)project boundary.
  #[error(transparent)]
  Sandbox(#[from] SandboxViolation),

  /// The wrap resolver could not produce a subproject directory.
  #[error(transparent)]
  Wrap(#[from] WrapError),

  /// A subproject (transitively) includes itself.
  #[error("Recursive include of subprojects: {}.", .chain.join(" => "))]
  SubprojectCycle { chain: Vec<String> },

  /// A required subproject was previously disabled.
  #[error("Subproject \"{name}\" required but not found.")]
  SubprojectRequired { name: String },

  /// A subproject's declared version does not satisfy the requested constraints.
  #[error("Subproject {name} version is {found} but {} required.", .wanted.join(", "))]
  SubprojectVersion {
    name: String,
    found: String,
    wanted: Vec<String>,
  },

  /// A required dependency could not be resolved.
  #[error("{0}")]
  Dependency(String),

  /// A required program could not be found.
  #[error("Program '{0}' not found or not executable")]
  ProgramNotFound(String),

  /// A variable lookup in a subproject's binding table failed.
  #[error("Subproject {subproject} has no variable named '{name}'.")]
  UnknownVariable { subproject: String, name: String },

  /// `error()` was called by the build description.
  #[error("Problem encountered: {0}")]
  Problem(String),

  /// The front end failed to load or run a build file.
  #[error("{path}: {message}")]
  Script { path: String, message: String },

  /// Filesystem access failed.
  #[error("{0}")]
  Io(String),
}

impl InterpError {
  pub fn invalid_args(msg: impl Into<String>) -> Self {
    Self::InvalidArguments(msg.into())
  }

  pub fn invalid_code(msg: impl Into<String>) -> Self {
    Self::InvalidCode(msg.into())
  }

  /// Cycle errors are never downgraded at an optional subproject boundary.
  pub fn is_cycle(&self) -> bool {
    matches!(self, Self::SubprojectCycle { .. })
  }
}
