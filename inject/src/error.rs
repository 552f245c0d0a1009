use thiserror::Error;

use crate::core::{ServiceKey, TypeInfo};

/// The error type for every fallible operation in `fibre_inject`.
#[derive(Debug, Clone, Error)]
pub enum InjectError {
  #[error("Service '{0}' is already registered")]
  AlreadyRegistered(ServiceKey),

  #[error("'{required_by}' requires '{dependency}' as its dependency, but it has not been registered")]
  DependencyNotRegistered {
    dependency: ServiceKey,
    required_by: TypeInfo,
  },

  #[error("Type '{0}' is not supported for dependency injection")]
  UnsupportedType(TypeInfo),

  #[error("Member '{member}' of '{owner}' cannot be injected: {reason}")]
  UnsupportedMember {
    owner: TypeInfo,
    member: &'static str,
    reason: &'static str,
  },

  #[error("A container with id '{0}' already exists")]
  DuplicateId(String),

  #[error("Container ids must not be empty or whitespace")]
  InvalidId,

  #[error("Service '{0}' was not found")]
  ServiceNotFound(ServiceKey),

  #[error("Container '{0}' was not found")]
  ContainerNotFound(String),

  #[error("Invalid operation: {0}")]
  InvalidOperation(String),

  #[error("Container '{0}' has been disposed")]
  Disposed(String),

  #[error("Failed to downcast, expected: '{expected}' actual: '{actual}'")]
  DowncastFailed {
    expected: &'static str,
    actual: &'static str,
  },

  #[error("Failed to construct '{service}': {reason}")]
  ConstructionFailed { service: ServiceKey, reason: String },
}

impl InjectError {
  /// Builds a [`InjectError::ConstructionFailed`] for service `T`.
  ///
  /// Intended for factories that fail for reasons of their own.
  pub fn construction<T: ?Sized + 'static>(reason: impl Into<String>) -> Self {
    InjectError::ConstructionFailed {
      service: ServiceKey::of::<T>(),
      reason: reason.into(),
    }
  }

  /// The key of the dependency this error reports as missing, if any.
  pub fn missing_dependency(&self) -> Option<&ServiceKey> {
    match self {
      InjectError::ServiceNotFound(key) => Some(key),
      InjectError::DependencyNotRegistered { dependency, .. } => Some(dependency),
      _ => None,
    }
  }
}

/// A specialized `Result` type for `fibre_inject` operations.
pub type Result<T, E = InjectError> = std::result::Result<T, E>;
