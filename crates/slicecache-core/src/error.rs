use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured runtime error with a stable internal classification.
/// Planning never returns this for expected outcomes (incompatible signatures,
/// partial partitions, coverage gaps); those resolve into a `PlanResult`.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl InternalError {
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
        }
    }

    /// Construct a store-origin invariant violation.
    pub fn store_invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Store, message)
    }

    /// Construct a planner-origin invariant violation.
    pub fn planner_invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Planner, message)
    }

    /// Construct a dispatch-origin internal error.
    pub fn dispatch_internal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Dispatch, message)
    }

    /// Lock poisoning is treated as an internal fault of the owning origin.
    pub fn poisoned(origin: ErrorOrigin, what: &str) -> Self {
        Self::new(
            ErrorClass::Internal,
            origin,
            format!("{what} lock poisoned"),
        )
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Internal,
    InvariantViolation,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Internal => "internal",
            Self::InvariantViolation => "invariant_violation",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Planner,
    Store,
    Dispatch,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Planner => "planner",
            Self::Store => "store",
            Self::Dispatch => "dispatch",
        };
        write!(f, "{label}")
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_with_class_prefixes_origin_and_class() {
        let err = InternalError::store_invariant("payload kind mismatch");

        assert_eq!(
            err.display_with_class(),
            "store:invariant_violation: payload kind mismatch"
        );
        assert_eq!(err.to_string(), "payload kind mismatch");
    }

    #[test]
    fn poisoned_lock_is_an_internal_fault_of_its_origin() {
        let err = InternalError::poisoned(ErrorOrigin::Store, "slice store");

        assert_eq!(err.class, ErrorClass::Internal);
        assert_eq!(err.to_string(), "slice store lock poisoned");
    }

    #[test]
    fn invariant_constructors_set_their_origin() {
        assert_eq!(InternalError::planner_invariant("x").origin, ErrorOrigin::Planner);
        assert_eq!(InternalError::store_invariant("x").origin, ErrorOrigin::Store);
        assert_eq!(InternalError::dispatch_internal("x").class, ErrorClass::Internal);
    }
}
