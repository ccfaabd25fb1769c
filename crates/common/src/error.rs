use thiserror::Error;

/// Canonical SSQ error taxonomy used across crates.
///
/// Classification guidance:
/// - [`SsqError::TypeResolution`], [`SsqError::TypeMismatch`],
///   [`SsqError::KeyResolution`], [`SsqError::UnsupportedShape`]: plan-build
///   failures, raised before any row is processed
/// - [`SsqError::InvalidConfig`]: planner configuration/property violations
/// - [`SsqError::Execution`]: row-level evaluation failures inside operators
///   produced by a successfully built plan
#[derive(Debug, Error)]
pub enum SsqError {
    /// An expression references an unknown column or function, or a function
    /// or operator received argument types it cannot accept.
    ///
    /// Examples:
    /// - `Select: unknown column 'ORDERIDD' in ORDERIDD`
    /// - `Filter: unknown function 'FOO'`
    /// - arithmetic over a string operand
    #[error("type resolution error: {0}")]
    TypeResolution(String),

    /// A built expression or schema does not have the type the operator needs.
    ///
    /// Examples:
    /// - filter predicate that is not boolean
    /// - join schema that is not left fields followed by right fields
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// A required key cannot be determined.
    ///
    /// Examples:
    /// - missing equi-join key field
    /// - rekey column absent from the input schema
    #[error("key resolution error: {0}")]
    KeyResolution(String),

    /// A plan combination the lowering cannot represent.
    ///
    /// Examples:
    /// - window bound supplied for a stream-table join
    /// - OUTER stream-table join
    #[error("unsupported plan shape: {0}")]
    UnsupportedShape(String),

    /// Invalid or inconsistent planner configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Row evaluation failure after planning succeeded.
    ///
    /// Examples:
    /// - division by zero
    /// - CAST of a malformed string
    #[error("execution error: {0}")]
    Execution(String),
}

impl SsqError {
    /// True for errors raised while building a plan.
    pub fn is_planning(&self) -> bool {
        matches!(
            self,
            SsqError::TypeResolution(_)
                | SsqError::TypeMismatch(_)
                | SsqError::KeyResolution(_)
                | SsqError::UnsupportedShape(_)
        )
    }

    /// Prefix the message with the operator context it was raised in.
    ///
    /// `Execution` and `InvalidConfig` are returned as-is.
    pub fn with_context(self, context: &str) -> Self {
        match self {
            SsqError::TypeResolution(m) => SsqError::TypeResolution(format!("{context}: {m}")),
            SsqError::TypeMismatch(m) => SsqError::TypeMismatch(format!("{context}: {m}")),
            SsqError::KeyResolution(m) => SsqError::KeyResolution(format!("{context}: {m}")),
            SsqError::UnsupportedShape(m) => {
                SsqError::UnsupportedShape(format!("{context}: {m}"))
            }
            other => other,
        }
    }
}

/// Standard SSQ result alias.
pub type Result<T> = std::result::Result<T, SsqError>;

#[cfg(test)]
mod tests {
    use super::SsqError;

    #[test]
    fn context_is_prefixed_on_planning_errors_only() {
        let err = SsqError::TypeResolution("unknown column 'X'".to_string()).with_context("Select");
        assert_eq!(
            err.to_string(),
            "type resolution error: Select: unknown column 'X'"
        );
        assert!(err.is_planning());

        let exec = SsqError::Execution("division by zero".to_string()).with_context("Select");
        assert_eq!(exec.to_string(), "execution error: division by zero");
        assert!(!exec.is_planning());
    }
}
