//! Failure taxonomy
//!
//! Nothing here crosses the call boundary as a fault. Boundary operations
//! report `bool` or `Option`; these types exist for logging and for the
//! optional exception routing to the host.

use thiserror::Error;

use crate::value::VariantKind;

/// Kinds of outbound call failure
///
/// Absent identifiers and kind mismatches never become errors: they are
/// answered with `false` or the zero value where they occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Every resolution step failed; reported as no result
    HostCallFailure,
    /// Cancelled by shutdown; reported exactly like `HostCallFailure`
    ShutdownCancellation,
}

/// Why an outbound call produced no result
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("host has no global object")]
    NoGlobalObject,

    #[error("evaluating {script} failed")]
    Evaluate { script: String },

    #[error("{script} evaluated to {kind:?}, not an object")]
    NotAnObject { script: String, kind: VariantKind },

    #[error("call cancelled by shutdown")]
    Cancelled,
}

impl ResolveError {
    /// Taxonomy bucket of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResolveError::Cancelled => ErrorKind::ShutdownCancellation,
            _ => ErrorKind::HostCallFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(ResolveError::Cancelled.kind(), ErrorKind::ShutdownCancellation);
        assert_eq!(ResolveError::NoGlobalObject.kind(), ErrorKind::HostCallFailure);
    }

    #[test]
    fn test_messages() {
        let err = ResolveError::NotAnObject {
            script: "(foo)".to_string(),
            kind: VariantKind::Int32,
        };
        assert_eq!(err.to_string(), "(foo) evaluated to Int32, not an object");
    }
}
