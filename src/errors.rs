//! Cross-module error classification.
//!
//! Every module owns its own `thiserror` enum; `ErrorKind` is the coarse
//! taxonomy callers use to decide what to do with a failure.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing credentials or index files. Not retried.
    Configuration,
    /// Rate limits and 5xx responses that survived the retry budget.
    TransientProvider,
    /// Empty or malformed input.
    Validation,
    /// Index and metadata disagree about an identifier.
    LookupInconsistency,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::TransientProvider => "transient_provider",
            ErrorKind::Validation => "validation",
            ErrorKind::LookupInconsistency => "lookup_inconsistency",
        };
        f.write_str(name)
    }
}

/// Classify a provider HTTP status that was not retried (or ran out of retries).
pub fn kind_for_status(status: u16) -> ErrorKind {
    match status {
        401 | 403 => ErrorKind::Configuration,
        400 | 404 | 422 => ErrorKind::Validation,
        _ => ErrorKind::TransientProvider,
    }
}
