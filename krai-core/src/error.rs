//! Typed error taxonomy for the processing engine.
//!
//! Every error carries a [`Classification`] used by the retry engine (see
//! [`crate::retry`]) to decide whether a stage failure is retried, recorded as a
//! permanent failure, or aborts the whole pipeline invocation.

use std::fmt;

/// Result type alias used throughout `krai-core`.
pub type Result<T> = std::result::Result<T, Error>;

/// How a failure should propagate through [`crate::processor::safe_process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Network/timeout/5xx-shaped failures, lock contention, model-server
    /// resource limitations. Retried under the hybrid policy.
    Transient,
    /// Missing/invalid input, unrecoverable hash mismatches, contract
    /// violations. Recorded and surfaced as `failed`/`skipped`, never retried.
    Permanent,
    /// Database/object-store unavailable at startup, missing credentials.
    /// Aborts the pipeline invocation outright.
    Fatal,
}

/// Errors produced anywhere in the processing engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("pdf extraction error: {0}")]
    Pdf(String),

    #[error("svg rasterization error: {0}")]
    Svg(String),

    #[error("network error calling {service}: {source}")]
    Network {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("model server reported a resource limitation: {0}")]
    ResourceLimited(String),

    #[error("advisory lock contention for {0}")]
    LockContention(String),

    #[error("another process is already retrying {0}")]
    RetryInProgress(String),

    #[error("missing required input: {0}")]
    MissingInput(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("data hash mismatch for {document_id}/{stage} could not be reconciled")]
    HashMismatch { document_id: String, stage: String },

    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// A unique-constraint violation from the relational store, carrying the
    /// logical key that collided. Callers recover by looking the row up
    /// instead of failing the stage. Replaces substring-matching the
    /// database driver's error text.
    #[error("unique constraint violated on {table}: {key}")]
    UniqueViolation { table: &'static str, key: String },

    #[error("storage backend error: {0}")]
    Storage(String),

    #[error("object store error: {0}")]
    ObjectStore(String),

    #[error("database unavailable: {0}")]
    DatabaseUnavailable(String),

    #[error("required configuration missing: {0}")]
    Configuration(String),

    #[error("run cancelled")]
    Cancelled,
}

impl Error {
    /// Classify this error for the retry engine.
    #[must_use]
    pub fn classify(&self) -> Classification {
        match self {
            Error::Network { .. }
            | Error::Timeout(_)
            | Error::ResourceLimited(_)
            | Error::LockContention(_)
            | Error::RetryInProgress(_)
            | Error::Io(_) => Classification::Transient,

            Error::DatabaseUnavailable(_) | Error::Configuration(_) => Classification::Fatal,

            Error::Pdf(_)
            | Error::Svg(_)
            | Error::Serialization(_)
            | Error::MissingInput(_)
            | Error::InvalidInput(_)
            | Error::HashMismatch { .. }
            | Error::ContractViolation(_)
            | Error::UniqueViolation { .. }
            | Error::Storage(_)
            | Error::ObjectStore(_)
            | Error::Cancelled => Classification::Permanent,
        }
    }

    /// `true` if [`Self::classify`] returns [`Classification::Transient`].
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.classify() == Classification::Transient
    }

    /// `true` if [`Self::classify`] returns [`Classification::Fatal`].
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.classify() == Classification::Fatal
    }

    /// Build a network error tagged with the remote service name, used so log
    /// lines and the error taxonomy can tell the model server apart from the
    /// object store or the web-verification collaborator.
    #[must_use]
    pub fn network(service: &'static str, source: reqwest::Error) -> Self {
        Error::Network { service, source }
    }
}

/// A short machine-stable tag for an error, used in `error_log` rows and
/// metrics where the full `Display` string is too unstable to group on.
impl Error {
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
            Error::Pdf(_) => "pdf",
            Error::Svg(_) => "svg",
            Error::Network { .. } => "network",
            Error::Timeout(_) => "timeout",
            Error::ResourceLimited(_) => "resource_limited",
            Error::LockContention(_) => "lock_contention",
            Error::RetryInProgress(_) => "retry_in_progress",
            Error::MissingInput(_) => "missing_input",
            Error::InvalidInput(_) => "invalid_input",
            Error::HashMismatch { .. } => "hash_mismatch",
            Error::ContractViolation(_) => "contract_violation",
            Error::UniqueViolation { .. } => "unique_violation",
            Error::Storage(_) => "storage",
            Error::ObjectStore(_) => "object_store",
            Error::DatabaseUnavailable(_) => "database_unavailable",
            Error::Configuration(_) => "configuration",
            Error::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Classification::Transient => "transient",
            Classification::Permanent => "permanent",
            Classification::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_classify_transient() {
        assert_eq!(
            Error::LockContention("d1/embedding".into()).classify(),
            Classification::Transient
        );
        assert_eq!(
            Error::ResourceLimited("model server busy".into()).classify(),
            Classification::Transient
        );
    }

    #[test]
    fn fatal_errors_abort() {
        assert!(Error::DatabaseUnavailable("no DSN".into()).is_fatal());
        assert!(Error::Configuration("OBJECT_STORAGE_ENDPOINT missing".into()).is_fatal());
    }

    #[test]
    fn unique_violation_is_permanent_not_string_matched() {
        let err = Error::UniqueViolation {
            table: "product_series",
            key: "hp/LaserJet M400 Series".into(),
        };
        assert_eq!(err.classify(), Classification::Permanent);
        assert_eq!(err.tag(), "unique_violation");
    }
}
