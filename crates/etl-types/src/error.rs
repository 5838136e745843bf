use thiserror::Error;

/// Stable error taxonomy (§7). `Display` renders a stable, greppable code
/// prefix the way `mqk-execution::gateway::GateRefusal` renders
/// `"GATE_REFUSED: ..."` — tests and log aggregation match on the prefix
/// rather than parsing free text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EtlError {
    #[error("VALIDATION: {0}")]
    Validation(String),

    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    #[error("CONFLICT: {0}")]
    Conflict(String),

    #[error("ILLEGAL_STATE: {0}")]
    IllegalState(String),

    #[error("AUTH: {0}")]
    Auth(String),

    #[error("SOURCE_UNKNOWN: {0}")]
    SourceUnknown(String),

    #[error("SOURCE_UNAVAILABLE: {0}")]
    SourceUnavailable(String),

    #[error("DUPLICATE_DATA: {0}")]
    DuplicateData(String),

    #[error("ENCRYPTION_ERROR: {0}")]
    Encryption(String),

    #[error("CIRCUIT_OPEN: {0}")]
    CircuitOpen(String),

    /// Catch-all for infrastructure failures (DB round-trip errors etc.)
    /// that don't fit a named taxonomy entry but still need to cross a crate
    /// boundary as `EtlError` rather than a raw `sqlx::Error`.
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl EtlError {
    /// Transient errors are safe to retry (e.g. on the next scheduler tick);
    /// permanent errors require an operator or caller to change something
    /// first. Mirrors the transient/permanent classification in §7.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EtlError::SourceUnavailable(_) | EtlError::CircuitOpen(_)
        )
    }
}

impl From<sqlx::Error> for EtlError {
    fn from(e: sqlx::Error) -> Self {
        EtlError::Internal(e.to_string())
    }
}

/// `etl-db` surfaces `anyhow::Result` (its operations are infrastructure
/// calls annotated with `.context(...)`, not business-rule outcomes) — this
/// is the crate-boundary conversion callers use with `?` to fold those into
/// the taxonomy as `Internal`.
impl From<anyhow::Error> for EtlError {
    fn from(e: anyhow::Error) -> Self {
        EtlError::Internal(e.to_string())
    }
}
