use broz_shared::errors::{AppError, ErrorCode};

/// Internal error type returned by the matching engine's components.
///
/// This is deliberately distinct from `broz_shared::errors::AppError`: the
/// engine's components (state machine, selector, pair creator, voting
/// engine, guardians) need to match on *kind* to decide retry/backoff
/// behavior, and that decision must not depend on HTTP status codes. The
/// API layer (`routes/*.rs`) is the only place a `MatchingError` is turned
/// into an `AppError`.
#[derive(Debug, thiserror::Error)]
pub enum MatchingError {
    /// The participant is not currently eligible for the requested operation
    /// (wrong state, filters reject every candidate, etc).
    #[error("participant not matchable: {0}")]
    NotMatchable(String),

    /// The requested state transition is not in the allowed-transitions
    /// table for the participant's current state.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// A row lock or advisory lock could not be acquired non-blockingly.
    /// Callers should back off and retry; this is not a terminal failure.
    #[error("lock contention: {0}")]
    LockContention(String),

    /// A non-terminal match record already exists for this canonical pair.
    #[error("duplicate pair: {0}")]
    DuplicatePair(String),

    /// The vote window for this match has already closed.
    #[error("vote window expired: {0}")]
    WindowExpired(String),

    /// The referenced participant, match, or queue entry does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A transient infrastructure failure (connection drop, pool exhaustion,
    /// timeout). Safe to retry with backoff.
    #[error("transient failure: {0}")]
    Transient(String),

    /// An unrecoverable failure for this participant/match. The state
    /// machine suppresses further automatic orchestration for the affected
    /// participant until an operator clears it (`fatal_suppressed`).
    #[error("fatal: {0}")]
    Fatal(String),
}

impl MatchingError {
    /// Whether this error kind is worth retrying without operator
    /// intervention (orchestrator/guardian retry loops consult this).
    pub fn is_retryable(&self) -> bool {
        matches!(self, MatchingError::LockContention(_) | MatchingError::Transient(_))
    }
}

impl From<diesel::result::Error> for MatchingError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => MatchingError::NotFound(err.to_string()),
            diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            ) => MatchingError::DuplicatePair(err.to_string()),
            _ => MatchingError::Transient(err.to_string()),
        }
    }
}

impl From<MatchingError> for AppError {
    fn from(err: MatchingError) -> Self {
        match err {
            MatchingError::NotMatchable(msg) => AppError::new(ErrorCode::NotMatchable, msg),
            MatchingError::InvalidTransition(msg) => {
                AppError::new(ErrorCode::InvalidTransition, msg)
            }
            MatchingError::LockContention(msg) => AppError::new(ErrorCode::LockContention, msg),
            MatchingError::DuplicatePair(msg) => AppError::new(ErrorCode::AlreadyInMatch, msg),
            MatchingError::WindowExpired(msg) => AppError::new(ErrorCode::WindowExpired, msg),
            MatchingError::NotFound(msg) => AppError::new(ErrorCode::NotFound, msg),
            MatchingError::Transient(msg) => AppError::new(ErrorCode::ServiceUnavailable, msg),
            MatchingError::Fatal(msg) => AppError::new(ErrorCode::MatchingFatal, msg),
        }
    }
}

pub type MatchingResult<T> = Result<T, MatchingError>;
