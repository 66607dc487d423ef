use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdsError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("account not found")]
    AccountNotFound,

    #[error("account takendown")]
    AccountTakendown,

    #[error("account deactivated")]
    AccountDeactivated,

    #[error("handle already taken")]
    HandleAlreadyTaken,

    #[error("invalid handle")]
    InvalidHandle,

    #[error("session expired")]
    SessionExpired,

    #[error("internal error: {0}")]
    InternalError(String),

    #[error("record not found")]
    RecordNotFound,

    #[error("record already exists")]
    RecordExists,

    #[error("swap value did not match current repository state")]
    InvalidSwap,

    #[error("blob not found")]
    BlobNotFound,

    #[error("blob exceeds maximum size")]
    BlobTooLarge,

    #[error("declared mime type does not match content")]
    MimeMismatch,

    #[error("mime type not allowed: {0}")]
    MimeNotAllowed(String),

    #[error("identity directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("invalid identity operation: {0}")]
    InvalidOperation(String),

    #[error("invalid dpop proof: {0}")]
    InvalidDpopProof(String),

    #[error("invalid oauth grant: {0}")]
    InvalidGrant(String),

    #[error("invalid oauth client: {0}")]
    InvalidClient(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("integrity error: {0}")]
    IntegrityError(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

pub type PdsResult<T> = Result<T, PdsError>;
