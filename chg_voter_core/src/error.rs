use std::fmt;

/// Error returned by user supplied hooks (vote callbacks and validation checks).
///
/// The core never interprets it; `code` is carried through to the caller unchanged
/// so C call sites can keep their errno conventions.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{reason} (code {code})")]
pub struct HookError {
    pub code: i32,
    pub reason: String,
}

impl HookError {
    pub fn new(code: i32, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

pub(crate) const EINVAL: i32 = 22;
pub(crate) const EEXIST: i32 = 17;
pub(crate) const ENOMEM: i32 = 12;
pub(crate) const ENOENT: i32 = 2;
pub(crate) const ENOSPC: i32 = 28;
pub(crate) const EDEADLK: i32 = 35;
pub(crate) const ENODATA: i32 = 61;

/// Everything a votable operation can fail with.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum VoteError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("votable {0:?} already exists")]
    AlreadyExists(String),

    #[error("votable {0:?} not found")]
    NotFound(String),

    #[error("votable {votable:?} has no room for client {client:?} (capacity {capacity})")]
    CapacityExceeded {
        votable: String,
        client: String,
        capacity: usize,
    },

    #[error("out of memory while storing {0:?}")]
    OutOfMemory(String),

    #[error("client {0:?} could not be resolved")]
    InvalidClient(String),

    #[error("invalid election kind {0}")]
    InvalidKind(i32),

    #[error("vote from {client:?} rejected: {source}")]
    ValidationRejected {
        client: String,
        #[source]
        source: HookError,
    },

    #[error("votable {0:?} has no enabled voter")]
    NoActiveVoter(String),

    #[error("callback failed: {0}")]
    CallbackFailed(#[source] HookError),

    #[error("votable {0:?} re-entered from its own callback or check")]
    Reentrant(String),
}

impl VoteError {
    /// Negative errno equivalent, for C call sites.
    ///
    /// Hook failures pass the hook's own code through.
    pub fn errno(&self) -> i32 {
        match self {
            VoteError::InvalidArgument(_) => -EINVAL,
            VoteError::AlreadyExists(_) => -EEXIST,
            VoteError::NotFound(_) => -ENOENT,
            VoteError::CapacityExceeded { .. } => -ENOSPC,
            VoteError::OutOfMemory(_) => -ENOMEM,
            VoteError::InvalidClient(_) => -EINVAL,
            VoteError::InvalidKind(_) => -EINVAL,
            VoteError::ValidationRejected { source, .. } => hook_errno(source),
            VoteError::NoActiveVoter(_) => -ENODATA,
            VoteError::CallbackFailed(source) => hook_errno(source),
            VoteError::Reentrant(_) => -EDEADLK,
        }
    }
}

fn hook_errno(e: &HookError) -> i32 {
    match e.code {
        0 => -EINVAL,
        c if c < 0 => c,
        c => -c,
    }
}

/// Election result as C call sites see it: `-EINVAL` stands in for "no value".
pub fn result_or_einval(value: Option<i64>) -> i64 {
    value.unwrap_or(-(EINVAL as i64))
}

pub(crate) struct NameDisplay<'a>(pub Option<&'a str>);

impl fmt::Display for NameDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.unwrap_or("none"))
    }
}
