use std::{fmt, io, path::PathBuf, time::Duration};

/// Machine-readable error codes for operator- and script-friendly output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    FeedUnreadable,
    FeedParseError,
    StateCorrupt,
    StateReadFailed,
    StateWriteFailed,
    StateDbFailed,
    LockContention,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1002",
            Self::FeedUnreadable => "E2001",
            Self::FeedParseError => "E2002",
            Self::StateCorrupt => "E3003",
            Self::StateReadFailed => "E5001",
            Self::StateWriteFailed => "E5002",
            Self::StateDbFailed => "E5003",
            Self::LockContention => "E5004",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::FeedUnreadable => "Feed input could not be read",
            Self::FeedParseError => "Feed input is not valid JSON",
            Self::StateCorrupt => "Persisted sequence state is corrupt",
            Self::StateReadFailed => "Sequence state read failed",
            Self::StateWriteFailed => "Sequence state write failed",
            Self::StateDbFailed => "Sequence state database error",
            Self::LockContention => "Lock contention",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .newsline/config.toml and retry."),
            Self::FeedUnreadable => Some("Check the input path, or pass `-` to read stdin."),
            Self::FeedParseError => {
                Some("Pass a JSON array of items or an object with an `items` array.")
            }
            Self::StateCorrupt => Some("Run `newsline state reset` to start a fresh sequence."),
            Self::StateReadFailed | Self::StateWriteFailed => {
                Some("Check disk space and permissions on the state path.")
            }
            Self::StateDbFailed => Some("Delete the state database to start a fresh sequence."),
            Self::LockContention => {
                Some("Retry after the other `newsline` process releases its lock.")
            }
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors raised by a [`KvStore`](crate::sequence::KvStore) backend.
///
/// The sequence store never lets these escape an ordering cycle; they are
/// logged and the cycle degrades to an empty record or an unpersisted result.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error reading the backing file.
    #[error("state read failed at {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    /// I/O error writing the backing file.
    #[error("state write failed at {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    /// SQLite backend error.
    #[error("state database error: {0}")]
    Db(#[from] rusqlite::Error),

    /// Serializing the record failed.
    #[error("state serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The cycle lock could not be taken in time.
    #[error("state lock timed out after {waited:?} at {path}")]
    LockTimeout { path: PathBuf, waited: Duration },

    /// The cycle lock file could not be opened or locked.
    #[error("state lock failed: {0}")]
    Lock(io::Error),
}

impl StoreError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Read { .. } => ErrorCode::StateReadFailed,
            Self::Write { .. } | Self::Lock(_) => ErrorCode::StateWriteFailed,
            Self::Db(_) => ErrorCode::StateDbFailed,
            Self::Serialize(_) => ErrorCode::InternalUnexpected,
            Self::LockTimeout { .. } => ErrorCode::LockContention,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }

    /// Whether the backend was readable but held data it could not parse.
    #[must_use]
    pub fn is_invalid_data(&self) -> bool {
        matches!(self, Self::Read { source, .. } if source.kind() == io::ErrorKind::InvalidData)
    }
}
