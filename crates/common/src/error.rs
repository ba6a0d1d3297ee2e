use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification callers map onto their own status encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    /// Infrastructure failure, propagated unchanged.
    Fatal,
}

impl Error {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Error::NotFound(format!("{} not found", what))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Storage(_) | Error::JsonSerialization(_) | Error::Other(_) => ErrorKind::Fatal,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::not_found("Phone 7").kind(), ErrorKind::NotFound);
        assert_eq!(Error::not_found("Phone 7").to_string(), "Phone 7 not found");
        assert_eq!(Error::Conflict("busy".into()).kind(), ErrorKind::Conflict);
        assert_eq!(Error::Validation("bad".into()).kind(), ErrorKind::Validation);
        assert_eq!(Error::Storage("down".into()).kind(), ErrorKind::Fatal);
    }
}
