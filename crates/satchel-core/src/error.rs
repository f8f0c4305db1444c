use thiserror::Error;

pub type Result<T> = std::result::Result<T, SatchelError>;

#[derive(Debug, Error)]
pub enum SatchelError {
    #[error("not a satchel repository: no .satchel config in '{0}'")]
    ConfigAbsent(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("decryption failed: wrong key or corrupted data")]
    DecryptionFailed,

    #[error("server error (code {code}): {message}")]
    Server { code: i32, message: String },

    #[error("file not found: '{0}'")]
    FileNotFound(String),

    #[error("policy violation: {0}")]
    PolicyViolation(String),

    #[error("unsupported capability: {0}")]
    Unsupported(String),

    #[error("invalid filter expression: {0}")]
    Filter(String),

    #[error("invalid record: {0}")]
    InvalidFormat(String),

    /// Distinguished end-of-stream sentinel for the document buffer.
    #[error("end of documents")]
    EndOfDocuments,

    #[error("document buffer closed")]
    BufferClosed,

    #[error("operation interrupted")]
    Interrupted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("{0}")]
    Other(String),
}

impl SatchelError {
    /// Server error code carried by this error, if any.
    pub fn server_code(&self) -> Option<i32> {
        match self {
            SatchelError::Server { code, .. } => Some(*code),
            _ => None,
        }
    }
}
