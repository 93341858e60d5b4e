pub type Result<T> = core::result::Result<T, SerializationError>;

/// The error returned when a value cannot be written to or read from a buffer.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SerializationError {
    #[error("buffer too short: need {need} bytes, have {have}")]
    BufferTooShort { need: usize, have: usize },
    #[error("invalid length prefix: {0}")]
    InvalidLength(i64),
    #[error("string payload is not valid utf-8")]
    InvalidUtf8,
    #[error("invalid value")]
    InvalidValue,
    #[error("payload length mismatch: expected {expected} bytes, consumed {consumed}")]
    LengthMismatch { expected: usize, consumed: usize },
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SerializationError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}
