use alloc::string::String;

pub type Result<T> = core::result::Result<T, TransportError>;

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("the stream is closed")]
    Closed,
    #[error("the backend is not started")]
    NotStarted,
    #[error("no pending connection to accept")]
    NoPendingConnection,
    #[error("frame of {len} bytes exceeds the maximum of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },
    #[error("write buffer is full ({buffered} bytes pending)")]
    WriteBufferFull { buffered: usize },
    #[error("backend error: {0}")]
    Backend(String),
}

impl TransportError {
    /// True if the stream can not be used anymore, and the peer should be considered disconnected
    pub fn is_disconnect(&self) -> bool {
        !matches!(self, TransportError::NoPendingConnection | TransportError::NotStarted)
    }
}
