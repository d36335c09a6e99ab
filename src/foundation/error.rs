pub type ConvResult<T> = Result<T, ConvError>;

#[derive(thiserror::Error, Debug)]
pub enum ConvError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("out of range: {0}")]
    OutOfRange(String),

    #[error("invalid buffer size: {0}")]
    InvalidSize(String),

    #[error("resource exhaustion: {0}")]
    ResourceExhaustion(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("raster already locked: {0}")]
    AlreadyLocked(String),

    #[error("cancelled")]
    Cancelled,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ConvError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn out_of_range(msg: impl Into<String>) -> Self {
        Self::OutOfRange(msg.into())
    }

    pub fn invalid_size(msg: impl Into<String>) -> Self {
        Self::InvalidSize(msg.into())
    }

    pub fn exhausted(msg: impl Into<String>) -> Self {
        Self::ResourceExhaustion(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn locked(msg: impl Into<String>) -> Self {
        Self::AlreadyLocked(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Configuration failures abort a whole batch; everything else is local to one image.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
