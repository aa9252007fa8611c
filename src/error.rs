use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("Line unavailable: {0}")]
    LineUnavailable(String),
    #[error("Invalid line offset: {0}")]
    InvalidOffset(String),
    #[error("Wait for edge event failed: {0}")]
    WaitError(String),
    #[error("Set output value failed: {0}")]
    WriteError(String),
    #[error("Handle already released: {0}")]
    Released(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Only output writes are survivable; the loop keeps waiting after one.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AppError::WriteError(_))
    }
}
