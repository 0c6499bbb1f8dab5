use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiskSyncError {
    #[error("risk report unavailable: {0}")]
    ReportUnavailable(String),

    #[error("malformed risk score range: {0}")]
    ConfigFormat(String),

    #[error("invalid number in risk score range: {0}")]
    ConfigParse(String),

    #[error("configuration error: {0}")]
    ConfigLoad(String),

    #[error("directory command failed: {0}")]
    Command(String),

    #[error("directory login failed: {0}")]
    Login(String),

    #[error("directory user not found: {0}")]
    UserNotFound(String),

    #[error("directory user is ambiguous: {0}")]
    AmbiguousUser(String),

    #[error("failed reading from console: {0}")]
    Prompt(String),

    #[error("invalid email format: {0}")]
    InvalidEmail(String),
}
