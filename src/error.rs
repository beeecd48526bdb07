use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    BadRequest(String),
    NotSupported(String),
    Configuration(String),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Io(e) => write!(f, "Storage error: {}", e),
            AppError::Serialization(e) => write!(f, "Serialization error: {}", e),
            AppError::BadRequest(e) => write!(f, "Bad request: {}", e),
            AppError::NotSupported(e) => write!(f, "Not supported: {}", e),
            AppError::Configuration(e) => write!(f, "Configuration error: {}", e),
            AppError::Internal(e) => write!(f, "Internal error: {}", e),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Io(e) => Some(e),
            AppError::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err)
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Configuration(err.to_string())
    }
}

impl AppError {
    pub fn is_bad_request(&self) -> bool {
        matches!(self, AppError::BadRequest(_))
    }

    pub fn is_not_supported(&self) -> bool {
        matches!(self, AppError::NotSupported(_))
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Fails with `BadRequest` when a required argument is empty or whitespace
pub fn require_value(value: &str, name: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{} cannot be empty", name)));
    }
    Ok(())
}
