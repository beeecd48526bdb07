pub mod backend;
pub mod config;
pub mod error;
pub mod mapping;
pub mod membership;
pub mod models;
pub mod monitor;
pub mod patch;
pub mod provider;
pub mod schema;

// Re-export commonly used types for easier access
pub use error::{AppError, AppResult};
pub use models::{DynamicResource, Group, Resource, User};
pub use provider::{FileProvider, Provider};
