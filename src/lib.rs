pub mod config;
pub mod matcher;
pub mod models;
pub mod notifications;
pub mod orchestrator;
pub mod plugins;
pub mod reconciler;
pub mod run_tracker;
pub mod scheduler;
pub mod scraper;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::{AppConfig, Catalog, ConcurrencyMode};
pub use orchestrator::{Orchestrator, RunStats};
pub use store::Store;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
