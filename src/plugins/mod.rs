pub mod traits;
pub mod manager;
pub mod platforms;

pub use manager::PlatformRegistry;
pub use traits::{PlatformScraper, ScrapedRecord};
