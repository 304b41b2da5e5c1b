pub mod platform;

pub use platform::{PlatformScraper, ScrapedRecord};
