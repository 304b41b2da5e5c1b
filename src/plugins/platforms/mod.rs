// Platform collaborator implementations
pub mod marketplace;

pub use marketplace::MarketplacePlatform;
