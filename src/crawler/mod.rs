pub mod engine;
pub mod extractor;
pub mod fetcher;
pub mod frontier;
pub mod sitemap;

pub use engine::{CrawlEngine, CrawlError, CrawlOutput};
pub use fetcher::HttpFetcher;
