pub mod fetcher;
pub mod projections_api;
pub mod stats_api;

pub use fetcher::{Fetcher, HttpTransport, Transport};
