pub mod client;
pub mod dates;
pub mod error;
pub mod normalize;
mod retry;
pub mod types;

pub use client::{FetchParams, ScraperClient};
pub use dates::{DateStyle, RecognizedDate};
pub use error::ScraperError;
pub use normalize::{normalize_batch, NormalizeContext, NormalizeError};
pub use types::{InstashopResponse, RawReview, ScrapeResponse, TalabatResponse};
