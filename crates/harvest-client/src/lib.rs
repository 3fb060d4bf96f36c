pub mod wiki;

pub use wiki::{DEFAULT_API_URL, DEFAULT_CATEGORIES, MediaWikiClient};
