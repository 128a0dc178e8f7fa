pub mod error;
pub mod matching;
pub mod merging;
pub mod models;
pub mod service;
pub mod store;
pub mod utils;

pub use error::{DedupeError, DedupeResult};
pub use service::DuplicateService;
