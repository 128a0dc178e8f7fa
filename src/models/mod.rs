pub mod duplicate;
pub mod lead;
pub mod stats_models;

pub use duplicate::*;
pub use lead::*;
