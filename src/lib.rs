//! Bullion Tracker - precious-metals listing tracker
//! Normalizes raw dealer listings into comparable per-gram prices and
//! maintains a per-product daily price history

pub mod domain;
pub mod infrastructure;
pub mod application;
pub mod shared;

// Re-export main types for convenience
pub use application::services::TrackerService;
pub use domain::model::{ChangeEvent, Observation, Product, StatisticsReport};
pub use domain::normalizer::Normalizer;
pub use domain::parser::FieldParser;
pub use infrastructure::store::HistoryStore;
pub use shared::types::{Category, Metal};
