//! Price-history analytics - day-over-day changes and period statistics

pub mod changes;
pub mod stats;

pub use changes::ChangeDetector;
pub use stats::StatisticsAggregator;
