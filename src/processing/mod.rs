//! Range data ingestion and robust aggregation

pub mod aggregation;
pub mod records;

pub use aggregation::{RangeFilterConfig, RobustRangeAggregator};
pub use records::RangingRecords;
