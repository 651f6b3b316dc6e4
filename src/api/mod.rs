//! Report output for the command-line tool and downstream consumers

pub mod formatting;

pub use formatting::{CsvFormatter, JsonFormatter, OutputFormat, TextFormatter};
