//! Core types and constants for the anchor autocalibration solver

pub mod types;
pub mod constants;
pub mod range;

pub use types::*;
pub use constants::*;
pub use range::{RangeMatrix, pairwise_distances};
