pub mod filter;
pub mod outlier;
pub mod result;
pub mod stats;
