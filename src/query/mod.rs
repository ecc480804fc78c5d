pub mod category;
pub mod export;
pub mod grouping;
pub mod period;
pub mod publishers;
pub mod report;
pub mod stats;
