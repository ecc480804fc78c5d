pub mod errors;
pub mod reports;
