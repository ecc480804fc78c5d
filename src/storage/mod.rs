pub mod lookup;
pub mod migrations;
pub mod records;
pub mod schema;
