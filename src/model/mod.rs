pub mod field;
pub mod plan;
pub mod row;
