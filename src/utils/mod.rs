pub mod data;
pub mod flatten;
pub mod merge;
pub mod schema;
