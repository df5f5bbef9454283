pub mod aggregates;
pub mod job;
pub mod rows;
