pub mod job;
pub mod report;
