pub mod audit;
pub mod browser;
pub mod queue;
pub mod store;
pub mod worker;
