pub mod analytics;
pub mod catalog;
pub mod core;
pub mod recheck;
pub mod results;
pub mod setup;
pub mod summaries;
