//! Academic result lifecycle engine: grading, batch approval with summary
//! and promotion cascades, and the teacher/admin recheck workflow.
//!
//! Every operation takes a [`rusqlite::Connection`] opened through
//! [`db::open_db`] and returns [`error::Result`].

pub mod analytics;
pub mod audit;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod grade;
pub mod logging;
pub mod models;
pub mod promotion;
pub mod recheck;
pub mod results;
pub mod summary;
