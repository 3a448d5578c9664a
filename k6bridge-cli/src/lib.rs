pub mod commands;
pub mod dashboard;
pub mod report;
