pub mod build;
pub mod categories;
pub mod config;
pub mod search;
pub mod status;
