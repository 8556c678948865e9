pub mod checks;
pub mod config;
pub mod errors;
pub mod migration;
