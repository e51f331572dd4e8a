pub mod admin;
pub mod config;
pub mod runner;
pub mod settings;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
