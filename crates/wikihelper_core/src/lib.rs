pub mod chapters;
pub mod config;
pub mod dates;
pub mod dump;
pub mod import;
pub mod twitter;
