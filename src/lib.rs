pub mod config;
pub mod evaluation;
pub mod evolution;
pub mod export;
pub mod selection;
pub mod topology;
