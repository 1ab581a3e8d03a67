pub mod cli;
pub mod compile;
pub mod error;
pub mod logger;
