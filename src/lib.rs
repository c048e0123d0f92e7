pub mod cli;
pub mod config;
pub mod errors;
pub mod git;
pub mod hosting;
pub mod stack;
pub mod storage;
pub mod utils;

pub use errors::StackError;
