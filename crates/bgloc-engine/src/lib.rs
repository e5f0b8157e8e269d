pub mod config;
pub mod engine;
pub mod error;
pub mod listener;
mod worker;

pub use config::*;
pub use engine::*;
pub use error::*;
pub use listener::*;
