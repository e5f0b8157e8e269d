pub mod config;
pub mod ids;
pub mod model;
pub mod template;
pub mod time;
pub mod verdict;

pub use config::*;
pub use ids::*;
pub use model::*;
pub use template::*;
pub use time::*;
pub use verdict::*;
