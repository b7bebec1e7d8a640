pub mod config;
pub mod coordinate;
pub mod hierarchy;
pub mod node;
pub mod template;
pub mod validation;

pub use config::*;
pub use coordinate::*;
pub use hierarchy::*;
pub use node::*;
pub use template::*;
pub use validation::*;
