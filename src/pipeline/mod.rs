pub mod handlers;
pub mod orchestrator;
pub mod paths;

pub use handlers::*;
pub use orchestrator::*;
pub use paths::*;
